//! HTTP and WebSocket request handlers
//!
//! - `api` - Health check endpoint
//! - `media_stream` - Caller media stream WebSocket, one call per socket

pub mod api;
pub mod media_stream;

pub use media_stream::media_stream_handler;
