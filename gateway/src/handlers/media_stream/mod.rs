//! Caller media stream WebSocket
//!
//! ## Caller → Server
//!
//! - **connected**: socket handshake, ignored
//! - **start**: call stream began, carries the `streamSid`
//! - **media**: one base64 audio frame with its timestamp
//! - **mark**: echo of a mark we sent, playback reached it
//! - **stop**: call stream ended
//!
//! ## Server → Caller
//!
//! - **media**: generated audio to play
//! - **mark**: playback acknowledgement request
//! - **clear**: drop queued playback after a barge-in

mod handler;
pub mod messages;

pub use handler::{CallerHandle, media_stream_handler};
