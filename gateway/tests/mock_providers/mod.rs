//! Mock servers for integration tests
//!
//! - `realtime_mock` - voice service WebSocket speaking the Realtime event protocol

// Not every test binary uses every helper
#![allow(dead_code)]

pub mod realtime_mock;
