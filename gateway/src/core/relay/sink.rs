//! Outbound ports of the relay.
//!
//! The relay never touches sockets directly. It writes through these traits,
//! implemented by the channel adapters and by recording fakes in tests.

use async_trait::async_trait;

use super::error::RelayResult;
use crate::core::realtime::RealtimeResult;

/// Upstream side: the voice service channel.
#[async_trait]
pub trait VoiceServiceSink: Send {
    /// Forward one caller frame, payload untouched.
    async fn append_audio(&mut self, payload: String) -> RealtimeResult<()>;

    /// Tell the service how much of `content_id` the caller actually heard.
    async fn truncate(&mut self, content_id: &str, audio_end_ms: u64) -> RealtimeResult<()>;

    /// Close the channel. Closing twice is a no-op.
    async fn close(&mut self) -> RealtimeResult<()>;
}

/// Downstream side: the caller channel.
#[async_trait]
pub trait CallerSink: Send {
    /// Queue one generated frame for playback.
    async fn send_media(&mut self, stream_id: &str, payload: String) -> RelayResult<()>;

    /// Ask the transport to acknowledge once playback reaches this point.
    async fn send_mark(&mut self, stream_id: &str, name: &str) -> RelayResult<()>;

    /// Discard everything queued for playback but not yet played.
    async fn clear(&mut self, stream_id: &str) -> RelayResult<()>;

    /// Close the channel. Closing twice is a no-op.
    async fn close(&mut self) -> RelayResult<()>;
}
