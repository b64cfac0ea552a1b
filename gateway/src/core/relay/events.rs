//! Normalized signals flowing into the relay.
//!
//! Both adapters translate their wire protocols into these events and push them
//! onto the one channel the relay drains, so every call is processed strictly in
//! arrival order.

use crate::core::realtime::RealtimeError;

/// Signals produced by the caller channel adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallerEvent {
    /// The call stream began; timestamps restart from zero
    StreamStarted { stream_id: String },
    /// One inbound audio frame, base64 payload kept verbatim
    AudioFrame { payload: String, timestamp_ms: u64 },
    /// The caller transport finished playing a marked frame
    PlaybackMarkAck,
    /// The call stream ended or the socket dropped
    StreamClosed,
}

/// Signals produced by the voice service channel adapter.
#[derive(Debug)]
pub enum VoiceEvent {
    /// Connected and handshake sent; audio may now flow upstream
    ChannelReady,
    /// One generated audio frame for the given content item
    GeneratedAudioFrame { payload: String, content_id: String },
    /// Generation finished for the given content item
    GeneratedAudioDone { content_id: String },
    /// The caller started speaking
    CallerSpeechStarted,
    PlaybackMarkAck,
    ChannelClosed,
    ChannelError(RealtimeError),
}

/// Any event the relay consumes.
#[derive(Debug)]
pub enum RelayEvent {
    Caller(CallerEvent),
    Voice(VoiceEvent),
}

impl From<CallerEvent> for RelayEvent {
    fn from(event: CallerEvent) -> Self {
        RelayEvent::Caller(event)
    }
}

impl From<VoiceEvent> for RelayEvent {
    fn from(event: VoiceEvent) -> Self {
        RelayEvent::Voice(event)
    }
}
