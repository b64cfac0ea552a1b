//! Voice service channel.
//!
//! Manages the per-call connection to the cloud speech-generation endpoint:
//! connect, one-time session handshake, then normalization of server events into
//! the relay's [`VoiceEvent`](crate::core::relay::VoiceEvent) vocabulary.

mod base;
pub mod openai;

pub use base::{RealtimeError, RealtimeResult, TurnDetectionConfig, VoiceServiceConfig};
pub use openai::{
    OPENAI_REALTIME_URL, OpenAIRealtime, OpenAIRealtimeAudioFormat, OpenAIRealtimeVoice,
    VoiceChannelHandle,
};
