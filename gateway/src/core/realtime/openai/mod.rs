//! OpenAI Realtime API provider for the voice service channel.
//!
//! # Supported Voices
//!
//! alloy, ash, ballad, coral, echo, sage, shimmer, verse
//!
//! # Audio Format
//!
//! Telephony calls use G.711 u-law at 8kHz in both directions so caller frames are
//! forwarded without transcoding. PCM16 and a-law are also accepted.

mod client;
mod config;
mod messages;

pub use client::{OpenAIRealtime, VoiceChannelHandle, normalize_server_event};
pub use config::{
    Modality, OPENAI_BETA_HEADER, OPENAI_REALTIME_URL, OpenAIRealtimeAudioFormat,
    OpenAIRealtimeVoice,
};
pub use messages::{
    ApiError, ClientEvent, ContentPart, ConversationItem, ServerEvent, Session, SessionConfig,
};
