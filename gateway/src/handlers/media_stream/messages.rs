//! Media stream WebSocket message types
//!
//! The caller side speaks the telephony media-stream protocol: JSON text frames
//! tagged by `event`. Inbound `start`/`media`/`mark`/`stop` are normalised to
//! [`CallerEvent`]s; everything else is ignored.
//!
//! Two inbound shapes are accepted for `start` and `media`:
//!
//! ```json
//! {"event":"start","streamSid":"MZ..","start":{"streamSid":"MZ..","callSid":"CA.."}}
//! {"event":"media","media":{"payload":"<b64>","timestamp":"120"}}
//! ```
//!
//! and the flat form
//!
//! ```json
//! {"event":"start","streamId":"MZ.."}
//! {"event":"media","timestampMs":120,"payload":"<b64>"}
//! ```

use base64::{Engine, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::relay::CallerEvent;

/// Errors raised while decoding a caller frame. All of them are protocol noise:
/// the frame is logged and dropped.
#[derive(Debug, Error)]
pub enum MessageError {
    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Invalid media timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("Invalid audio payload: {0}")]
    InvalidPayload(String),
}

// =============================================================================
// Incoming Messages (caller transport -> server)
// =============================================================================

/// Incoming media stream events
#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum MediaStreamIncoming {
    /// Socket handshake, carries no call data
    Connected {
        #[serde(default)]
        protocol: Option<String>,
    },

    Start {
        #[serde(default, rename = "streamSid", alias = "streamId")]
        stream_sid: Option<String>,
        #[serde(default)]
        start: Option<StartMetadata>,
    },

    Media {
        #[serde(default)]
        media: Option<MediaPayload>,
        /// Flat form payload
        #[serde(default)]
        payload: Option<String>,
        /// Flat form timestamp
        #[serde(default, rename = "timestampMs")]
        timestamp_ms: Option<WireTimestamp>,
    },

    /// Echo of a mark we sent, emitted once playback reached it
    Mark {
        #[serde(default)]
        mark: Option<MarkPayload>,
    },

    Stop {
        #[serde(default, rename = "streamSid")]
        stream_sid: Option<String>,
    },

    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
pub struct StartMetadata {
    #[serde(default, rename = "streamSid")]
    pub stream_sid: Option<String>,
    #[serde(default, rename = "callSid")]
    pub call_sid: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct MediaPayload {
    pub payload: String,
    #[serde(default)]
    pub timestamp: Option<WireTimestamp>,
    #[serde(default)]
    pub track: Option<String>,
}

/// Timestamps arrive as decimal strings from some transports and as numbers
/// from others.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum WireTimestamp {
    Number(u64),
    Text(String),
}

impl WireTimestamp {
    pub fn as_millis(&self) -> Result<u64, MessageError> {
        match self {
            WireTimestamp::Number(ms) => Ok(*ms),
            WireTimestamp::Text(text) => text
                .trim()
                .parse()
                .map_err(|_| MessageError::InvalidTimestamp(text.clone())),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MarkPayload {
    pub name: String,
}

impl MediaStreamIncoming {
    /// Normalise into a relay signal. `Ok(None)` means the event carries nothing
    /// the relay acts on.
    pub fn into_caller_event(self) -> Result<Option<CallerEvent>, MessageError> {
        match self {
            MediaStreamIncoming::Connected { .. } | MediaStreamIncoming::Unknown => Ok(None),
            MediaStreamIncoming::Start { stream_sid, start } => {
                let stream_id = stream_sid
                    .or_else(|| start.and_then(|s| s.stream_sid))
                    .filter(|id| !id.is_empty())
                    .ok_or(MessageError::MissingField("streamSid"))?;
                Ok(Some(CallerEvent::StreamStarted { stream_id }))
            }
            MediaStreamIncoming::Media {
                media,
                payload,
                timestamp_ms,
            } => {
                let (payload, timestamp) = match media {
                    Some(media) => (media.payload, media.timestamp),
                    None => (
                        payload.ok_or(MessageError::MissingField("payload"))?,
                        timestamp_ms,
                    ),
                };
                let timestamp_ms = timestamp
                    .ok_or(MessageError::MissingField("timestamp"))?
                    .as_millis()?;
                validate_payload(&payload)?;
                Ok(Some(CallerEvent::AudioFrame {
                    payload,
                    timestamp_ms,
                }))
            }
            MediaStreamIncoming::Mark { .. } => Ok(Some(CallerEvent::PlaybackMarkAck)),
            MediaStreamIncoming::Stop { .. } => Ok(Some(CallerEvent::StreamClosed)),
        }
    }
}

/// Decode one text frame from the caller.
pub fn parse_caller_message(text: &str) -> Result<Option<CallerEvent>, MessageError> {
    let incoming: MediaStreamIncoming = serde_json::from_str(text)?;
    incoming.into_caller_event()
}

/// Payloads are forwarded verbatim, but must at least be valid base64.
fn validate_payload(payload: &str) -> Result<(), MessageError> {
    if payload.is_empty() {
        return Err(MessageError::InvalidPayload("empty".to_string()));
    }
    STANDARD
        .decode(payload)
        .map(|_| ())
        .map_err(|e| MessageError::InvalidPayload(e.to_string()))
}

// =============================================================================
// Outgoing Messages (server -> caller transport)
// =============================================================================

/// Outgoing media stream events
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum MediaStreamOutgoing {
    /// Generated audio to play
    Media {
        #[serde(rename = "streamSid")]
        stream_sid: String,
        media: OutgoingMedia,
    },

    /// Request an echo once playback reaches this point
    Mark {
        #[serde(rename = "streamSid")]
        stream_sid: String,
        mark: MarkPayload,
    },

    /// Drop all buffered, not yet played audio
    Clear {
        #[serde(rename = "streamSid")]
        stream_sid: String,
    },
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct OutgoingMedia {
    pub payload: String,
}

impl MediaStreamOutgoing {
    pub fn media(stream_sid: &str, payload: String) -> Self {
        MediaStreamOutgoing::Media {
            stream_sid: stream_sid.to_string(),
            media: OutgoingMedia { payload },
        }
    }

    pub fn mark(stream_sid: &str, name: &str) -> Self {
        MediaStreamOutgoing::Mark {
            stream_sid: stream_sid.to_string(),
            mark: MarkPayload {
                name: name.to_string(),
            },
        }
    }

    pub fn clear(stream_sid: &str) -> Self {
        MediaStreamOutgoing::Clear {
            stream_sid: stream_sid.to_string(),
        }
    }
}
