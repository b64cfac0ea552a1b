//! OpenAI Realtime API WebSocket message types.
//!
//! Only the events the relay needs are modelled. Client events:
//! - session.update - one-time session handshake
//! - input_audio_buffer.append - caller audio
//! - conversation.item.create / response.create - optional spoken intro
//! - conversation.item.truncate - barge-in cutoff
//!
//! Server events the relay reacts to:
//! - response.audio.delta / response.audio.done - generated audio
//! - input_audio_buffer.speech_started - caller started talking
//! - mark - playback acknowledgement
//! - error, session.created, session.updated - logged
//!
//! Anything else deserializes to [`ServerEvent::Unhandled`].

use serde::{Deserialize, Serialize};

use super::config::Modality;
use crate::core::realtime::base::TurnDetectionConfig;

// =============================================================================
// Session Configuration
// =============================================================================

/// Session configuration sent in the handshake.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub turn_detection: Option<TurnDetectionConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_audio_format: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_audio_format: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice: Option<String>,

    /// System instructions for the assistant
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub modalities: Option<Vec<Modality>>,
}

// =============================================================================
// Conversation Items
// =============================================================================

/// Conversation item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationItem {
    /// Item type ("message")
    #[serde(rename = "type")]
    pub item_type: String,
    /// Role (user, assistant, system)
    pub role: String,
    pub content: Vec<ContentPart>,
}

impl ConversationItem {
    /// A message item carrying a single text part.
    pub fn text_message(role: &str, text: &str) -> Self {
        let content_type = if role == "assistant" {
            "text"
        } else {
            "input_text"
        };
        Self {
            item_type: "message".to_string(),
            role: role.to_string(),
            content: vec![ContentPart {
                content_type: content_type.to_string(),
                text: Some(text.to_string()),
            }],
        }
    }
}

/// Content part within a conversation item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentPart {
    #[serde(rename = "type")]
    pub content_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

// =============================================================================
// Client Events (sent to server)
// =============================================================================

/// Client events sent to the Realtime API.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    /// Update session configuration
    #[serde(rename = "session.update")]
    SessionUpdate { session: SessionConfig },

    /// Append audio to the input buffer
    #[serde(rename = "input_audio_buffer.append")]
    InputAudioBufferAppend {
        /// Base64-encoded audio, forwarded verbatim
        audio: String,
    },

    /// Create a conversation item
    #[serde(rename = "conversation.item.create")]
    ConversationItemCreate { item: ConversationItem },

    /// Truncate a conversation item to what the caller actually heard
    #[serde(rename = "conversation.item.truncate")]
    ConversationItemTruncate {
        item_id: String,
        content_index: u32,
        audio_end_ms: u64,
    },

    /// Ask the model to generate a response
    #[serde(rename = "response.create")]
    ResponseCreate,
}

// =============================================================================
// Server Events (received from server)
// =============================================================================

/// Server events received from the Realtime API.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    #[serde(rename = "error")]
    Error { error: ApiError },

    #[serde(rename = "session.created")]
    SessionCreated { session: Session },

    #[serde(rename = "session.updated")]
    SessionUpdated { session: Session },

    /// Caller speech detected by server VAD
    #[serde(rename = "input_audio_buffer.speech_started")]
    SpeechStarted {
        #[serde(default)]
        audio_start_ms: Option<u64>,
        #[serde(default)]
        item_id: Option<String>,
    },

    #[serde(rename = "input_audio_buffer.speech_stopped")]
    SpeechStopped {
        #[serde(default)]
        audio_end_ms: Option<u64>,
    },

    /// Generated audio chunk
    #[serde(rename = "response.audio.delta")]
    AudioDelta {
        #[serde(default)]
        response_id: Option<String>,
        item_id: String,
        /// Base64-encoded audio
        delta: String,
    },

    /// Generation finished for an item
    #[serde(rename = "response.audio.done")]
    AudioDone {
        #[serde(default)]
        response_id: Option<String>,
        item_id: String,
    },

    #[serde(rename = "conversation.item.truncated")]
    ConversationItemTruncated {
        item_id: String,
        #[serde(default)]
        audio_end_ms: Option<u64>,
    },

    #[serde(rename = "response.done")]
    ResponseDone {
        #[serde(default)]
        response: Option<ResponseSummary>,
    },

    /// Playback acknowledgement
    #[serde(rename = "mark")]
    Mark,

    /// Any event type the relay does not act on
    #[serde(other)]
    Unhandled,
}

// =============================================================================
// Supporting Types
// =============================================================================

/// API error information.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiError {
    #[serde(rename = "type")]
    pub error_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    pub message: String,
}

/// Session information echoed by the server.
#[derive(Debug, Clone, Deserialize)]
pub struct Session {
    pub id: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub voice: Option<String>,
    #[serde(default)]
    pub output_audio_format: Option<String>,
}

/// Minimal view of a finished response.
#[derive(Debug, Clone, Deserialize)]
pub struct ResponseSummary {
    pub id: String,
    #[serde(default)]
    pub status: Option<String>,
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    #[test]
    fn test_session_update_serialization() {
        let event = ClientEvent::SessionUpdate {
            session: SessionConfig {
                turn_detection: Some(TurnDetectionConfig::default()),
                input_audio_format: Some("g711_ulaw".to_string()),
                output_audio_format: Some("g711_ulaw".to_string()),
                voice: Some("alloy".to_string()),
                instructions: Some("Be nice.".to_string()),
                modalities: Some(vec![Modality::Text, Modality::Audio]),
            },
        };
        let json: Value = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "session.update");
        assert_eq!(json["session"]["turn_detection"]["type"], "server_vad");
        assert_eq!(json["session"]["input_audio_format"], "g711_ulaw");
        assert_eq!(json["session"]["modalities"], json!(["text", "audio"]));
    }

    #[test]
    fn test_truncate_wire_format() {
        let event = ClientEvent::ConversationItemTruncate {
            item_id: "item_1".to_string(),
            content_index: 0,
            audio_end_ms: 150,
        };
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({
                "type": "conversation.item.truncate",
                "item_id": "item_1",
                "content_index": 0,
                "audio_end_ms": 150
            })
        );
    }

    #[test]
    fn test_append_and_response_create() {
        let append = ClientEvent::InputAudioBufferAppend {
            audio: "AAEC".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&append).unwrap(),
            json!({"type": "input_audio_buffer.append", "audio": "AAEC"})
        );
        assert_eq!(
            serde_json::to_value(ClientEvent::ResponseCreate).unwrap(),
            json!({"type": "response.create"})
        );
    }

    #[test]
    fn test_intro_item_shape() {
        let item = ConversationItem::text_message("user", "Greet the caller.");
        let json = serde_json::to_value(ClientEvent::ConversationItemCreate { item }).unwrap();
        assert_eq!(json["item"]["type"], "message");
        assert_eq!(json["item"]["role"], "user");
        assert_eq!(json["item"]["content"][0]["type"], "input_text");
        assert_eq!(json["item"]["content"][0]["text"], "Greet the caller.");
    }

    #[test]
    fn test_audio_delta_minimal() {
        let event: ServerEvent =
            serde_json::from_str(r#"{"type":"response.audio.delta","delta":"AAAA","item_id":"r1"}"#)
                .unwrap();
        match event {
            ServerEvent::AudioDelta {
                item_id, delta, ..
            } => {
                assert_eq!(item_id, "r1");
                assert_eq!(delta, "AAAA");
            }
            other => panic!("Wrong event type: {other:?}"),
        }
    }

    #[test]
    fn test_speech_started_without_fields() {
        let event: ServerEvent =
            serde_json::from_str(r#"{"type":"input_audio_buffer.speech_started"}"#).unwrap();
        assert!(matches!(
            event,
            ServerEvent::SpeechStarted {
                audio_start_ms: None,
                item_id: None
            }
        ));
    }

    #[test]
    fn test_mark_and_unhandled() {
        let mark: ServerEvent = serde_json::from_str(r#"{"type":"mark"}"#).unwrap();
        assert!(matches!(mark, ServerEvent::Mark));

        let other: ServerEvent =
            serde_json::from_str(r#"{"type":"rate_limits.updated","rate_limits":[]}"#).unwrap();
        assert!(matches!(other, ServerEvent::Unhandled));
    }

    #[test]
    fn test_error_event() {
        let json = r#"{
            "type": "error",
            "error": {
                "type": "invalid_request_error",
                "message": "Test error"
            }
        }"#;
        let event: ServerEvent = serde_json::from_str(json).unwrap();
        match event {
            ServerEvent::Error { error } => {
                assert_eq!(error.error_type, "invalid_request_error");
                assert_eq!(error.message, "Test error");
            }
            other => panic!("Wrong event type: {other:?}"),
        }
    }

    #[test]
    fn test_audio_delta_missing_item_id_is_rejected() {
        let result =
            serde_json::from_str::<ServerEvent>(r#"{"type":"response.audio.delta","delta":"AAAA"}"#);
        assert!(result.is_err());
    }
}
