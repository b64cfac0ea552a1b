//! Base types for the voice service channel.
//!
//! The voice service is a duplex JSON stream to a cloud speech-generation endpoint,
//! opened once per call. This module holds the provider-independent error and
//! configuration types; the protocol lives in the provider modules.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use zeroize::Zeroizing;

use super::openai::OPENAI_REALTIME_URL;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur on the voice service channel.
#[derive(Debug, Error)]
pub enum RealtimeError {
    /// Connection to the provider failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Authentication failed
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// WebSocket error
    #[error("WebSocket error: {0}")]
    WebSocketError(String),

    /// Provider-specific error
    #[error("Provider error: {0}")]
    ProviderError(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Operation timeout
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Not connected
    #[error("Not connected")]
    NotConnected,
}

/// Result type for voice service operations.
pub type RealtimeResult<T> = Result<T, RealtimeError>;

// =============================================================================
// Configuration Types
// =============================================================================

/// Per-call configuration for the voice service channel.
///
/// Built from the server configuration and handed to the adapter when a call
/// starts; nothing here is read from process state afterwards.
#[derive(Debug, Clone)]
pub struct VoiceServiceConfig {
    /// API key for the provider, wiped when the per-call config is dropped
    pub api_key: Zeroizing<String>,
    /// Base WebSocket URL, the model is appended as a query parameter
    pub url: String,
    /// Model identifier
    pub model: String,
    /// Voice used for generated audio
    pub voice: String,
    /// Behavioral instructions sent in the session handshake
    pub instructions: String,
    /// Audio format tag used for input and output
    pub audio_format: String,
    /// When set, the assistant is asked to speak first using this prompt
    pub intro_prompt: Option<String>,
    /// Bound on connect plus handshake
    pub connect_timeout: Duration,
    /// Turn detection mode declared in the handshake
    pub turn_detection: TurnDetectionConfig,
}

impl Default for VoiceServiceConfig {
    fn default() -> Self {
        Self {
            api_key: Zeroizing::default(),
            url: OPENAI_REALTIME_URL.to_string(),
            model: String::new(),
            voice: String::new(),
            instructions: String::new(),
            audio_format: "g711_ulaw".to_string(),
            intro_prompt: None,
            connect_timeout: Duration::from_secs(10),
            turn_detection: TurnDetectionConfig::default(),
        }
    }
}

/// Turn detection configuration.
///
/// Barge-in depends on the provider reporting caller speech, so the default is
/// server-driven voice activity detection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum TurnDetectionConfig {
    /// Server-side Voice Activity Detection
    #[serde(rename = "server_vad")]
    ServerVad {
        /// Activation threshold (0.0 to 1.0)
        #[serde(default, skip_serializing_if = "Option::is_none")]
        threshold: Option<f32>,
        /// Audio to include before speech starts (ms)
        #[serde(default, skip_serializing_if = "Option::is_none")]
        prefix_padding_ms: Option<u32>,
        /// Silence duration to detect end of speech (ms)
        #[serde(default, skip_serializing_if = "Option::is_none")]
        silence_duration_ms: Option<u32>,
    },
}

impl Default for TurnDetectionConfig {
    fn default() -> Self {
        Self::ServerVad {
            threshold: None,
            prefix_padding_ms: None,
            silence_duration_ms: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_targets_openai() {
        let config = VoiceServiceConfig::default();
        assert_eq!(config.url, OPENAI_REALTIME_URL);
        assert_eq!(config.audio_format, "g711_ulaw");
        assert!(config.intro_prompt.is_none());
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_turn_detection_default_serializes_bare_server_vad() {
        let json = serde_json::to_value(TurnDetectionConfig::default()).unwrap();
        assert_eq!(json, serde_json::json!({"type": "server_vad"}));
    }

    #[test]
    fn test_turn_detection_with_tuning() {
        let td = TurnDetectionConfig::ServerVad {
            threshold: Some(0.6),
            prefix_padding_ms: Some(300),
            silence_duration_ms: None,
        };
        let json = serde_json::to_value(&td).unwrap();
        assert_eq!(json["type"], "server_vad");
        assert_eq!(json["prefix_padding_ms"], 300);
        assert!(json.get("silence_duration_ms").is_none());
    }

    #[test]
    fn test_error_display() {
        let err = RealtimeError::Timeout("handshake".to_string());
        assert_eq!(err.to_string(), "Operation timed out: handshake");
        assert_eq!(RealtimeError::NotConnected.to_string(), "Not connected");
    }
}
