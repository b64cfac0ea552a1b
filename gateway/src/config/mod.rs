//! Configuration module for the CallRelay gateway
//!
//! This module handles server configuration from various sources: .env files, YAML files,
//! and environment variables. Priority: YAML > ENV vars > .env values > defaults.
//!
//! # Modules
//! - `yaml`: YAML configuration file loading
//! - `env`: Environment variable loading
//! - `merge`: Merging YAML and environment configurations
//! - `validation`: Configuration validation logic
//! - `utils`: Utility functions for configuration parsing
//!
//! # Example
//! ```rust,no_run
//! use callrelay_gateway::config::ServerConfig;
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Load from environment variables only
//! let config = ServerConfig::from_env()?;
//!
//! // Load from YAML file with environment variable overrides
//! let config_path = PathBuf::from("config.yaml");
//! let config = ServerConfig::from_file(&config_path)?;
//!
//! println!("Server listening on {}", config.address());
//! # Ok(())
//! # }
//! ```

use std::path::PathBuf;
use std::time::Duration;

use zeroize::Zeroizing;

mod env;
mod merge;
mod utils;
mod validation;
mod yaml;

use crate::core::realtime::VoiceServiceConfig;
use crate::core::relay::RelayConfig;

/// Default realtime model requested from the voice service
pub const DEFAULT_MODEL: &str = "gpt-4o-realtime-preview-2024-10-01";

/// Default synthesized voice
pub const DEFAULT_VOICE: &str = "alloy";

/// Telephony media streams carry 8 kHz G.711 u-law
pub const DEFAULT_AUDIO_FORMAT: &str = "g711_ulaw";

/// Behavioral instructions used when none are configured
pub const DEFAULT_INSTRUCTIONS: &str = "You are a helpful and friendly voice assistant \
talking with a caller over the phone. Keep answers short and conversational, and stop \
speaking as soon as the caller interrupts.";

/// Upper bound on connect plus session handshake with the voice service
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 10_000;

pub use crate::core::relay::DEFAULT_MAX_PENDING_FRAMES;

pub const DEFAULT_MAX_CONNECTIONS_PER_IP: u32 = 100;

/// TLS configuration for HTTPS and WSS
#[derive(Debug, Clone)]
pub struct TlsConfig {
    /// Path to the TLS certificate file (PEM format)
    pub cert_path: PathBuf,
    /// Path to the TLS private key file (PEM format)
    pub key_path: PathBuf,
}

/// Server configuration
///
/// Contains everything needed to run the gateway:
/// - Server settings (host, port, TLS)
/// - Voice service credentials and session defaults
/// - Relay tuning (pending queue bound, playback marks)
/// - Connection limits
#[derive(Debug, Clone)]
pub struct ServerConfig {
    // Server settings
    pub host: String,
    pub port: u16,

    // TLS configuration (optional)
    pub tls: Option<TlsConfig>,

    // Voice service settings
    /// OpenAI API key used for the Realtime API
    pub openai_api_key: Option<String>,
    /// Realtime endpoint, overridable for proxies and local mocks
    pub voice_service_url: String,
    pub realtime_model: String,
    pub realtime_voice: String,
    pub realtime_instructions: String,
    /// Audio format tag for both directions (pcm16, g711_ulaw, g711_alaw)
    pub realtime_audio_format: String,
    /// Optional text the assistant is asked to speak before the caller says anything
    pub realtime_intro_prompt: Option<String>,
    pub realtime_connect_timeout_ms: u64,

    // Relay settings
    /// Maximum caller frames buffered while the voice service is connecting
    pub relay_max_pending_frames: usize,
    /// Send a playback mark to the caller transport after each generated frame
    pub relay_send_playback_marks: bool,

    // Connection limits
    /// Maximum concurrent calls
    /// Default: None (unlimited)
    pub max_call_connections: Option<usize>,
    /// Maximum concurrent calls per IP address
    /// Default: 100
    pub max_connections_per_ip: u32,
}

/// Zeroize secret fields when the configuration is dropped.
impl Drop for ServerConfig {
    fn drop(&mut self) {
        use zeroize::Zeroize;

        if let Some(ref mut key) = self.openai_api_key {
            key.zeroize();
        }
    }
}

impl ServerConfig {
    /// Load configuration from a YAML file with environment variable base
    ///
    /// Priority order (highest to lowest):
    /// 1. YAML file values
    /// 2. Environment variables (actual ENV vars override .env values)
    /// 3. .env file values
    /// 4. Default values
    ///
    /// # Errors
    /// Returns an error if:
    /// - The YAML file cannot be read or is malformed
    /// - Environment variables have invalid formats
    /// - Configuration validation fails
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        let yaml_config = yaml::YamlConfig::from_file(path)?;
        let config = merge::merge_config(Some(yaml_config))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), Box<dyn std::error::Error>> {
        validation::validate_voice_service_url(&self.voice_service_url)?;
        validation::validate_relay_limits(
            self.relay_max_pending_frames,
            self.realtime_connect_timeout_ms,
        )?;
        Ok(())
    }

    /// Get the server address as "host:port"
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Check if TLS is enabled
    pub fn is_tls_enabled(&self) -> bool {
        self.tls.is_some()
    }

    /// Build the per-call voice service configuration
    ///
    /// A missing API key yields an empty string; the adapter rejects it when a call
    /// tries to connect so that the server itself can still start.
    pub fn voice_service_config(&self) -> VoiceServiceConfig {
        VoiceServiceConfig {
            api_key: Zeroizing::new(self.openai_api_key.clone().unwrap_or_default()),
            url: self.voice_service_url.clone(),
            model: self.realtime_model.clone(),
            voice: self.realtime_voice.clone(),
            instructions: self.realtime_instructions.clone(),
            audio_format: self.realtime_audio_format.clone(),
            intro_prompt: self.realtime_intro_prompt.clone(),
            connect_timeout: Duration::from_millis(self.realtime_connect_timeout_ms),
            ..Default::default()
        }
    }

    /// Build the per-call relay configuration
    pub fn relay_config(&self) -> RelayConfig {
        RelayConfig {
            max_pending_frames: self.relay_max_pending_frames,
            send_playback_marks: self.relay_send_playback_marks,
        }
    }

    /// Human readable summary with secrets redacted
    pub fn summary(&self) -> String {
        let api_key = if self.openai_api_key.is_some() {
            "<set>"
        } else {
            "<missing>"
        };
        format!(
            "address: {}\n\
             tls: {}\n\
             voice_service_url: {}\n\
             openai_api_key: {}\n\
             model: {}\n\
             voice: {}\n\
             audio_format: {}\n\
             intro_prompt: {}\n\
             connect_timeout_ms: {}\n\
             max_pending_frames: {}\n\
             send_playback_marks: {}\n\
             max_call_connections: {}\n\
             max_connections_per_ip: {}",
            self.address(),
            self.is_tls_enabled(),
            self.voice_service_url,
            api_key,
            self.realtime_model,
            self.realtime_voice,
            self.realtime_audio_format,
            self.realtime_intro_prompt.is_some(),
            self.realtime_connect_timeout_ms,
            self.relay_max_pending_frames,
            self.relay_send_playback_marks,
            self.max_call_connections
                .map(|limit| limit.to_string())
                .unwrap_or_else(|| "unlimited".to_string()),
            self.max_connections_per_ip,
        )
    }
}
