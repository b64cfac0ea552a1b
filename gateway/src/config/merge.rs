use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use super::utils::parse_bool;
use super::yaml::YamlConfig;
use super::{
    DEFAULT_AUDIO_FORMAT, DEFAULT_CONNECT_TIMEOUT_MS, DEFAULT_INSTRUCTIONS,
    DEFAULT_MAX_CONNECTIONS_PER_IP, DEFAULT_MAX_PENDING_FRAMES, DEFAULT_MODEL, DEFAULT_VOICE,
    ServerConfig, TlsConfig,
};
use crate::core::realtime::OPENAI_REALTIME_URL;

/// Parse an optional numeric environment variable, failing loudly on garbage
fn parse_env<T>(name: &str) -> Result<Option<T>, String>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| format!("Invalid {name} environment variable '{raw}': {e}")),
        Err(_) => Ok(None),
    }
}

/// Merge YAML configuration with environment variables
///
/// Priority order (highest to lowest):
/// 1. YAML configuration values
/// 2. Environment variables
/// 3. Default values
///
/// # Arguments
/// * `yaml_config` - Optional YAML configuration to use as overrides
pub fn merge_config(
    yaml_config: Option<YamlConfig>,
) -> Result<ServerConfig, Box<dyn std::error::Error>> {
    let yaml = yaml_config.unwrap_or_default();

    // Helper macro to get value with priority: YAML > ENV > Default
    macro_rules! get_value {
        ($env_var:expr, $yaml_value:expr, $default:expr) => {
            $yaml_value
                .or_else(|| env::var($env_var).ok())
                .unwrap_or_else(|| $default.to_string())
        };
    }

    // Helper macro for optional values: YAML > ENV
    macro_rules! get_optional {
        ($env_var:expr, $yaml_value:expr) => {
            $yaml_value.or_else(|| env::var($env_var).ok())
        };
    }

    // Helper macro for parsed values: YAML > ENV > Default
    macro_rules! get_parsed {
        ($env_var:expr, $yaml_value:expr, $default:expr) => {
            match $yaml_value {
                Some(value) => value,
                None => parse_env($env_var)?.unwrap_or($default),
            }
        };
    }

    let server = yaml.server.as_ref();
    let voice = yaml.voice_service.as_ref();
    let relay = yaml.relay.as_ref();
    let security = yaml.security.as_ref();

    // Server configuration
    let host = get_value!("HOST", server.and_then(|s| s.host.clone()), "0.0.0.0");
    let port: u16 = get_parsed!("PORT", server.and_then(|s| s.port), 3001);

    // TLS configuration
    let tls_yaml = server.and_then(|s| s.tls.as_ref());
    let cert_path = get_optional!(
        "TLS_CERT_PATH",
        tls_yaml.and_then(|t| t.cert_path.clone())
    )
    .map(PathBuf::from);
    let key_path =
        get_optional!("TLS_KEY_PATH", tls_yaml.and_then(|t| t.key_path.clone())).map(PathBuf::from);
    let tls_enabled = tls_yaml
        .and_then(|t| t.enabled)
        .unwrap_or(cert_path.is_some() || key_path.is_some());
    super::validation::validate_tls(tls_enabled, &cert_path, &key_path)?;
    let tls = match (tls_enabled, cert_path, key_path) {
        (true, Some(cert_path), Some(key_path)) => Some(TlsConfig {
            cert_path,
            key_path,
        }),
        _ => None,
    };

    // Voice service configuration
    let openai_api_key = get_optional!("OPENAI_API_KEY", voice.and_then(|v| v.api_key.clone()));
    let voice_service_url = get_value!(
        "OPENAI_REALTIME_URL",
        voice.and_then(|v| v.url.clone()),
        OPENAI_REALTIME_URL
    );
    let realtime_model = get_value!(
        "REALTIME_MODEL",
        voice.and_then(|v| v.model.clone()),
        DEFAULT_MODEL
    );
    let realtime_voice = get_value!(
        "REALTIME_VOICE",
        voice.and_then(|v| v.voice.clone()),
        DEFAULT_VOICE
    );
    let realtime_audio_format = get_value!(
        "REALTIME_AUDIO_FORMAT",
        voice.and_then(|v| v.audio_format.clone()),
        DEFAULT_AUDIO_FORMAT
    );

    let inline_instructions = get_optional!(
        "REALTIME_INSTRUCTIONS",
        voice.and_then(|v| v.instructions.clone())
    );
    let realtime_instructions = match inline_instructions {
        Some(text) => text,
        None => match get_optional!(
            "REALTIME_INSTRUCTIONS_PATH",
            voice.and_then(|v| v.instructions_path.clone())
        ) {
            Some(path) => std::fs::read_to_string(&path)
                .map_err(|e| format!("Failed to read instructions file {path}: {e}"))?
                .trim()
                .to_string(),
            None => DEFAULT_INSTRUCTIONS.to_string(),
        },
    };

    let realtime_intro_prompt = get_optional!(
        "REALTIME_INTRO_PROMPT",
        voice.and_then(|v| v.intro_prompt.clone())
    )
    .filter(|prompt| !prompt.trim().is_empty());

    let realtime_connect_timeout_ms: u64 = get_parsed!(
        "REALTIME_CONNECT_TIMEOUT_MS",
        voice.and_then(|v| v.connect_timeout_ms),
        DEFAULT_CONNECT_TIMEOUT_MS
    );

    // Relay configuration
    let relay_max_pending_frames: usize = get_parsed!(
        "RELAY_MAX_PENDING_FRAMES",
        relay.and_then(|r| r.max_pending_frames),
        DEFAULT_MAX_PENDING_FRAMES
    );
    let relay_send_playback_marks = relay
        .and_then(|r| r.send_playback_marks)
        .or_else(|| {
            env::var("RELAY_SEND_PLAYBACK_MARKS")
                .ok()
                .and_then(|v| parse_bool(&v))
        })
        .unwrap_or(true);

    // Connection limits
    let max_call_connections: Option<usize> = match security.and_then(|s| s.max_call_connections) {
        Some(limit) => Some(limit),
        None => parse_env("MAX_CALL_CONNECTIONS")?,
    };
    let max_connections_per_ip: u32 = get_parsed!(
        "MAX_CONNECTIONS_PER_IP",
        security.and_then(|s| s.max_connections_per_ip),
        DEFAULT_MAX_CONNECTIONS_PER_IP
    );

    Ok(ServerConfig {
        host,
        port,
        tls,
        openai_api_key,
        voice_service_url,
        realtime_model,
        realtime_voice,
        realtime_instructions,
        realtime_audio_format,
        realtime_intro_prompt,
        realtime_connect_timeout_ms,
        relay_max_pending_frames,
        relay_send_playback_marks,
        max_call_connections,
        max_connections_per_ip,
    })
}
