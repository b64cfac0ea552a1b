use serde::Deserialize;
use std::path::PathBuf;

/// Complete YAML configuration structure
///
/// All fields are optional to allow partial configuration. Values present in the
/// file take precedence over environment variables.
///
/// # Example YAML structure
/// ```yaml
/// server:
///   host: "0.0.0.0"
///   port: 3001
///   tls:
///     enabled: true
///     cert_path: "/etc/callrelay/cert.pem"
///     key_path: "/etc/callrelay/key.pem"
///
/// voice_service:
///   api_key: "sk-..."
///   url: "wss://api.openai.com/v1/realtime"
///   model: "gpt-4o-realtime-preview-2024-10-01"
///   voice: "alloy"
///   audio_format: "g711_ulaw"
///   instructions: "You are a friendly receptionist."
///   intro_prompt: "Greet the caller and ask how you can help."
///   connect_timeout_ms: 10000
///
/// relay:
///   max_pending_frames: 1500
///   send_playback_marks: true
///
/// security:
///   max_call_connections: 200
///   max_connections_per_ip: 20
/// ```
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub server: Option<ServerYaml>,
    pub voice_service: Option<VoiceServiceYaml>,
    pub relay: Option<RelayYaml>,
    pub security: Option<SecurityYaml>,
}

/// Server configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ServerYaml {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub tls: Option<TlsYaml>,
}

/// TLS configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct TlsYaml {
    pub enabled: Option<bool>,
    pub cert_path: Option<String>,
    pub key_path: Option<String>,
}

/// Voice service connection settings from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct VoiceServiceYaml {
    pub api_key: Option<String>,
    pub url: Option<String>,
    pub model: Option<String>,
    pub voice: Option<String>,
    pub audio_format: Option<String>,
    pub instructions: Option<String>,
    /// File containing the behavioral instructions. Ignored when `instructions` is set.
    pub instructions_path: Option<String>,
    pub intro_prompt: Option<String>,
    pub connect_timeout_ms: Option<u64>,
}

/// Relay tuning from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RelayYaml {
    pub max_pending_frames: Option<usize>,
    pub send_playback_marks: Option<bool>,
}

/// Connection limits from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct SecurityYaml {
    pub max_call_connections: Option<usize>,
    pub max_connections_per_ip: Option<u32>,
}

impl YamlConfig {
    /// Load YAML configuration from a file
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file {}: {e}", path.display()))?;

        let config: YamlConfig = serde_yaml::from_str(&contents)
            .map_err(|e| format!("Failed to parse YAML config: {e}"))?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_yaml_config_full() {
        let yaml = r#"
server:
  host: "127.0.0.1"
  port: 8080
  tls:
    enabled: true
    cert_path: "/tmp/cert.pem"
    key_path: "/tmp/key.pem"

voice_service:
  api_key: "sk-yaml"
  url: "ws://localhost:9000/v1/realtime"
  model: "gpt-4o-mini-realtime-preview"
  voice: "shimmer"
  audio_format: "g711_alaw"
  instructions: "Be brief."
  intro_prompt: "Say hello."
  connect_timeout_ms: 2500

relay:
  max_pending_frames: 64
  send_playback_marks: false

security:
  max_call_connections: 10
  max_connections_per_ip: 2
"#;
        let config: YamlConfig = serde_yaml::from_str(yaml).unwrap();

        let server = config.server.unwrap();
        assert_eq!(server.host, Some("127.0.0.1".to_string()));
        assert_eq!(server.port, Some(8080));
        let tls = server.tls.unwrap();
        assert_eq!(tls.enabled, Some(true));
        assert_eq!(tls.cert_path, Some("/tmp/cert.pem".to_string()));

        let voice = config.voice_service.unwrap();
        assert_eq!(voice.api_key, Some("sk-yaml".to_string()));
        assert_eq!(voice.voice, Some("shimmer".to_string()));
        assert_eq!(voice.audio_format, Some("g711_alaw".to_string()));
        assert_eq!(voice.intro_prompt, Some("Say hello.".to_string()));
        assert_eq!(voice.connect_timeout_ms, Some(2500));

        let relay = config.relay.unwrap();
        assert_eq!(relay.max_pending_frames, Some(64));
        assert_eq!(relay.send_playback_marks, Some(false));

        let security = config.security.unwrap();
        assert_eq!(security.max_call_connections, Some(10));
        assert_eq!(security.max_connections_per_ip, Some(2));
    }

    #[test]
    fn test_yaml_config_empty() {
        let config: YamlConfig = serde_yaml::from_str("{}").unwrap();
        assert!(config.server.is_none());
        assert!(config.voice_service.is_none());
        assert!(config.relay.is_none());
    }

    #[test]
    fn test_yaml_config_unknown_sections_ignored() {
        let yaml = r#"
server:
  port: 4000
metrics:
  enabled: true
"#;
        let config: YamlConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.server.unwrap().port, Some(4000));
    }

    #[test]
    fn test_yaml_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.yaml");
        fs::write(&path, "relay:\n  max_pending_frames: 10\n").unwrap();

        let config = YamlConfig::from_file(&path).unwrap();
        assert_eq!(config.relay.unwrap().max_pending_frames, Some(10));
    }

    #[test]
    fn test_yaml_from_file_invalid() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("bad.yaml");
        fs::write(&path, "relay: [unclosed").unwrap();

        let err = YamlConfig::from_file(&path).unwrap_err();
        assert!(err.to_string().contains("Failed to parse YAML"));
    }
}
