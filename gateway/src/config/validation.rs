use std::path::PathBuf;

/// Validate TLS configuration
///
/// When TLS is requested both the certificate and the private key must be provided
/// and must exist on disk.
pub fn validate_tls(
    enabled: bool,
    cert_path: &Option<PathBuf>,
    key_path: &Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    if !enabled {
        return Ok(());
    }

    let (Some(cert), Some(key)) = (cert_path, key_path) else {
        return Err("TLS_CERT_PATH and TLS_KEY_PATH must both be set when TLS is enabled".into());
    };

    for (name, path) in [("TLS_CERT_PATH", cert), ("TLS_KEY_PATH", key)] {
        if !path.exists() {
            return Err(format!("{name} file does not exist: {}", path.display()).into());
        }
    }

    Ok(())
}

/// Validate the voice service endpoint
///
/// Must be an absolute `ws://` or `wss://` URL.
pub fn validate_voice_service_url(url: &str) -> Result<(), Box<dyn std::error::Error>> {
    let parsed = url::Url::parse(url)
        .map_err(|e| format!("Invalid OPENAI_REALTIME_URL '{url}': {e}"))?;

    match parsed.scheme() {
        "ws" | "wss" => Ok(()),
        other => Err(format!(
            "OPENAI_REALTIME_URL must use ws:// or wss://, got '{other}://'"
        )
        .into()),
    }
}

/// Validate relay and adapter limits
pub fn validate_relay_limits(
    max_pending_frames: usize,
    connect_timeout_ms: u64,
) -> Result<(), Box<dyn std::error::Error>> {
    if max_pending_frames == 0 {
        return Err("RELAY_MAX_PENDING_FRAMES must be greater than 0".into());
    }
    if connect_timeout_ms == 0 {
        return Err("REALTIME_CONNECT_TIMEOUT_MS must be greater than 0".into());
    }
    Ok(())
}
