use thiserror::Error;

use crate::core::realtime::RealtimeError;

/// Errors surfaced by the relay core.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Caller audio kept arriving while the voice service never became ready
    #[error("Pending inbound audio exceeded {limit} frames while awaiting the voice service")]
    PendingQueueFull { limit: usize },

    /// Voice service channel failure
    #[error("Voice service channel error: {0}")]
    VoiceChannel(#[from] RealtimeError),

    /// Caller channel failure
    #[error("Caller channel error: {0}")]
    CallerChannel(String),
}

/// Result type for relay operations.
pub type RelayResult<T> = Result<T, RelayError>;
