pub mod realtime;
pub mod relay;

pub use realtime::{OpenAIRealtime, RealtimeError, RealtimeResult, VoiceServiceConfig};
pub use relay::{Relay, RelayConfig, RelayError, RelayOutcome, RelayResult};
