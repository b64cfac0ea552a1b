//! Call relay core.
//!
//! Bridges a Caller Channel and a Voice Service Channel for one phone call,
//! buffering caller audio while the voice service connects and implementing
//! barge-in (truncate upstream, clear downstream).

pub mod error;
pub mod events;
pub mod machine;
pub mod session;
pub mod sink;

pub use error::{RelayError, RelayResult};
pub use events::{CallerEvent, RelayEvent, VoiceEvent};
pub use machine::{
    DEFAULT_MAX_PENDING_FRAMES, Relay, RelayConfig, RelayOutcome, RelayState, RelayStats,
};
pub use session::{ActiveUtterance, CallSession, MarkToken};
pub use sink::{CallerSink, VoiceServiceSink};
