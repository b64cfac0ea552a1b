//! Per-call state owned by exactly one relay.

use std::collections::VecDeque;
use std::fmt;

use super::error::{RelayError, RelayResult};

/// Acknowledgement token pushed for every generated frame sent to the caller.
///
/// Tokens are not matched against specific acks. A non-empty queue only means
/// something is still playing or was just played.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarkToken(u64);

impl fmt::Display for MarkToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "frame-{}", self.0)
    }
}

// =============================================================================
// Active Utterance
// =============================================================================

/// The generated response currently being streamed to the caller.
#[derive(Debug, Default)]
pub struct ActiveUtterance {
    content_id: Option<String>,
    /// Latched once from the caller clock on the first forwarded frame
    playback_start_timestamp: Option<u64>,
    outstanding_frame_marks: VecDeque<MarkToken>,
    generation_done: bool,
}

impl ActiveUtterance {
    pub fn content_id(&self) -> Option<&str> {
        self.content_id.as_deref()
    }

    pub fn playback_start_timestamp(&self) -> Option<u64> {
        self.playback_start_timestamp
    }

    pub fn outstanding_marks(&self) -> usize {
        self.outstanding_frame_marks.len()
    }

    /// True when nothing about a previous utterance is retained.
    pub fn is_empty(&self) -> bool {
        self.content_id.is_none()
            && self.playback_start_timestamp.is_none()
            && self.outstanding_frame_marks.is_empty()
    }

    /// Record a generated frame for `content_id` at caller time `latest_ms`.
    ///
    /// A different content id starts a new utterance and re-latches the start.
    /// Outstanding marks are kept since they still describe audio in flight.
    /// Returns true when the start timestamp was latched by this frame.
    pub fn observe_frame(&mut self, content_id: &str, latest_ms: u64) -> bool {
        if self.content_id.as_deref() != Some(content_id) {
            self.content_id = Some(content_id.to_string());
            self.playback_start_timestamp = None;
            self.generation_done = false;
        }
        if self.playback_start_timestamp.is_none() {
            self.playback_start_timestamp = Some(latest_ms);
            return true;
        }
        false
    }

    pub fn push_mark(&mut self, token: MarkToken) {
        self.outstanding_frame_marks.push_back(token);
    }

    /// Pop one token. Acks with nothing outstanding are ignored.
    pub fn pop_mark(&mut self) -> Option<MarkToken> {
        self.outstanding_frame_marks.pop_front()
    }

    /// Note that generation finished for `content_id`. Returns false if it is
    /// not the active item.
    pub fn mark_generation_done(&mut self, content_id: &str) -> bool {
        if self.content_id.as_deref() == Some(content_id) {
            self.generation_done = true;
            true
        } else {
            false
        }
    }

    /// Generation finished and every forwarded frame has been acknowledged.
    pub fn is_playback_complete(&self) -> bool {
        self.generation_done && self.outstanding_frame_marks.is_empty()
    }

    /// Compute the barge-in cutoff and reset the utterance.
    ///
    /// Returns `(content_id, audio_end_ms)` only while audio is in flight and the
    /// start has been latched; otherwise leaves state untouched and returns `None`.
    pub fn take_truncation(&mut self, latest_ms: u64) -> Option<(String, u64)> {
        if self.outstanding_frame_marks.is_empty() {
            return None;
        }
        let start = self.playback_start_timestamp?;
        let content_id = self.content_id.clone()?;
        let elapsed = latest_ms.saturating_sub(start);
        self.reset();
        Some((content_id, elapsed))
    }

    /// Drop all utterance state, start timestamp included.
    pub fn reset(&mut self) {
        self.content_id = None;
        self.playback_start_timestamp = None;
        self.outstanding_frame_marks.clear();
        self.generation_done = false;
    }
}

// =============================================================================
// Call Session
// =============================================================================

/// State for one phone call.
#[derive(Debug)]
pub struct CallSession {
    call_id: String,
    stream_id: Option<String>,
    latest_media_timestamp: u64,
    voice_channel_ready: bool,
    pending_inbound_audio: VecDeque<String>,
    next_mark: u64,
    utterance: ActiveUtterance,
}

impl CallSession {
    pub fn new(call_id: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            stream_id: None,
            latest_media_timestamp: 0,
            voice_channel_ready: false,
            pending_inbound_audio: VecDeque::new(),
            next_mark: 0,
            utterance: ActiveUtterance::default(),
        }
    }

    pub fn call_id(&self) -> &str {
        &self.call_id
    }

    pub fn stream_id(&self) -> Option<&str> {
        self.stream_id.as_deref()
    }

    pub fn latest_media_timestamp(&self) -> u64 {
        self.latest_media_timestamp
    }

    pub fn voice_channel_ready(&self) -> bool {
        self.voice_channel_ready
    }

    pub fn pending_len(&self) -> usize {
        self.pending_inbound_audio.len()
    }

    pub fn utterance(&self) -> &ActiveUtterance {
        &self.utterance
    }

    pub fn utterance_mut(&mut self) -> &mut ActiveUtterance {
        &mut self.utterance
    }

    /// Begin a call segment: new stream id, clock back to zero, no utterance.
    pub fn start_stream(&mut self, stream_id: String) {
        self.stream_id = Some(stream_id);
        self.latest_media_timestamp = 0;
        self.utterance.reset();
    }

    /// Advance the caller clock. Timestamps never move backwards within a segment.
    pub fn record_media_timestamp(&mut self, timestamp_ms: u64) {
        self.latest_media_timestamp = self.latest_media_timestamp.max(timestamp_ms);
    }

    /// Buffer a caller frame until the voice service is ready.
    pub fn enqueue_pending(&mut self, payload: String, limit: usize) -> RelayResult<()> {
        if self.pending_inbound_audio.len() >= limit {
            return Err(RelayError::PendingQueueFull { limit });
        }
        self.pending_inbound_audio.push_back(payload);
        Ok(())
    }

    /// Flip to ready and hand back the buffered frames in arrival order.
    pub fn mark_voice_ready(&mut self) -> VecDeque<String> {
        self.voice_channel_ready = true;
        std::mem::take(&mut self.pending_inbound_audio)
    }

    pub fn next_mark(&mut self) -> MarkToken {
        self.next_mark += 1;
        MarkToken(self.next_mark)
    }
}
