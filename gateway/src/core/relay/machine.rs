//! The per-call relay state machine.
//!
//! A [`Relay`] owns one [`CallSession`] and both outbound sinks. Events from
//! the two adapters arrive on a single channel and are handled one at a time,
//! so a barge-in can never interleave with a half-processed audio frame.

use std::fmt;

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::error::{RelayError, RelayResult};
use super::events::{CallerEvent, RelayEvent, VoiceEvent};
use super::session::CallSession;
use super::sink::{CallerSink, VoiceServiceSink};

/// Default cap on caller frames buffered while the voice service connects.
/// At 20 ms per telephony frame this is 30 seconds of audio.
pub const DEFAULT_MAX_PENDING_FRAMES: usize = 1500;

/// Relay tuning knobs.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Maximum caller frames queued before the voice channel is ready
    pub max_pending_frames: usize,
    /// Send a playback mark to the caller after every forwarded frame
    pub send_playback_marks: bool,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            max_pending_frames: DEFAULT_MAX_PENDING_FRAMES,
            send_playback_marks: true,
        }
    }
}

/// Lifecycle of a relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    AwaitingVoiceChannel,
    Streaming,
    /// Terminal
    Closed,
}

impl fmt::Display for RelayState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelayState::AwaitingVoiceChannel => write!(f, "awaiting_voice_channel"),
            RelayState::Streaming => write!(f, "streaming"),
            RelayState::Closed => write!(f, "closed"),
        }
    }
}

/// Why a relay reached [`RelayState::Closed`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayOutcome {
    /// The caller hung up or the caller socket ended
    CallerClosed,
    /// The voice service closed its side
    VoiceClosed,
    /// The voice service failed to connect or errored mid-call
    VoiceFailed(String),
    /// Writing to the caller failed
    CallerFailed(String),
}

impl RelayOutcome {
    fn closes_voice(&self) -> bool {
        matches!(self, RelayOutcome::CallerClosed | RelayOutcome::CallerFailed(_))
    }
}

/// Frame counters reported when a call ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    /// Caller frames accepted
    pub frames_in: u64,
    /// Generated frames forwarded to the caller
    pub frames_out: u64,
    /// Barge-ins that produced a truncate
    pub barge_ins: u64,
}

/// Bridges one Caller Channel with one Voice Service Channel.
pub struct Relay<V, C> {
    session: CallSession,
    config: RelayConfig,
    state: RelayState,
    voice: V,
    caller: C,
    voice_open: bool,
    caller_open: bool,
    outcome: Option<RelayOutcome>,
    stats: RelayStats,
}

impl<V, C> Relay<V, C>
where
    V: VoiceServiceSink,
    C: CallerSink,
{
    pub fn new(call_id: impl Into<String>, config: RelayConfig, voice: V, caller: C) -> Self {
        Self {
            session: CallSession::new(call_id),
            config,
            state: RelayState::AwaitingVoiceChannel,
            voice,
            caller,
            voice_open: true,
            caller_open: true,
            outcome: None,
            stats: RelayStats::default(),
        }
    }

    pub fn state(&self) -> RelayState {
        self.state
    }

    pub fn session(&self) -> &CallSession {
        &self.session
    }

    pub fn stats(&self) -> RelayStats {
        self.stats
    }

    pub fn outcome(&self) -> Option<&RelayOutcome> {
        self.outcome.as_ref()
    }

    /// Drive the relay until either side closes.
    ///
    /// If every event sender is dropped first, the caller is treated as gone.
    pub async fn run(mut self, mut events: mpsc::Receiver<RelayEvent>) -> RelayResult<RelayOutcome> {
        while let Some(event) = events.recv().await {
            if let Err(e) = self.handle_event(event).await {
                error!(
                    call_id = %self.session.call_id(),
                    frames_in = self.stats.frames_in,
                    "Relay terminated: {}",
                    e
                );
                return Err(e);
            }
            if let Some(outcome) = self.outcome.take() {
                self.log_finished(&outcome);
                return Ok(outcome);
            }
        }

        debug!(call_id = %self.session.call_id(), "Relay event channel closed");
        self.finish(RelayOutcome::CallerClosed).await;
        let outcome = self.outcome.take().unwrap_or(RelayOutcome::CallerClosed);
        self.log_finished(&outcome);
        Ok(outcome)
    }

    /// Process one event. Returns an error only on resource exhaustion, after
    /// both channels have been closed.
    pub async fn handle_event(&mut self, event: RelayEvent) -> RelayResult<()> {
        if self.state == RelayState::Closed {
            debug!(call_id = %self.session.call_id(), "Ignoring event after close: {:?}", event);
            return Ok(());
        }

        match event {
            RelayEvent::Caller(event) => self.handle_caller_event(event).await,
            RelayEvent::Voice(event) => {
                self.handle_voice_event(event).await;
                Ok(())
            }
        }
    }

    async fn handle_caller_event(&mut self, event: CallerEvent) -> RelayResult<()> {
        match event {
            CallerEvent::StreamStarted { stream_id } => {
                info!(
                    call_id = %self.session.call_id(),
                    stream_id = %stream_id,
                    "Call stream started"
                );
                self.session.start_stream(stream_id);
            }
            CallerEvent::AudioFrame {
                payload,
                timestamp_ms,
            } => {
                if self.session.stream_id().is_none() {
                    warn!(
                        call_id = %self.session.call_id(),
                        "Dropping caller audio received before stream start"
                    );
                    return Ok(());
                }
                // Clock first so a barge-in triggered after this frame sees it
                self.session.record_media_timestamp(timestamp_ms);
                self.stats.frames_in += 1;

                match self.state {
                    RelayState::AwaitingVoiceChannel => {
                        if let Err(e) = self
                            .session
                            .enqueue_pending(payload, self.config.max_pending_frames)
                        {
                            self.state = RelayState::Closed;
                            self.close_voice().await;
                            self.close_caller().await;
                            return Err(e);
                        }
                    }
                    RelayState::Streaming => {
                        self.forward_to_voice(payload).await;
                    }
                    RelayState::Closed => {}
                }
            }
            CallerEvent::PlaybackMarkAck => self.acknowledge_mark().await,
            CallerEvent::StreamClosed => {
                info!(call_id = %self.session.call_id(), "Caller stream closed");
                self.finish(RelayOutcome::CallerClosed).await;
            }
        }
        Ok(())
    }

    async fn handle_voice_event(&mut self, event: VoiceEvent) {
        match event {
            VoiceEvent::ChannelReady => self.on_voice_ready().await,
            VoiceEvent::GeneratedAudioFrame {
                payload,
                content_id,
            } => self.forward_to_caller(payload, content_id).await,
            VoiceEvent::GeneratedAudioDone { content_id } => {
                if self
                    .session
                    .utterance_mut()
                    .mark_generation_done(&content_id)
                {
                    debug!(
                        call_id = %self.session.call_id(),
                        content_id = %content_id,
                        "Generation done"
                    );
                    self.maybe_complete_utterance();
                }
            }
            VoiceEvent::CallerSpeechStarted => self.barge_in().await,
            VoiceEvent::PlaybackMarkAck => self.acknowledge_mark().await,
            VoiceEvent::ChannelClosed => {
                info!(call_id = %self.session.call_id(), "Voice service channel closed");
                self.voice_open = false;
                self.finish(RelayOutcome::VoiceClosed).await;
            }
            VoiceEvent::ChannelError(e) => {
                error!(call_id = %self.session.call_id(), "Voice service channel error: {}", e);
                self.voice_open = false;
                self.finish(RelayOutcome::VoiceFailed(e.to_string())).await;
            }
        }
    }

    async fn on_voice_ready(&mut self) {
        if self.state != RelayState::AwaitingVoiceChannel {
            debug!(call_id = %self.session.call_id(), "Duplicate voice channel ready");
            return;
        }

        self.state = RelayState::Streaming;
        let pending = self.session.mark_voice_ready();
        info!(
            call_id = %self.session.call_id(),
            flushed = pending.len(),
            "Voice service channel ready"
        );

        for payload in pending {
            if !self.forward_to_voice(payload).await {
                break;
            }
        }
    }

    async fn forward_to_voice(&mut self, payload: String) -> bool {
        match self.voice.append_audio(payload).await {
            Ok(()) => true,
            Err(e) => {
                warn!(call_id = %self.session.call_id(), "Failed to forward caller audio: {}", e);
                self.voice_open = false;
                self.finish(RelayOutcome::VoiceFailed(e.to_string())).await;
                false
            }
        }
    }

    async fn forward_to_caller(&mut self, payload: String, content_id: String) {
        let Some(stream_id) = self.session.stream_id().map(str::to_string) else {
            debug!(
                call_id = %self.session.call_id(),
                content_id = %content_id,
                "Dropping generated audio with no caller stream"
            );
            return;
        };

        let latest = self.session.latest_media_timestamp();
        if self.session.utterance_mut().observe_frame(&content_id, latest) {
            debug!(
                call_id = %self.session.call_id(),
                content_id = %content_id,
                start_ms = latest,
                "Utterance playback started"
            );
        }

        if let Err(e) = self.caller.send_media(&stream_id, payload).await {
            self.fail_caller(e).await;
            return;
        }
        self.stats.frames_out += 1;

        let token = self.session.next_mark();
        self.session.utterance_mut().push_mark(token);
        if self.config.send_playback_marks
            && let Err(e) = self.caller.send_mark(&stream_id, &token.to_string()).await
        {
            self.fail_caller(e).await;
        }
    }

    async fn barge_in(&mut self) {
        let latest = self.session.latest_media_timestamp();
        let Some((content_id, audio_end_ms)) =
            self.session.utterance_mut().take_truncation(latest)
        else {
            debug!(call_id = %self.session.call_id(), "Caller speech with nothing playing");
            return;
        };

        info!(
            call_id = %self.session.call_id(),
            content_id = %content_id,
            audio_end_ms,
            "Barge-in, truncating utterance"
        );
        self.stats.barge_ins += 1;

        if let Err(e) = self.voice.truncate(&content_id, audio_end_ms).await {
            warn!(call_id = %self.session.call_id(), "Failed to send truncate: {}", e);
            self.voice_open = false;
            self.finish(RelayOutcome::VoiceFailed(e.to_string())).await;
            return;
        }

        if let Some(stream_id) = self.session.stream_id().map(str::to_string)
            && let Err(e) = self.caller.clear(&stream_id).await
        {
            self.fail_caller(e).await;
        }
    }

    async fn acknowledge_mark(&mut self) {
        if self.session.utterance_mut().pop_mark().is_none() {
            debug!(call_id = %self.session.call_id(), "Playback mark with nothing outstanding");
            return;
        }
        self.maybe_complete_utterance();
    }

    fn maybe_complete_utterance(&mut self) {
        if self.session.utterance().is_playback_complete() {
            debug!(
                call_id = %self.session.call_id(),
                content_id = ?self.session.utterance().content_id(),
                "Utterance playback complete"
            );
            self.session.utterance_mut().reset();
        }
    }

    async fn fail_caller(&mut self, e: RelayError) {
        warn!(call_id = %self.session.call_id(), "Failed to write to caller: {}", e);
        self.caller_open = false;
        self.finish(RelayOutcome::CallerFailed(e.to_string())).await;
    }

    /// Enter the terminal state and close the counterpart of the side that ended.
    async fn finish(&mut self, outcome: RelayOutcome) {
        if self.state == RelayState::Closed {
            return;
        }
        self.state = RelayState::Closed;

        if outcome.closes_voice() {
            self.caller_open = false;
            self.close_voice().await;
        } else {
            self.voice_open = false;
            self.close_caller().await;
        }
        self.outcome = Some(outcome);
    }

    async fn close_voice(&mut self) {
        if !self.voice_open {
            return;
        }
        self.voice_open = false;
        if let Err(e) = self.voice.close().await {
            warn!(call_id = %self.session.call_id(), "Error closing voice service channel: {}", e);
        }
    }

    async fn close_caller(&mut self) {
        if !self.caller_open {
            return;
        }
        self.caller_open = false;
        if let Err(e) = self.caller.close().await {
            warn!(call_id = %self.session.call_id(), "Error closing caller channel: {}", e);
        }
    }

    fn log_finished(&self, outcome: &RelayOutcome) {
        info!(
            call_id = %self.session.call_id(),
            outcome = ?outcome,
            frames_in = self.stats.frames_in,
            frames_out = self.stats.frames_out,
            barge_ins = self.stats.barge_ins,
            "Relay finished"
        );
    }
}
