//! OpenAI Realtime voice service channel.
//!
//! One WebSocket per call. The connection task performs the session handshake,
//! reports `ChannelReady` to the relay, then shuttles relay commands upstream and
//! normalized server events downstream until either side closes.
//!
//! - Endpoint: `wss://api.openai.com/v1/realtime?model=<model>`
//! - Protocol: WebSocket with JSON events
//! - Audio: base64 payloads, passed through untouched

use std::time::Duration;

use async_trait::async_trait;
use base64::prelude::*;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use http::HeaderValue;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, trace, warn};
use zeroize::Zeroizing;

use super::config::{Modality, OPENAI_BETA_HEADER, OpenAIRealtimeAudioFormat, OpenAIRealtimeVoice};
use super::messages::{ClientEvent, ConversationItem, ServerEvent, SessionConfig};
use crate::core::realtime::base::{RealtimeError, RealtimeResult, VoiceServiceConfig};
use crate::core::relay::{RelayEvent, VoiceEvent, VoiceServiceSink};

/// Channel capacity for relay commands headed upstream.
///
/// The relay never waits on this channel: a full queue means the upstream has
/// stopped reading and the call is failed instead.
const WS_CHANNEL_CAPACITY: usize = 256;

/// Longest a single upstream write may block before the connection is treated as stalled.
const UPSTREAM_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

type VoiceSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;
type VoiceSink = SplitSink<VoiceSocket, Message>;

/// Commands the relay issues to the connection task.
#[derive(Debug)]
enum VoiceCommand {
    Append(String),
    Truncate { item_id: String, audio_end_ms: u64 },
    Close,
}

impl VoiceCommand {
    fn into_client_event(self) -> Option<ClientEvent> {
        match self {
            Self::Append(audio) => Some(ClientEvent::InputAudioBufferAppend { audio }),
            Self::Truncate {
                item_id,
                audio_end_ms,
            } => Some(ClientEvent::ConversationItemTruncate {
                item_id,
                content_index: 0,
                audio_end_ms,
            }),
            Self::Close => None,
        }
    }
}

// =============================================================================
// OpenAI Realtime Channel
// =============================================================================

/// Voice service channel backed by the OpenAI Realtime API.
pub struct OpenAIRealtime {
    config: VoiceServiceConfig,
    voice: OpenAIRealtimeVoice,
    audio_format: OpenAIRealtimeAudioFormat,
    call_id: String,
}

impl OpenAIRealtime {
    /// Validate the configuration for one call.
    pub fn new(config: VoiceServiceConfig, call_id: impl Into<String>) -> RealtimeResult<Self> {
        if config.api_key.trim().is_empty() {
            return Err(RealtimeError::AuthenticationFailed(
                "API key is required".to_string(),
            ));
        }

        url::Url::parse(&config.url).map_err(|e| {
            RealtimeError::InvalidConfiguration(format!("invalid URL '{}': {e}", config.url))
        })?;

        let voice = OpenAIRealtimeVoice::from_str_or_default(&config.voice);
        let audio_format = OpenAIRealtimeAudioFormat::from_str_or_default(&config.audio_format);

        Ok(Self {
            config,
            voice,
            audio_format,
            call_id: call_id.into(),
        })
    }

    /// Build the WebSocket URL with the model query parameter.
    pub fn build_ws_url(&self) -> RealtimeResult<String> {
        let mut url = url::Url::parse(&self.config.url)
            .map_err(|e| RealtimeError::InvalidConfiguration(e.to_string()))?;
        if !self.config.model.is_empty() {
            url.query_pairs_mut()
                .append_pair("model", &self.config.model);
        }
        Ok(url.to_string())
    }

    /// Build the handshake session configuration.
    pub fn build_session_config(&self) -> SessionConfig {
        SessionConfig {
            turn_detection: Some(self.config.turn_detection.clone()),
            input_audio_format: Some(self.audio_format.as_str().to_string()),
            output_audio_format: Some(self.audio_format.as_str().to_string()),
            voice: Some(self.voice.as_str().to_string()),
            instructions: Some(self.config.instructions.clone())
                .filter(|instructions| !instructions.is_empty()),
            modalities: Some(vec![Modality::Text, Modality::Audio]),
        }
    }

    /// Events sent immediately after the socket opens, in order.
    pub fn handshake_events(&self) -> Vec<ClientEvent> {
        let mut events = vec![ClientEvent::SessionUpdate {
            session: self.build_session_config(),
        }];
        if let Some(prompt) = &self.config.intro_prompt {
            events.push(ClientEvent::ConversationItemCreate {
                item: ConversationItem::text_message("user", prompt),
            });
            events.push(ClientEvent::ResponseCreate);
        }
        events
    }

    /// Start the connection task.
    ///
    /// Normalized events are delivered on `events`; the returned handle is the
    /// relay's upstream sink.
    pub fn spawn(self, events: mpsc::Sender<RelayEvent>) -> VoiceChannelHandle {
        let (tx, rx) = mpsc::channel::<VoiceCommand>(WS_CHANNEL_CAPACITY);
        let task = tokio::spawn(self.run(rx, events));
        VoiceChannelHandle {
            commands: tx,
            closed: false,
            task,
        }
    }

    async fn connect(&self) -> RealtimeResult<VoiceSocket> {
        let url = self.build_ws_url()?;

        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| RealtimeError::ConnectionFailed(e.to_string()))?;
        let bearer = Zeroizing::new(format!("Bearer {}", self.config.api_key.as_str()));
        let mut authorization = HeaderValue::from_str(&bearer)
            .map_err(|e| RealtimeError::InvalidConfiguration(e.to_string()))?;
        authorization.set_sensitive(true);
        request
            .headers_mut()
            .insert(http::header::AUTHORIZATION, authorization);
        request
            .headers_mut()
            .insert("OpenAI-Beta", HeaderValue::from_static(OPENAI_BETA_HEADER));

        let (mut ws_stream, _response) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| RealtimeError::ConnectionFailed(e.to_string()))?;

        info!(call_id = %self.call_id, "Connected to OpenAI Realtime API");

        for event in self.handshake_events() {
            let json = serde_json::to_string(&event)
                .map_err(|e| RealtimeError::SerializationError(e.to_string()))?;
            ws_stream
                .send(Message::Text(json.into()))
                .await
                .map_err(|e| RealtimeError::WebSocketError(e.to_string()))?;
        }

        debug!(
            call_id = %self.call_id,
            voice = %self.voice,
            audio_format = %self.audio_format,
            intro = self.config.intro_prompt.is_some(),
            "Session handshake sent"
        );

        Ok(ws_stream)
    }

    async fn run(
        self,
        mut commands: mpsc::Receiver<VoiceCommand>,
        events: mpsc::Sender<RelayEvent>,
    ) {
        let call_id = self.call_id.clone();
        let emit = |event: VoiceEvent| {
            let events = events.clone();
            async move { events.send(RelayEvent::Voice(event)).await.is_ok() }
        };

        let connect_timeout = self.config.connect_timeout;
        let connect = tokio::time::timeout(connect_timeout, self.connect());
        let ws_stream = tokio::select! {
            result = connect => match result {
                Ok(Ok(ws_stream)) => ws_stream,
                Ok(Err(e)) => {
                    error!(call_id = %call_id, "Voice service connection failed: {}", e);
                    emit(VoiceEvent::ChannelError(e)).await;
                    return;
                }
                Err(_) => {
                    error!(call_id = %call_id, "Voice service connection timed out");
                    emit(VoiceEvent::ChannelError(RealtimeError::Timeout(format!(
                        "connect did not finish within {}ms",
                        connect_timeout.as_millis()
                    ))))
                    .await;
                    return;
                }
            },
            _ = wait_for_close(&mut commands) => {
                info!(call_id = %call_id, "Voice service closed before connecting");
                return;
            }
        };

        let (mut ws_sink, mut ws_stream) = ws_stream.split();

        if !emit(VoiceEvent::ChannelReady).await {
            let _ = write_upstream(&mut ws_sink, Message::Close(None)).await;
            return;
        }

        loop {
            tokio::select! {
                command = commands.recv() => {
                    let Some(event) = command.and_then(VoiceCommand::into_client_event) else {
                        debug!(call_id = %call_id, "Closing voice service connection");
                        let _ = write_upstream(&mut ws_sink, Message::Close(None)).await;
                        break;
                    };

                    let json = match serde_json::to_string(&event) {
                        Ok(json) => json,
                        Err(e) => {
                            error!(call_id = %call_id, "Failed to serialize event: {}", e);
                            continue;
                        }
                    };

                    if let Err(e) = write_upstream(&mut ws_sink, Message::Text(json.into())).await {
                        error!(call_id = %call_id, "Failed to send to voice service: {}", e);
                        emit(VoiceEvent::ChannelError(e)).await;
                        break;
                    }
                }

                message = ws_stream.next() => match message {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ServerEvent>(&text) {
                            Ok(event) => {
                                if let Some(voice_event) = normalize_server_event(&call_id, event)
                                    && !emit(voice_event).await
                                {
                                    let _ = write_upstream(&mut ws_sink, Message::Close(None)).await;
                                    break;
                                }
                            }
                            Err(e) => {
                                warn!(call_id = %call_id, "Dropping malformed voice service event: {}", e);
                            }
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if let Err(e) = write_upstream(&mut ws_sink, Message::Pong(data)).await {
                            error!(call_id = %call_id, "Failed to send pong: {}", e);
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        info!(call_id = %call_id, ?frame, "Voice service closed the connection");
                        emit(VoiceEvent::ChannelClosed).await;
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        error!(call_id = %call_id, "Voice service WebSocket error: {}", e);
                        emit(VoiceEvent::ChannelError(RealtimeError::WebSocketError(e.to_string()))).await;
                        break;
                    }
                    None => {
                        info!(call_id = %call_id, "Voice service stream ended");
                        emit(VoiceEvent::ChannelClosed).await;
                        break;
                    }
                }
            }
        }
    }
}

/// Write one frame upstream, failing if the peer stops draining the socket.
async fn write_upstream(ws_sink: &mut VoiceSink, message: Message) -> RealtimeResult<()> {
    match tokio::time::timeout(UPSTREAM_WRITE_TIMEOUT, ws_sink.send(message)).await {
        Ok(result) => result.map_err(|e| RealtimeError::WebSocketError(e.to_string())),
        Err(_) => Err(RealtimeError::Timeout(format!(
            "upstream write blocked for {}ms",
            UPSTREAM_WRITE_TIMEOUT.as_millis()
        ))),
    }
}

/// Resolve once the relay asks for a close or drops its handle.
async fn wait_for_close(commands: &mut mpsc::Receiver<VoiceCommand>) {
    while let Some(command) = commands.recv().await {
        if matches!(command, VoiceCommand::Close) {
            return;
        }
        debug!(?command, "Dropping command issued before the voice service was ready");
    }
}

/// Map a server event onto the relay vocabulary.
///
/// Returns `None` for events that are only logged, or that carry an unusable payload.
pub fn normalize_server_event(call_id: &str, event: ServerEvent) -> Option<VoiceEvent> {
    match event {
        ServerEvent::AudioDelta { item_id, delta, .. } => {
            if delta.is_empty() {
                trace!(call_id, "Skipping empty audio delta");
                return None;
            }
            if let Err(e) = BASE64_STANDARD.decode(&delta) {
                warn!(call_id, item_id = %item_id, "Dropping audio delta with invalid base64: {}", e);
                return None;
            }
            Some(VoiceEvent::GeneratedAudioFrame {
                payload: delta,
                content_id: item_id,
            })
        }
        ServerEvent::AudioDone { item_id, .. } => {
            Some(VoiceEvent::GeneratedAudioDone { content_id: item_id })
        }
        ServerEvent::SpeechStarted { audio_start_ms, .. } => {
            debug!(call_id, ?audio_start_ms, "Caller speech started");
            Some(VoiceEvent::CallerSpeechStarted)
        }
        ServerEvent::Mark => Some(VoiceEvent::PlaybackMarkAck),
        ServerEvent::Error { error } => {
            error!(
                call_id,
                code = ?error.code,
                "OpenAI Realtime error: {} - {}",
                error.error_type,
                error.message
            );
            None
        }
        ServerEvent::SessionCreated { session } => {
            info!(call_id, session_id = %session.id, "OpenAI Realtime session created");
            None
        }
        ServerEvent::SessionUpdated { session } => {
            debug!(call_id, session_id = %session.id, voice = ?session.voice, "OpenAI Realtime session updated");
            None
        }
        ServerEvent::ConversationItemTruncated {
            item_id,
            audio_end_ms,
        } => {
            debug!(call_id, item_id = %item_id, ?audio_end_ms, "Item truncated upstream");
            None
        }
        ServerEvent::ResponseDone { response } => {
            debug!(call_id, response_id = ?response.map(|r| r.id), "Response done");
            None
        }
        ServerEvent::SpeechStopped { .. } | ServerEvent::Unhandled => {
            trace!(call_id, "Unhandled voice service event");
            None
        }
    }
}

// =============================================================================
// Handle
// =============================================================================

/// Relay-side handle to a running voice service connection.
pub struct VoiceChannelHandle {
    commands: mpsc::Sender<VoiceCommand>,
    closed: bool,
    task: JoinHandle<()>,
}

impl VoiceChannelHandle {
    /// Queue a command without waiting, so a stalled upstream cannot stall the relay.
    fn send(&self, command: VoiceCommand) -> RealtimeResult<()> {
        if self.closed {
            return Err(RealtimeError::NotConnected);
        }
        self.commands.try_send(command).map_err(|e| match e {
            TrySendError::Full(_) => {
                RealtimeError::WebSocketError("upstream backpressure".to_string())
            }
            TrySendError::Closed(_) => RealtimeError::NotConnected,
        })
    }

    /// Whether the connection task has exited.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

#[async_trait]
impl VoiceServiceSink for VoiceChannelHandle {
    async fn append_audio(&mut self, payload: String) -> RealtimeResult<()> {
        self.send(VoiceCommand::Append(payload))
    }

    async fn truncate(&mut self, content_id: &str, audio_end_ms: u64) -> RealtimeResult<()> {
        self.send(VoiceCommand::Truncate {
            item_id: content_id.to_string(),
            audio_end_ms,
        })
    }

    async fn close(&mut self) -> RealtimeResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        match self.commands.try_send(VoiceCommand::Close) {
            // The task may already be gone after an upstream close.
            Ok(()) | Err(TrySendError::Closed(_)) => {}
            Err(TrySendError::Full(_)) => {
                warn!("Voice service command queue full, dropping the connection");
                self.task.abort();
            }
        }
        Ok(())
    }
}
