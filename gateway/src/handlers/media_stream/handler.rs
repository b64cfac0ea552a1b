//! Media stream WebSocket handler
//!
//! One upgraded socket is one phone call. The handler is the Caller Channel
//! adapter: it decodes caller frames into [`CallerEvent`]s, starts the voice
//! service connection, and runs a [`Relay`] that owns the call until either
//! side closes.

use std::net::IpAddr;
use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    Extension,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use tokio::select;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::core::realtime::OpenAIRealtime;
use crate::core::relay::{
    CallerEvent, CallerSink, Relay, RelayError, RelayEvent, RelayOutcome, RelayResult,
};
use crate::middleware::ClientIp;
use crate::state::AppState;

use super::messages::{MediaStreamOutgoing, parse_caller_message};

/// Optimized channel buffer size for audio workloads
const CHANNEL_BUFFER_SIZE: usize = 1024;

/// Maximum WebSocket frame size (1 MB). Telephony frames are a few hundred bytes.
const MAX_WS_FRAME_SIZE: usize = 1024 * 1024;

/// Maximum WebSocket message size (1 MB)
const MAX_WS_MESSAGE_SIZE: usize = 1024 * 1024;

/// Commands for the socket writer task
#[derive(Debug)]
enum CallerCommand {
    Send(MediaStreamOutgoing),
    Close,
}

/// Relay-side handle to the caller socket writer.
pub struct CallerHandle {
    commands: mpsc::Sender<CallerCommand>,
    closed: bool,
}

impl CallerHandle {
    fn new(commands: mpsc::Sender<CallerCommand>) -> Self {
        Self {
            commands,
            closed: false,
        }
    }

    async fn send(&self, message: MediaStreamOutgoing) -> RelayResult<()> {
        if self.closed {
            return Err(RelayError::CallerChannel("caller channel closed".to_string()));
        }
        self.commands
            .send(CallerCommand::Send(message))
            .await
            .map_err(|_| RelayError::CallerChannel("caller socket writer stopped".to_string()))
    }
}

#[async_trait]
impl CallerSink for CallerHandle {
    async fn send_media(&mut self, stream_id: &str, payload: String) -> RelayResult<()> {
        self.send(MediaStreamOutgoing::media(stream_id, payload)).await
    }

    async fn send_mark(&mut self, stream_id: &str, name: &str) -> RelayResult<()> {
        self.send(MediaStreamOutgoing::mark(stream_id, name)).await
    }

    async fn clear(&mut self, stream_id: &str) -> RelayResult<()> {
        self.send(MediaStreamOutgoing::clear(stream_id)).await
    }

    async fn close(&mut self) -> RelayResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let _ = self.commands.send(CallerCommand::Close).await;
        Ok(())
    }
}

/// Releases the connection slot taken by the limit middleware, even when the
/// upgrade never completes.
struct ConnectionSlot {
    state: Arc<AppState>,
    ip: Option<IpAddr>,
}

impl Drop for ConnectionSlot {
    fn drop(&mut self) {
        if let Some(ip) = self.ip {
            self.state.release_connection(ip);
        }
    }
}

/// Media stream WebSocket handler
///
/// Upgrades the HTTP connection and runs one call session on it.
pub async fn media_stream_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    client_ip: Option<Extension<ClientIp>>,
) -> Response {
    let slot = ConnectionSlot {
        state: state.clone(),
        ip: client_ip.map(|Extension(ClientIp(ip))| ip),
    };
    info!(client_ip = ?slot.ip, "Media stream upgrade requested");

    ws.max_frame_size(MAX_WS_FRAME_SIZE)
        .max_message_size(MAX_WS_MESSAGE_SIZE)
        .on_upgrade(move |socket| async move {
            handle_media_stream(socket, state).await;
            drop(slot);
        })
}

/// Run one call session on an upgraded socket.
async fn handle_media_stream(socket: WebSocket, state: Arc<AppState>) {
    let call_id = Uuid::new_v4().to_string();
    info!(call_id = %call_id, "Call session started");

    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (command_tx, mut command_rx) = mpsc::channel::<CallerCommand>(CHANNEL_BUFFER_SIZE);

    let writer_call_id = call_id.clone();
    let sender_task = tokio::spawn(async move {
        while let Some(command) = command_rx.recv().await {
            let result = match command {
                CallerCommand::Send(message) => match serde_json::to_string(&message) {
                    Ok(json) => ws_sender.send(Message::Text(json.into())).await,
                    Err(e) => {
                        error!(call_id = %writer_call_id, "Failed to serialize caller message: {}", e);
                        continue;
                    }
                },
                CallerCommand::Close => {
                    debug!(call_id = %writer_call_id, "Closing caller socket");
                    let _ = ws_sender.send(Message::Close(None)).await;
                    break;
                }
            };

            if let Err(e) = result {
                warn!(call_id = %writer_call_id, "Failed to write to caller socket: {}", e);
                break;
            }
        }
    });

    let (event_tx, event_rx) = mpsc::channel::<RelayEvent>(CHANNEL_BUFFER_SIZE);

    let voice = match OpenAIRealtime::new(state.config.voice_service_config(), call_id.as_str()) {
        Ok(client) => client.spawn(event_tx.clone()),
        Err(e) => {
            error!(call_id = %call_id, "Cannot start voice service channel: {}", e);
            let _ = command_tx.send(CallerCommand::Close).await;
            drop(command_tx);
            let _ = sender_task.await;
            return;
        }
    };

    let caller = CallerHandle::new(command_tx);
    let relay = Relay::new(call_id.clone(), state.config.relay_config(), voice, caller);
    let mut relay_task = tokio::spawn(relay.run(event_rx));

    let finished = loop {
        select! {
            result = &mut relay_task => break Some(result),
            msg = ws_receiver.next() => {
                let event = match msg {
                    Some(Ok(Message::Text(text))) => match parse_caller_message(&text) {
                        Ok(Some(event)) => event,
                        Ok(None) => continue,
                        Err(e) => {
                            warn!(call_id = %call_id, "Dropping malformed caller message: {}", e);
                            continue;
                        }
                    },
                    Some(Ok(Message::Binary(data))) => {
                        debug!(call_id = %call_id, "Ignoring binary frame: {} bytes", data.len());
                        continue;
                    }
                    Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
                    Some(Ok(Message::Close(_))) | None => {
                        debug!(call_id = %call_id, "Caller socket closed");
                        CallerEvent::StreamClosed
                    }
                    Some(Err(e)) => {
                        warn!(call_id = %call_id, "Caller socket error: {}", e);
                        CallerEvent::StreamClosed
                    }
                };

                // Delivery must not outlive the relay, or a finished call keeps the socket open.
                let closing = event == CallerEvent::StreamClosed;
                select! {
                    result = &mut relay_task => break Some(result),
                    sent = event_tx.send(event.into()) => {
                        if sent.is_err() || closing {
                            break None;
                        }
                    }
                }
            }
        }
    };

    // Our sender is the last one besides the voice task's
    drop(event_tx);
    let result = match finished {
        Some(result) => result,
        None => relay_task.await,
    };

    match result {
        Ok(Ok(outcome)) => match outcome {
            RelayOutcome::VoiceFailed(reason) | RelayOutcome::CallerFailed(reason) => {
                warn!(call_id = %call_id, "Call session ended with failure: {}", reason);
            }
            outcome => info!(call_id = %call_id, outcome = ?outcome, "Call session ended"),
        },
        Ok(Err(e)) => error!(call_id = %call_id, "Call session terminated: {}", e),
        Err(e) => error!(call_id = %call_id, "Relay task failed: {}", e),
    }

    let _ = sender_task.await;
    info!(call_id = %call_id, "Media stream connection terminated");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_caller_handle_close_is_idempotent() {
        let (tx, mut rx) = mpsc::channel(8);
        let mut handle = CallerHandle::new(tx);

        handle.clear("MZ1").await.unwrap();
        handle.close().await.unwrap();
        handle.close().await.unwrap();

        assert!(matches!(
            rx.recv().await,
            Some(CallerCommand::Send(MediaStreamOutgoing::Clear { .. }))
        ));
        assert!(matches!(rx.recv().await, Some(CallerCommand::Close)));
        drop(handle);
        assert!(rx.recv().await.is_none());

        let (tx, _rx) = mpsc::channel(8);
        let mut handle = CallerHandle::new(tx);
        handle.close().await.unwrap();
        assert!(matches!(
            handle.send_media("MZ1", "AAEC".to_string()).await,
            Err(RelayError::CallerChannel(_))
        ));
    }

    #[tokio::test]
    async fn test_caller_handle_reports_stopped_writer() {
        let (tx, rx) = mpsc::channel(8);
        drop(rx);
        let mut handle = CallerHandle::new(tx);
        assert!(matches!(
            handle.send_mark("MZ1", "frame-1").await,
            Err(RelayError::CallerChannel(_))
        ));
    }
}
