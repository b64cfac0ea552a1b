//! WebSocket Mock Server for the Realtime voice service
//!
//! Accepts a single connection, records every JSON event the client sends and
//! pushes whatever the test scripts back to the client.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};

/// How long a test waits for any single expected event
pub const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

/// Request details captured during the WebSocket handshake
#[derive(Debug, Clone, Default)]
pub struct HandshakeInfo {
    pub uri: String,
    pub authorization: Option<String>,
    pub openai_beta: Option<String>,
}

/// Scripted server behaviour
#[derive(Debug)]
pub enum MockAction {
    Send(Value),
    SendRaw(String),
    /// Keep the socket open but stop draining it
    StopReading,
    Close,
}

pub struct MockRealtimeServer {
    pub addr: SocketAddr,
    received: mpsc::UnboundedReceiver<Value>,
    actions: mpsc::UnboundedSender<MockAction>,
    handshake: Arc<Mutex<Option<HandshakeInfo>>>,
}

impl MockRealtimeServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (received_tx, received) = mpsc::unbounded_channel();
        let (actions, mut action_rx) = mpsc::unbounded_channel();
        let handshake = Arc::new(Mutex::new(None));

        let captured = handshake.clone();
        tokio::spawn(async move {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            let callback = move |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
                let header = |name: &str| {
                    request
                        .headers()
                        .get(name)
                        .and_then(|v| v.to_str().ok())
                        .map(str::to_string)
                };
                *captured.lock().unwrap() = Some(HandshakeInfo {
                    uri: request.uri().to_string(),
                    authorization: header("authorization"),
                    openai_beta: header("openai-beta"),
                });
                Ok(response)
            };
            let Ok(ws_stream) = accept_hdr_async(stream, callback).await else {
                return;
            };
            let (mut write, mut read) = ws_stream.split();
            let mut reading = true;

            loop {
                tokio::select! {
                    msg = read.next(), if reading => match msg {
                        Some(Ok(Message::Text(text))) => {
                            if let Ok(value) = serde_json::from_str::<Value>(&text) {
                                let _ = received_tx.send(value);
                            }
                        }
                        Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                        Some(Ok(_)) => {}
                    },
                    action = action_rx.recv() => match action {
                        Some(MockAction::Send(value)) => {
                            if write.send(Message::Text(value.to_string().into())).await.is_err() {
                                break;
                            }
                        }
                        Some(MockAction::SendRaw(text)) => {
                            if write.send(Message::Text(text.into())).await.is_err() {
                                break;
                            }
                        }
                        Some(MockAction::StopReading) => reading = false,
                        Some(MockAction::Close) | None => {
                            let _ = write.send(Message::Close(None)).await;
                            break;
                        }
                    }
                }
            }
            // Dropping received_tx tells the test the connection is gone
        });

        Self {
            addr,
            received,
            actions,
            handshake,
        }
    }

    /// Base URL to configure as the voice service endpoint
    pub fn url(&self) -> String {
        format!("ws://{}/v1/realtime", self.addr)
    }

    pub fn send(&self, event: Value) {
        self.actions.send(MockAction::Send(event)).unwrap();
    }

    pub fn send_raw(&self, text: &str) {
        self.actions.send(MockAction::SendRaw(text.to_string())).unwrap();
    }

    pub fn stop_reading(&self) {
        self.actions.send(MockAction::StopReading).unwrap();
    }

    pub fn close(&self) {
        self.actions.send(MockAction::Close).unwrap();
    }

    pub fn handshake(&self) -> Option<HandshakeInfo> {
        self.handshake.lock().unwrap().clone()
    }

    /// Next event sent by the client. Panics on timeout or disconnect.
    pub async fn next_event(&mut self) -> Value {
        tokio::time::timeout(EVENT_TIMEOUT, self.received.recv())
            .await
            .expect("timed out waiting for client event")
            .expect("client disconnected")
    }

    /// Next event of the given type, skipping anything else.
    pub async fn next_event_of(&mut self, event_type: &str) -> Value {
        loop {
            let event = self.next_event().await;
            if event["type"] == event_type {
                return event;
            }
        }
    }

    /// Wait until the client connection has gone away.
    pub async fn wait_closed(&mut self) {
        tokio::time::timeout(EVENT_TIMEOUT, async {
            while self.received.recv().await.is_some() {}
        })
        .await
        .expect("client connection still open");
    }
}

/// A TCP listener that accepts connections but never completes a WebSocket
/// handshake. Used to exercise connect timeouts.
pub async fn start_silent_listener() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((stream, _)) = listener.accept().await {
            held.push(stream);
        }
    });
    addr
}
