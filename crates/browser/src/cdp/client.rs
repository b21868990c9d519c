//! CDP Client - The Core Communication Layer
//!
//! Design decisions:
//! 1. Single WebSocket per browser connection (no per-session WS overhead)
//! 2. Request/response matching via ID, events fanned out on a broadcast channel
//! 3. Every command is bounded by a timeout
//! 4. Socket loss flips the connection state and fires disconnect observers once
//! 5. Fail fast - no retries, no queuing. Let the caller decide.

use dashmap::DashMap;
use futures_util::{stream::SplitSink, SinkExt, StreamExt};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, oneshot, RwLock};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use super::protocol::*;

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

/// Upper bound for a single command round-trip.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Error, Debug)]
pub enum CDPError {
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CDP protocol error: {code} - {message}")]
    Protocol { code: i32, message: String },

    #[error("Request timeout: {0}")]
    Timeout(String),

    #[error("Connection closed")]
    Closed,

    #[error("Invalid response for request {0}")]
    InvalidResponse(RequestId),
}

/// Result type for CDP operations
pub type Result<T> = std::result::Result<T, CDPError>;

/// Disconnect observer, invoked once when the socket goes away
pub type DisconnectCallback = Box<dyn FnOnce() + Send>;

/// CDP Client - manages single WebSocket connection to browser
pub struct CDPClient {
    /// Monotonic request ID counter
    next_id: AtomicU64,

    /// Pending requests waiting for responses
    /// Key: request_id, Value: oneshot sender for response
    pending: Arc<DashMap<RequestId, oneshot::Sender<CDPResponse>>>,

    /// Every event, for waiters that need to correlate several methods
    events: broadcast::Sender<CDPEvent>,

    /// WebSocket write half (wrapped for concurrent sending)
    ws_sink: Arc<RwLock<WsSink>>,

    connected: AtomicBool,
    disconnect_observers: Mutex<Vec<DisconnectCallback>>,
    command_timeout: Duration,
}

impl CDPClient {
    /// Connect to Chrome DevTools Protocol endpoint
    pub async fn connect(ws_url: &str) -> Result<Arc<Self>> {
        let (ws_stream, _) = connect_async(ws_url).await?;
        let (sink, mut stream) = ws_stream.split();
        let (events, _) = broadcast::channel(1024);

        let client = Arc::new(Self {
            next_id: AtomicU64::new(1),
            pending: Arc::new(DashMap::new()),
            events,
            ws_sink: Arc::new(RwLock::new(sink)),
            connected: AtomicBool::new(true),
            disconnect_observers: Mutex::new(Vec::new()),
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
        });

        // Receiver task holds only a weak reference so dropping the client
        // does not keep the socket alive.
        let weak = Arc::downgrade(&client);
        tokio::spawn(async move {
            while let Some(msg) = stream.next().await {
                let Some(client) = weak.upgrade() else {
                    return;
                };
                match msg {
                    Ok(Message::Text(text)) => {
                        if let Err(e) = client.handle_message(&text) {
                            tracing::error!("[CDPClient] Failed to handle message: {}", e);
                        }
                    }
                    Ok(Message::Close(_)) => {
                        tracing::info!("[CDPClient] WebSocket closed");
                        break;
                    }
                    Err(e) => {
                        tracing::error!("[CDPClient] WebSocket error: {}", e);
                        break;
                    }
                    _ => {}
                }
            }

            if let Some(client) = weak.upgrade() {
                client.mark_disconnected();
            }
        });

        Ok(client)
    }

    /// Send CDP request and wait for response
    pub async fn send_request(
        &self,
        method: impl Into<String>,
        params: Option<Value>,
        session_id: Option<SessionId>,
    ) -> Result<Value> {
        if !self.is_connected() {
            return Err(CDPError::Closed);
        }

        let method = method.into();
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let request = CDPRequest {
            id,
            method: method.clone(),
            params,
            session_id,
        };

        let (tx, rx) = oneshot::channel();
        self.pending.insert(id, tx);

        // Serialize and send
        let json = serde_json::to_string(&request)?;
        let sent = {
            let mut sink = self.ws_sink.write().await;
            sink.send(Message::Text(json)).await
        };
        if let Err(e) = sent {
            self.pending.remove(&id);
            return Err(CDPError::WebSocket(e));
        }

        // Wait for response
        let response = match tokio::time::timeout(self.command_timeout, rx).await {
            Ok(Ok(response)) => response,
            Ok(Err(_)) => return Err(CDPError::Closed),
            Err(_) => {
                self.pending.remove(&id);
                return Err(CDPError::Timeout(method));
            }
        };

        if response.id != id {
            return Err(CDPError::InvalidResponse(response.id));
        }

        if let Some(error) = response.error {
            return Err(CDPError::Protocol {
                code: error.code,
                message: error.message,
            });
        }

        Ok(response.result.unwrap_or(Value::Null))
    }

    /// Receive every event from now on
    pub fn events(&self) -> broadcast::Receiver<CDPEvent> {
        self.events.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Register an observer fired once when the connection is lost.
    /// Fires immediately when already disconnected.
    pub fn on_disconnect(&self, callback: DisconnectCallback) {
        if !self.is_connected() {
            callback();
            return;
        }
        if let Ok(mut observers) = self.disconnect_observers.lock() {
            observers.push(callback);
        }
    }

    fn mark_disconnected(&self) {
        if !self.connected.swap(false, Ordering::SeqCst) {
            return;
        }

        // Dropping the senders fails every in-flight request with Closed
        self.pending.clear();

        let observers = match self.disconnect_observers.lock() {
            Ok(mut observers) => std::mem::take(&mut *observers),
            Err(_) => Vec::new(),
        };
        tracing::debug!(
            "[CDPClient] Notifying {} disconnect observers",
            observers.len()
        );
        for observer in observers {
            observer();
        }
    }

    /// Handle incoming WebSocket message
    fn handle_message(&self, text: &str) -> Result<()> {
        let msg: CDPMessage = serde_json::from_str(text)?;

        match msg {
            CDPMessage::Response(response) => {
                if let Some((_, tx)) = self.pending.remove(&response.id) {
                    let _ = tx.send(response); // Ignore send errors (receiver dropped)
                } else {
                    tracing::warn!(
                        "[CDPClient] Received response for unknown request: {}",
                        response.id
                    );
                }
            }
            CDPMessage::Event(event) => {
                let _ = self.events.send(event); // No receivers is fine
            }
        }

        Ok(())
    }

    /// Close connection gracefully
    pub async fn close(&self) -> Result<()> {
        let result = {
            let mut sink = self.ws_sink.write().await;
            sink.close().await
        };
        self.mark_disconnected();
        result.map_err(CDPError::from)
    }
}
