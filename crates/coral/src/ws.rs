//! WebSocket client for a Coral session's debug socket.
//!
//! One [`WsClient`] owns one background task. The task dials the session
//! socket, decodes inbound frames into [`CoralEvent`]s and pushes them, in
//! transport order, onto a single update channel together with lifecycle
//! notifications. When the transport closes it reconnects after a fixed
//! delay until the attempt ceiling is reached, then ends silently.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::Duration;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{CoralError, Result};
use crate::types::{CoralEvent, MessageRole, OutboundFrame};

const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;
const DEFAULT_RECONNECT_DELAY_MS: u64 = 5_000;
const DEFAULT_TIMEOUT_MS: u64 = 10_000;

/// Options for creating a WebSocket client.
#[derive(Debug, Clone)]
pub struct WsClientOptions {
    /// Base URL of the Coral server; `http(s)://` is rewritten to `ws(s)://`.
    pub base_url: String,
    pub application_id: String,
    pub privacy_key: String,
    pub session_id: String,
    /// Maximum reconnect attempts before giving up (default: 5).
    pub max_reconnect_attempts: Option<u32>,
    /// Fixed delay before each reconnect attempt in milliseconds (default: 5000).
    pub reconnect_delay_ms: Option<u64>,
    /// Value of the `timeout` query parameter (default: 10000).
    pub timeout_ms: Option<u64>,
}

impl WsClientOptions {
    pub fn new(
        base_url: impl Into<String>,
        application_id: impl Into<String>,
        privacy_key: impl Into<String>,
        session_id: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            application_id: application_id.into(),
            privacy_key: privacy_key.into(),
            session_id: session_id.into(),
            max_reconnect_attempts: None,
            reconnect_delay_ms: None,
            timeout_ms: None,
        }
    }

    /// Set max reconnect attempts.
    pub fn with_max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.max_reconnect_attempts = Some(attempts);
        self
    }

    /// Set the reconnect delay in milliseconds.
    pub fn with_reconnect_delay_ms(mut self, delay_ms: u64) -> Self {
        self.reconnect_delay_ms = Some(delay_ms);
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }
}

/// Build `ws://host:port/ws/v1/debug/{app}/{key}/{session}/?timeout={ms}`.
pub fn session_ws_url(
    base_url: &str,
    application_id: &str,
    privacy_key: &str,
    session_id: &str,
    timeout_ms: u64,
) -> Result<Url> {
    let base = base_url
        .trim_end_matches('/')
        .replace("https://", "wss://")
        .replace("http://", "ws://");
    let mut url = Url::parse(&format!("{base}/ws/v1/debug/"))?;
    url.path_segments_mut()
        .map_err(|_| CoralError::InvalidResponse(format!("cannot-be-a-base url: {base}")))?
        .pop_if_empty()
        .extend([application_id, privacy_key, session_id, ""]);
    url.query_pairs_mut()
        .append_pair("timeout", &timeout_ms.to_string());
    Ok(url)
}

/// Fixed-delay reconnection with a hard attempt ceiling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    max_attempts: u32,
    delay: Duration,
    attempts: u32,
}

impl ReconnectPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
            attempts: 0,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// A connection opened; the counter starts over.
    pub fn on_open(&mut self) {
        self.attempts = 0;
    }

    /// The transport closed. Returns the delay before the next attempt, or
    /// `None` once the ceiling has been reached. The counter never moves
    /// past the ceiling.
    pub fn on_close(&mut self) -> Option<Duration> {
        if self.attempts >= self.max_attempts {
            return None;
        }
        self.attempts += 1;
        Some(self.delay)
    }
}

/// Lifecycle events emitted by the WebSocket client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WsLifecycleEvent {
    Open,
    Close,
    Error(String),
    Reconnecting { attempt: u32 },
    /// The ceiling was reached; the task is about to end.
    GaveUp { attempts: u32 },
}

/// Everything the socket task reports, in the order it happened.
#[derive(Debug, Clone, PartialEq)]
pub enum WsUpdate {
    Lifecycle(WsLifecycleEvent),
    Event(CoralEvent),
}

/// A handle for receiving socket updates.
pub type UpdateReceiver = mpsc::UnboundedReceiver<WsUpdate>;

enum WsCommand {
    Send(String),
    Disconnect,
}

type SessionStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

enum SocketEnd {
    /// The transport went away; the policy decides what happens next.
    Closed,
    /// Disconnect was requested or nobody is listening any more.
    Stopped,
}

/// WebSocket client for one Coral session.
pub struct WsClient {
    url: Url,
    max_reconnect_attempts: u32,
    reconnect_delay: Duration,
    command_tx: Option<mpsc::UnboundedSender<WsCommand>>,
    is_connected: Arc<AtomicBool>,
    reconnect_attempts: Arc<AtomicU32>,
}

impl WsClient {
    /// Create a new WebSocket client with the given options.
    pub fn new(options: WsClientOptions) -> Result<Self> {
        let url = session_ws_url(
            &options.base_url,
            &options.application_id,
            &options.privacy_key,
            &options.session_id,
            options.timeout_ms.unwrap_or(DEFAULT_TIMEOUT_MS),
        )?;

        Ok(Self {
            url,
            max_reconnect_attempts: options
                .max_reconnect_attempts
                .unwrap_or(DEFAULT_MAX_RECONNECT_ATTEMPTS),
            reconnect_delay: Duration::from_millis(
                options
                    .reconnect_delay_ms
                    .unwrap_or(DEFAULT_RECONNECT_DELAY_MS),
            ),
            command_tx: None,
            is_connected: Arc::new(AtomicBool::new(false)),
            reconnect_attempts: Arc::new(AtomicU32::new(0)),
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Check if the socket is currently open.
    pub fn is_connected(&self) -> bool {
        self.is_connected.load(Ordering::SeqCst)
    }

    /// Reconnect attempts made since the last successful open.
    pub fn reconnect_attempts(&self) -> u32 {
        self.reconnect_attempts.load(Ordering::SeqCst)
    }

    /// Start the socket task and return the channel its updates arrive on.
    ///
    /// Calling this again replaces the previous task. Must be called from
    /// within a tokio runtime.
    pub fn connect(&mut self) -> UpdateReceiver {
        self.disconnect();

        let (update_tx, update_rx) = mpsc::unbounded_channel();
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        self.command_tx = Some(command_tx);
        // Fresh flags so a previous task winding down cannot flip them.
        self.is_connected = Arc::new(AtomicBool::new(false));
        self.reconnect_attempts = Arc::new(AtomicU32::new(0));

        let policy = ReconnectPolicy::new(self.max_reconnect_attempts, self.reconnect_delay);
        tokio::spawn(run_socket(
            self.url.clone(),
            policy,
            update_tx,
            command_rx,
            self.is_connected.clone(),
            self.reconnect_attempts.clone(),
        ));

        update_rx
    }

    /// Close the socket and stop reconnecting.
    pub fn disconnect(&mut self) {
        if let Some(tx) = self.command_tx.take() {
            let _ = tx.send(WsCommand::Disconnect);
        }
        self.is_connected.store(false, Ordering::SeqCst);
    }

    /// Serialize and queue one frame for the socket task. Fails with
    /// [`CoralError::NotConnected`] when the socket is not open.
    ///
    /// `Ok` means queued, not written: a frame queued just before the
    /// transport closes is dropped by the socket task with a warning.
    pub fn send(&self, frame: &OutboundFrame) -> Result<()> {
        let tx = match (&self.command_tx, self.is_connected()) {
            (Some(tx), true) => tx,
            _ => {
                warn!(kind = frame.kind(), "WebSocket not connected, frame not sent");
                return Err(CoralError::NotConnected);
            }
        };
        let text = serde_json::to_string(frame)?;
        tx.send(WsCommand::Send(text))
            .map_err(|_| CoralError::NotConnected)?;
        debug!(kind = frame.kind(), "queued outbound frame");
        Ok(())
    }

    pub fn create_thread(&self, name: impl Into<String>, participants: Vec<String>) -> Result<()> {
        self.send(&OutboundFrame::CreateThread {
            name: name.into(),
            participants,
        })
    }

    pub fn send_message(
        &self,
        thread_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Result<()> {
        self.send(&OutboundFrame::SendMessage {
            thread_id: thread_id.into(),
            content: content.into(),
            role: MessageRole::User,
        })
    }

    pub fn send_user_response(
        &self,
        request_id: impl Into<String>,
        response: impl Into<String>,
    ) -> Result<()> {
        self.send(&OutboundFrame::UserResponse {
            request_id: request_id.into(),
            response: response.into(),
        })
    }

    pub fn send_tool_response(&self, request_id: impl Into<String>, result: Value) -> Result<()> {
        self.send(&OutboundFrame::ToolResponse {
            request_id: request_id.into(),
            result,
        })
    }

    /// Send a message to the session's agents without addressing a thread.
    pub fn send_direct_message(&self, content: impl Into<String>) -> Result<()> {
        self.send(&OutboundFrame::UserMessage {
            content: content.into(),
            role: MessageRole::User,
        })
    }
}

impl Drop for WsClient {
    fn drop(&mut self) {
        self.disconnect();
    }
}

async fn run_socket(
    url: Url,
    mut policy: ReconnectPolicy,
    updates: mpsc::UnboundedSender<WsUpdate>,
    mut command_rx: mpsc::UnboundedReceiver<WsCommand>,
    is_connected: Arc<AtomicBool>,
    reconnect_attempts: Arc<AtomicU32>,
) {
    let emit = |event: WsLifecycleEvent| updates.send(WsUpdate::Lifecycle(event)).is_ok();
    let endpoint = url.host_str().unwrap_or_default().to_string();

    'outer: loop {
        let connect = connect_async(url.as_str());
        tokio::pin!(connect);
        let attempt = loop {
            tokio::select! {
                result = &mut connect => break Some(result),
                cmd = command_rx.recv() => match cmd {
                    Some(WsCommand::Send(text)) => {
                        warn!(bytes = text.len(), "dropping frame queued before the socket closed");
                    }
                    Some(WsCommand::Disconnect) | None => break None,
                },
            }
        };
        let Some(attempt) = attempt else {
            break 'outer;
        };

        let end = match attempt {
            Ok((stream, _)) => {
                policy.on_open();
                reconnect_attempts.store(0, Ordering::SeqCst);
                is_connected.store(true, Ordering::SeqCst);
                info!(endpoint = %endpoint, "session socket connected");
                if !emit(WsLifecycleEvent::Open) {
                    break 'outer;
                }
                let end = pump(stream, &updates, &mut command_rx).await;
                is_connected.store(false, Ordering::SeqCst);
                end
            }
            Err(err) => {
                warn!(endpoint = %endpoint, error = %err, "session socket connect failed");
                if !emit(WsLifecycleEvent::Error(err.to_string())) {
                    break 'outer;
                }
                SocketEnd::Closed
            }
        };

        if matches!(end, SocketEnd::Stopped) {
            break 'outer;
        }

        info!(endpoint = %endpoint, "session socket closed");
        if !emit(WsLifecycleEvent::Close) {
            break 'outer;
        }

        let Some(delay) = policy.on_close() else {
            info!(
                attempts = policy.attempts(),
                "reconnect ceiling reached, giving up on session socket"
            );
            let _ = emit(WsLifecycleEvent::GaveUp {
                attempts: policy.attempts(),
            });
            break 'outer;
        };
        reconnect_attempts.store(policy.attempts(), Ordering::SeqCst);
        info!(
            attempt = policy.attempts(),
            max = policy.max_attempts(),
            "attempting reconnection"
        );
        if !emit(WsLifecycleEvent::Reconnecting {
            attempt: policy.attempts(),
        }) {
            break 'outer;
        }

        let reconnect_sleep = tokio::time::sleep(delay);
        tokio::pin!(reconnect_sleep);
        loop {
            tokio::select! {
                _ = &mut reconnect_sleep => break,
                cmd = command_rx.recv() => match cmd {
                    Some(WsCommand::Send(text)) => {
                        warn!(bytes = text.len(), "dropping frame queued before the socket closed");
                    }
                    Some(WsCommand::Disconnect) | None => break 'outer,
                },
            }
        }
    }

    is_connected.store(false, Ordering::SeqCst);
}

async fn pump(
    stream: SessionStream,
    updates: &mpsc::UnboundedSender<WsUpdate>,
    command_rx: &mut mpsc::UnboundedReceiver<WsCommand>,
) -> SocketEnd {
    let (mut write, mut read) = stream.split();

    loop {
        tokio::select! {
            frame = read.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    if let Some(event) = decode_frame(&text) {
                        if updates.send(WsUpdate::Event(event)).is_err() {
                            let _ = write.send(Message::Close(None)).await;
                            return SocketEnd::Stopped;
                        }
                    }
                }
                Some(Ok(Message::Close(_))) | None => return SocketEnd::Closed,
                Some(Err(err)) => {
                    warn!(error = %err, "session socket read error");
                    let _ = updates.send(WsUpdate::Lifecycle(WsLifecycleEvent::Error(err.to_string())));
                    return SocketEnd::Closed;
                }
                _ => {}
            },
            cmd = command_rx.recv() => match cmd {
                Some(WsCommand::Send(text)) => {
                    if let Err(err) = write.send(Message::Text(text)).await {
                        warn!(error = %err, "session socket write error");
                        let _ = updates.send(WsUpdate::Lifecycle(WsLifecycleEvent::Error(err.to_string())));
                        return SocketEnd::Closed;
                    }
                }
                Some(WsCommand::Disconnect) | None => {
                    let _ = write.send(Message::Close(None)).await;
                    return SocketEnd::Stopped;
                }
            },
        }
    }
}

/// Decode one text frame. Non-JSON frames, frames that do not fit their
/// tag, and unknown tags are logged and dropped.
pub fn decode_frame(text: &str) -> Option<CoralEvent> {
    let value: Value = match serde_json::from_str(text) {
        Ok(value) => value,
        Err(err) => {
            let raw: String = text.chars().take(200).collect();
            warn!(error = %err, raw = %raw, "ignoring non-json frame");
            return None;
        }
    };
    let tag = value
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    match serde_json::from_value::<CoralEvent>(value) {
        Ok(CoralEvent::Unknown) => {
            debug!(message_type = %tag, "unknown message type");
            None
        }
        Ok(event) => Some(event),
        Err(err) => {
            warn!(message_type = %tag, error = %err, "dropping malformed frame");
            None
        }
    }
}
