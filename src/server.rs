use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::{header, Method};
use axum::response::{Html, IntoResponse};
use axum::{routing, Json, Router};
use coral::{CoralClient, CoralError, UpdateReceiver, WsClient, WsUpdate};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use thiserror::Error;
use tokio::sync::mpsc;
use tower_http::cors::{Any, CorsLayer};
use uuid::Uuid;

use crate::browser::{ClientCommand, ServerEvent};
use crate::config::{ConfigError, CoralSource};
use crate::relay::RelaySession;

const INDEX_HTML: &str = include_str!("../assets/index.html");
const APP_JS: &str = include_str!("../assets/app.js");

#[derive(Clone)]
pub struct AppState {
    coral: CoralSource,
    connections: Arc<AtomicUsize>,
}

impl AppState {
    pub fn new(coral: CoralSource) -> Self {
        Self {
            coral,
            connections: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn active_connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Error)]
pub enum SessionStartError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Coral(#[from] CoralError),
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    Router::new()
        .route("/", routing::get(index))
        .route("/index.html", routing::get(index))
        .route("/app.js", routing::get(app_js))
        .route("/health", routing::get(health))
        .route("/ws", routing::get(browser_ws))
        .layer(cors)
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Endpoints
// ---------------------------------------------------------------------------

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn app_js() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "application/javascript; charset=utf-8")],
        APP_JS,
    )
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "coral-relay",
        "version": env!("CARGO_PKG_VERSION"),
        "connections": state.active_connections(),
    }))
}

async fn browser_ws(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_browser_socket(socket, state))
}

// ---------------------------------------------------------------------------
// Browser connection
// ---------------------------------------------------------------------------

/// Owns one browser connection and, once created, its Coral session.
pub async fn handle_browser_socket(socket: WebSocket, state: AppState) {
    let connection_id = Uuid::new_v4();
    state.connections.fetch_add(1, Ordering::SeqCst);
    tracing::info!(connection = %connection_id, "browser connected");

    let (mut sink, mut stream) = socket.split();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<ServerEvent>();
    let writer = tokio::spawn(async move {
        while let Some(event) = out_rx.recv().await {
            let text = match event.to_json() {
                Ok(text) => text,
                Err(error) => {
                    tracing::error!(%error, "failed to encode browser event");
                    continue;
                }
            };
            if sink.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    let mut relay: Option<RelaySession> = None;
    let mut updates: Option<UpdateReceiver> = None;

    loop {
        tokio::select! {
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    handle_browser_text(text.as_str(), &state, &mut relay, &mut updates, &out_tx)
                        .await;
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(error)) => {
                    tracing::warn!(connection = %connection_id, %error, "browser socket error");
                    break;
                }
            },
            update = next_update(&mut updates) => match update {
                Some(update) => {
                    if let Some(relay) = relay.as_mut() {
                        relay.handle_update(update);
                    }
                }
                None => {
                    tracing::debug!(connection = %connection_id, "session socket task ended");
                    updates = None;
                }
            },
        }
    }

    if let Some(mut relay) = relay.take() {
        relay.close();
    }
    drop(out_tx);
    let _ = writer.await;

    state.connections.fetch_sub(1, Ordering::SeqCst);
    tracing::info!(connection = %connection_id, "browser disconnected");
}

async fn next_update(updates: &mut Option<UpdateReceiver>) -> Option<WsUpdate> {
    match updates {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn handle_browser_text(
    text: &str,
    state: &AppState,
    relay: &mut Option<RelaySession>,
    updates: &mut Option<UpdateReceiver>,
    out_tx: &mpsc::UnboundedSender<ServerEvent>,
) {
    let command = match ClientCommand::parse(text) {
        Ok(command) => command,
        Err(error) => {
            tracing::debug!(%error, "invalid browser frame");
            let _ = out_tx.send(ServerEvent::error(format!("Invalid message: {error}")));
            return;
        }
    };
    tracing::debug!(command = command.name(), "browser command");

    match command {
        ClientCommand::CreateSession => match start_session(state, out_tx).await {
            Ok((session, receiver)) => {
                if let Some(mut previous) = relay.take() {
                    previous.close();
                }
                let session_id = session.session_id().to_string();
                *relay = Some(session);
                *updates = Some(receiver);
                let _ = out_tx.send(ServerEvent::SessionCreated { session_id });
            }
            Err(error) => {
                tracing::error!(%error, "failed to create session");
                let _ = out_tx.send(ServerEvent::error_with_detail(
                    "Failed to create session",
                    error.to_string(),
                ));
            }
        },
        command => match relay.as_mut() {
            Some(session) => session.handle_command(command),
            None => {
                let _ = out_tx.send(ServerEvent::error("No active session"));
            }
        },
    }
}

/// Provision a session over HTTP, then open its debug socket.
pub async fn start_session(
    state: &AppState,
    out_tx: &mpsc::UnboundedSender<ServerEvent>,
) -> Result<(RelaySession, UpdateReceiver), SessionStartError> {
    let coral = state.coral.resolve()?;
    let client = CoralClient::new(coral.client_options())?;
    let session_id = client.create_session().await?;
    tracing::info!(%session_id, "session created");

    let mut socket = WsClient::new(coral.ws_options(&session_id))?;
    let receiver = socket.connect();
    Ok((RelaySession::new(session_id, socket, out_tx.clone()), receiver))
}
