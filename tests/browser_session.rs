//! Browser WebSocket sessions against a live router and a mocked Coral API.

use std::net::SocketAddr;
use std::time::Duration;

use coral_relay::config::{CoralConfig, CoralSource};
use coral_relay::server::{router, AppState};
use futures_util::{SinkExt, StreamExt};
use httpmock::Method::POST;
use httpmock::MockServer;
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

type Browser = WebSocketStream<MaybeTlsStream<TcpStream>>;

const TEST_TIMEOUT: Duration = Duration::from_secs(10);

fn coral_config(server: &MockServer) -> CoralConfig {
    let mut config = CoralConfig::new("127.0.0.1", server.port(), "app", "priv");
    config.max_reconnect_attempts = Some(0);
    config.reconnect_delay_ms = Some(10);
    config
}

async fn spawn_relay(config: CoralConfig) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = router(AppState::new(CoralSource::Fixed(config)));
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

async fn open_browser(addr: SocketAddr) -> Browser {
    let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws"))
        .await
        .expect("relay should accept the browser socket");
    ws
}

async fn send(browser: &mut Browser, frame: Value) {
    browser
        .send(Message::Text(frame.to_string()))
        .await
        .expect("frame should be sent");
}

/// Next browser event with the given name, skipping any others.
async fn expect_event(browser: &mut Browser, name: &str) -> Value {
    tokio::time::timeout(TEST_TIMEOUT, async {
        loop {
            let frame = browser
                .next()
                .await
                .expect("relay closed the socket")
                .expect("socket error");
            if let Message::Text(text) = frame {
                let value: Value = serde_json::from_str(&text).expect("relay sends JSON");
                if value["event"] == name {
                    return value["data"].clone();
                }
            }
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {name}"))
}

#[tokio::test]
async fn create_session_announces_the_remote_session_id() {
    let server = MockServer::start();
    let sessions = server.mock(|when, then| {
        when.method(POST)
            .path("/api/v1/sessions")
            .json_body_partial(r#"{"applicationId":"app","privacyKey":"priv"}"#);
        then.status(200)
            .header("content-type", "application/json")
            .body(r#"{"sessionId":"s-42"}"#);
    });

    let addr = spawn_relay(coral_config(&server)).await;
    let mut browser = open_browser(addr).await;
    send(&mut browser, json!({"event": "create-session"})).await;

    let created = expect_event(&mut browser, "session-created").await;
    assert_eq!(created, json!({"sessionId": "s-42"}));

    // The mock only speaks HTTP, so the session socket never opens.
    let status = expect_event(&mut browser, "connection-status").await;
    assert_eq!(status["connected"], false);

    sessions.assert_hits(1);
}

#[tokio::test]
async fn failed_session_creation_is_reported_to_the_browser() {
    let server = MockServer::start();
    let sessions = server.mock(|when, then| {
        when.method(POST).path("/api/v1/sessions");
        then.status(500).body("boom");
    });

    let addr = spawn_relay(coral_config(&server)).await;
    let mut browser = open_browser(addr).await;
    send(&mut browser, json!({"event": "create-session"})).await;

    let error = expect_event(&mut browser, "error").await;
    assert_eq!(
        error,
        json!({"message": "Failed to create session", "error": "HTTP 500: boom"})
    );
    sessions.assert_hits(1);
}

#[tokio::test]
async fn commands_before_a_session_are_rejected() {
    let server = MockServer::start();
    let addr = spawn_relay(coral_config(&server)).await;
    let mut browser = open_browser(addr).await;

    send(
        &mut browser,
        json!({"event": "send-message", "data": {"threadId": "t1", "content": "hi"}}),
    )
    .await;
    let error = expect_event(&mut browser, "error").await;
    assert_eq!(error, json!({"message": "No active session"}));

    send(
        &mut browser,
        json!({"event": "user-response", "data": {"requestId": "q1", "response": "yes"}}),
    )
    .await;
    let error = expect_event(&mut browser, "error").await;
    assert_eq!(error, json!({"message": "No active session"}));
}

#[tokio::test]
async fn malformed_frames_get_an_error_and_keep_the_connection() {
    let server = MockServer::start();
    let addr = spawn_relay(coral_config(&server)).await;
    let mut browser = open_browser(addr).await;

    browser
        .send(Message::Text("{not json".to_string()))
        .await
        .unwrap();
    let error = expect_event(&mut browser, "error").await;
    let message = error["message"].as_str().unwrap();
    assert!(message.starts_with("Invalid message: "), "{message}");

    send(&mut browser, json!({"event": "list-questions"})).await;
    let error = expect_event(&mut browser, "error").await;
    assert_eq!(error, json!({"message": "No active session"}));

    send(&mut browser, json!({"event": "list-questions", "data": {}})).await;
    let error = expect_event(&mut browser, "error").await;
    assert_eq!(error, json!({"message": "No active session"}));
}
