//! Integration tests for the HTTP API and the per-session WebSocket stream.
//!
//! A real server is started on a free port; the teaching layer is simulated
//! with `reqwest` and observers connect with `tokio-tungstenite`.

use std::net::TcpListener;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::SinkExt;
use futures::StreamExt;
use socratic_engine::{
    create_router, AnswerEvaluator, AppState, Config, EngineState, Evaluation, EvaluationRequest,
    GeneratedQuestion, OutboundKind, QuestionGenerator, QuestionRequest, Result, SessionEvent,
    SessionStore, SocraticEngine,
};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tungstenite::Message;

struct FixedGenerator;

#[async_trait]
impl QuestionGenerator for FixedGenerator {
    async fn generate_question(&self, request: &QuestionRequest) -> Result<GeneratedQuestion> {
        Ok(GeneratedQuestion::new(format!(
            "Why do we need {}?",
            request.concept_refs.join(" and ")
        )))
    }
}

struct FixedEvaluator;

#[async_trait]
impl AnswerEvaluator for FixedEvaluator {
    async fn evaluate_answer(&self, _request: &EvaluationRequest) -> Result<Evaluation> {
        Ok(Evaluation::new(0.9, "Spot on"))
    }
}

/// Helper to find an available port for testing.
fn find_available_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .expect("Failed to bind to port")
        .local_addr()
        .expect("Failed to get local addr")
        .port()
}

/// Helper type for WebSocket client
type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Running test server.
struct TestServer {
    base_url: String,
    ws_base: String,
    http: reqwest::Client,
    _handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        let config = Config::default();
        let engine = SocraticEngine::new(
            config.clone(),
            Arc::new(FixedGenerator),
            Arc::new(FixedEvaluator),
        );
        let router = create_router(AppState::new(config, SessionStore::new(engine)));

        let port = find_available_port();
        let addr = format!("127.0.0.1:{port}");
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .expect("Failed to bind");

        let handle = tokio::spawn(async move {
            axum::serve(listener, router).await.expect("Server failed");
        });

        // Give the server a moment to start
        tokio::time::sleep(Duration::from_millis(50)).await;

        Self {
            base_url: format!("http://{addr}/api"),
            ws_base: format!("ws://{addr}/api"),
            http: reqwest::Client::new(),
            _handle: handle,
        }
    }

    async fn create_session(&self, id: &str) {
        let response = self
            .http
            .post(format!("{}/sessions", self.base_url))
            .json(&serde_json::json!({ "sessionId": id }))
            .send()
            .await
            .expect("Failed to create session");
        assert_eq!(response.status(), reqwest::StatusCode::CREATED);
    }

    async fn teach(&self, id: &str, concept: &str) {
        let response = self
            .http
            .post(format!("{}/sessions/{id}/concepts", self.base_url))
            .json(&serde_json::json!({ "concept": concept }))
            .send()
            .await
            .expect("Failed to send concept");
        assert_eq!(response.status(), reqwest::StatusCode::ACCEPTED);
    }

    async fn say(&self, id: &str, text: &str) -> serde_json::Value {
        self.http
            .post(format!("{}/sessions/{id}/messages", self.base_url))
            .json(&serde_json::json!({ "text": text }))
            .send()
            .await
            .expect("Failed to send message")
            .json()
            .await
            .expect("Failed to parse reply")
    }

    async fn connect(&self, id: &str) -> WsClient {
        let (ws_stream, _) = connect_async(format!("{}/sessions/{id}/ws", self.ws_base))
            .await
            .expect("Failed to connect to WebSocket");
        ws_stream
    }
}

/// Receives the next session event, answering pings along the way.
async fn receive_event(client: &mut WsClient) -> SessionEvent {
    loop {
        let msg = timeout(Duration::from_secs(5), client.next())
            .await
            .expect("Timeout waiting for message")
            .expect("Stream ended")
            .expect("WebSocket error");

        match msg {
            Message::Text(text) => {
                return serde_json::from_str(&text).expect("Failed to parse event");
            }
            Message::Ping(data) => {
                client
                    .send(Message::Pong(data))
                    .await
                    .expect("Failed to send pong");
            }
            other => panic!("Expected text message, got: {other:?}"),
        }
    }
}

// ============================================================================
// Connection Tests
// ============================================================================

#[tokio::test]
async fn test_client_receives_connected_snapshot() {
    let server = TestServer::spawn().await;
    server.create_session("s1").await;

    let mut client = server.connect("s1").await;
    let event = receive_event(&mut client).await;

    match event {
        SessionEvent::Connected(payload) => {
            assert_eq!(payload.state.session_id, "s1");
            assert_eq!(payload.state.state, EngineState::Idle);
        }
        other => panic!("Expected Connected event, got: {other:?}"),
    }
}

#[tokio::test]
async fn test_unknown_session_rejects_upgrade() {
    let server = TestServer::spawn().await;

    let result = connect_async(format!("{}/sessions/missing/ws", server.ws_base)).await;
    assert!(result.is_err());
}

// ============================================================================
// Event Stream Tests
// ============================================================================

#[tokio::test]
async fn test_question_and_feedback_are_streamed() {
    let server = TestServer::spawn().await;
    server.create_session("s1").await;
    let mut client = server.connect("s1").await;
    assert!(matches!(
        receive_event(&mut client).await,
        SessionEvent::Connected(_)
    ));

    server.teach("s1", "ownership").await;

    match receive_event(&mut client).await {
        SessionEvent::ConceptsTaught(payload) => assert_eq!(payload.concepts, vec!["ownership"]),
        other => panic!("Expected ConceptsTaught event, got: {other:?}"),
    }
    match receive_event(&mut client).await {
        SessionEvent::Message(payload) => {
            assert_eq!(payload.message.kind, OutboundKind::Question);
            assert_eq!(payload.message.text, "Why do we need ownership?");
        }
        other => panic!("Expected Message event, got: {other:?}"),
    }

    let reply = server.say("s1", "to free memory without a garbage collector").await;
    assert_eq!(reply["consumed"], true);
    assert_eq!(reply["message"]["kind"], "feedback");

    match receive_event(&mut client).await {
        SessionEvent::Message(payload) => {
            assert_eq!(payload.message.kind, OutboundKind::Feedback);
            assert_eq!(payload.message.text, "Spot on");
        }
        other => panic!("Expected Message event, got: {other:?}"),
    }
}

#[tokio::test]
async fn test_events_broadcast_to_all_clients() {
    let server = TestServer::spawn().await;
    server.create_session("s1").await;

    let mut first = server.connect("s1").await;
    let mut second = server.connect("s1").await;
    receive_event(&mut first).await;
    receive_event(&mut second).await;

    server.teach("s1", "borrowing").await;

    for client in [&mut first, &mut second] {
        assert!(matches!(
            receive_event(client).await,
            SessionEvent::ConceptsTaught(_)
        ));
    }
}

#[tokio::test]
async fn test_session_end_closes_stream() {
    let server = TestServer::spawn().await;
    server.create_session("s1").await;
    let mut client = server.connect("s1").await;
    receive_event(&mut client).await;

    let response = server
        .http
        .delete(format!("{}/sessions/s1", server.base_url))
        .send()
        .await
        .expect("Failed to end session");
    assert_eq!(response.status(), reqwest::StatusCode::OK);

    match receive_event(&mut client).await {
        SessionEvent::SessionEnded(payload) => assert_eq!(payload.session_id, "s1"),
        other => panic!("Expected SessionEnded event, got: {other:?}"),
    }

    let next = timeout(Duration::from_secs(5), client.next())
        .await
        .expect("Timeout waiting for close");
    assert!(matches!(next, Some(Ok(Message::Close(_))) | None));
}

#[tokio::test]
async fn test_server_continues_after_client_disconnect() {
    let server = TestServer::spawn().await;
    server.create_session("s1").await;

    let mut client = server.connect("s1").await;
    receive_event(&mut client).await;
    client.close(None).await.expect("Failed to close");
    drop(client);

    server.teach("s1", "lifetimes").await;

    let mut fresh = server.connect("s1").await;
    match receive_event(&mut fresh).await {
        SessionEvent::Connected(payload) => {
            assert_eq!(payload.state.state, EngineState::WaitingForAnswer);
        }
        other => panic!("Expected Connected event, got: {other:?}"),
    }
}

// ============================================================================
// HTTP Surface Tests
// ============================================================================

#[tokio::test]
async fn test_summary_over_http() {
    let server = TestServer::spawn().await;
    server.create_session("s1").await;
    server.teach("s1", "enums").await;
    server.say("s1", "a type with a fixed set of variants").await;

    let summary: serde_json::Value = server
        .http
        .get(format!("{}/sessions/s1/summary", server.base_url))
        .send()
        .await
        .expect("Failed to fetch summary")
        .json()
        .await
        .expect("Failed to parse summary");

    assert_eq!(summary["mastered"], serde_json::json!(["enums"]));
    assert_eq!(summary["questions_asked"], 1);
}

#[tokio::test]
async fn test_unknown_session_returns_404() {
    let server = TestServer::spawn().await;

    let response = server
        .http
        .post(format!("{}/sessions/missing/messages", server.base_url))
        .json(&serde_json::json!({ "text": "hello" }))
        .send()
        .await
        .expect("Request failed");

    assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);
}
