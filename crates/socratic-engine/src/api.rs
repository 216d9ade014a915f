//! HTTP API for the Socratic questioning engine.
//!
//! The teaching layer drives sessions through these endpoints and follows
//! their output over the WebSocket stream.
//!
//! # Endpoints
//!
//! - `POST /api/sessions` - Create a session
//! - `GET /api/sessions/:id` - Session state snapshot
//! - `DELETE /api/sessions/:id` - End a session
//! - `GET /api/sessions/:id/summary` - Learning summary
//! - `POST /api/sessions/:id/concepts` - Report concepts taught
//! - `POST /api/sessions/:id/teaching` - Report teaching text with a concept declaration
//! - `POST /api/sessions/:id/messages` - Deliver a student message
//! - `GET /api/sessions/:id/ws` - WebSocket event stream
//! - `GET /api/health` - Liveness
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use socratic_engine::{
//!     create_router, AppState, Config, RemoteAnswerEvaluator, RemoteQuestionGenerator,
//!     SessionStore, SocraticEngine,
//! };
//!
//! # async fn example() -> socratic_engine::Result<()> {
//! let config = Config::default();
//! let generator = RemoteQuestionGenerator::new(&config.collaborators.generator_url, config.call_timeout())?;
//! let evaluator = RemoteAnswerEvaluator::new(&config.collaborators.evaluator_url, config.call_timeout())?;
//! let engine = SocraticEngine::new(config.clone(), Arc::new(generator), Arc::new(evaluator));
//!
//! let router = create_router(AppState::new(config, SessionStore::new(engine)));
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:3000").await?;
//! axum::serve(listener, router).await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use socratic_report::LearningSummary;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};

use crate::declaration::ConceptDeclaration;
use crate::message::OutboundMessage;
use crate::state::SessionQuestioningState;
use crate::store::{SessionOptions, SessionStore};
use crate::websocket::ws_handler;
use crate::{Config, SocraticError};

// ============================================================================
// Request/Response Types
// ============================================================================

/// Response body for session creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionResponse {
    /// Id of the new session.
    pub session_id: String,
}

/// Request body for the concepts endpoint.
///
/// Accepts either `{"concept": "x"}` or `{"concepts": ["x", "y"]}`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConceptsTaughtRequest {
    /// A single concept name.
    #[serde(default)]
    pub concept: Option<String>,
    /// Concepts introduced in one teaching turn.
    #[serde(default)]
    pub concepts: Vec<String>,
}

impl ConceptsTaughtRequest {
    fn into_names(self) -> Vec<String> {
        let mut names = self.concepts;
        if let Some(concept) = self.concept {
            names.push(concept);
        }
        names
    }
}

/// Response body for the concepts endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConceptsTaughtResponse {
    /// Whether the event was queued.
    pub accepted: bool,
}

/// Request body for the teaching endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct TeachingTextRequest {
    /// The teaching layer's response text.
    pub text: String,
}

/// Response body for the teaching endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeachingTextResponse {
    /// The declaration found in the text, if any.
    pub declaration: Option<ConceptDeclaration>,
}

/// Request body for the messages endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct StudentMessageRequest {
    /// What the student wrote.
    pub text: String,
}

/// Response body for the messages endpoint.
///
/// When `consumed` is `false` the teaching layer answers the message itself.
/// A `reminder` in `message` then only restates the pending question, which
/// stays open until the student answers or skips it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudentMessageResponse {
    /// The engine handled the message; the teaching layer should not respond to it.
    pub consumed: bool,
    /// The engine's first reply, if it produced one.
    pub message: Option<OutboundMessage>,
    /// Every reply in delivery order, such as feedback followed by the next
    /// queued question or a checkpoint quiz.
    #[serde(default)]
    pub messages: Vec<OutboundMessage>,
}

/// Response body for the health endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Always `"ok"`.
    pub status: String,
    /// Number of running sessions.
    pub sessions: usize,
}

/// Error response body returned on failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Description of the error.
    pub error: String,
}

// ============================================================================
// Application State
// ============================================================================

/// Shared application state for the HTTP server.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Config,
    /// Running sessions.
    pub store: SessionStore,
}

impl AppState {
    /// Creates a new `AppState`.
    #[must_use]
    pub const fn new(config: Config, store: SessionStore) -> Self {
        Self { config, store }
    }
}

// ============================================================================
// API Error Type
// ============================================================================

/// Error returned by API handlers.
#[derive(Debug)]
pub struct ApiError(SocraticError);

impl From<SocraticError> for ApiError {
    fn from(err: SocraticError) -> Self {
        Self(err)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            SocraticError::SessionNotFound { .. } => StatusCode::NOT_FOUND,
            SocraticError::SessionAlreadyExists { .. } => StatusCode::CONFLICT,
            SocraticError::SessionClosed { .. } => StatusCode::GONE,
            SocraticError::InvalidConceptName { .. }
            | SocraticError::ConfigValidationError { .. } => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            warn!(error = %self.0, "Request failed");
        }

        let body = Json(ErrorResponse {
            error: self.0.to_string(),
        });
        (status, body).into_response()
    }
}

// ============================================================================
// Router Setup
// ============================================================================

/// Creates the HTTP router with all API endpoints.
///
/// The router serves everything under `/api` with permissive CORS and
/// request tracing.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/health", get(handle_health))
        .route("/sessions", post(handle_create_session))
        .route(
            "/sessions/:id",
            get(handle_snapshot).delete(handle_end_session),
        )
        .route("/sessions/:id/summary", get(handle_summary))
        .route("/sessions/:id/concepts", post(handle_concepts_taught))
        .route("/sessions/:id/teaching", post(handle_teaching_text))
        .route("/sessions/:id/messages", post(handle_student_message))
        .route("/sessions/:id/ws", get(ws_handler));

    Router::new()
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(Arc::new(state))
}

// ============================================================================
// Handlers
// ============================================================================

async fn handle_health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        sessions: state.store.len().await,
    })
}

/// Handler for `POST /api/sessions`. The body is optional.
async fn handle_create_session(
    State(state): State<Arc<AppState>>,
    options: Option<Json<SessionOptions>>,
) -> Result<(StatusCode, Json<CreateSessionResponse>), ApiError> {
    let options = options.map(|Json(o)| o).unwrap_or_default();
    let session_id = state.store.create_session(options).await?;
    Ok((StatusCode::CREATED, Json(CreateSessionResponse { session_id })))
}

async fn handle_snapshot(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionQuestioningState>, ApiError> {
    Ok(Json(state.store.snapshot(&session_id).await?))
}

/// Handler for `DELETE /api/sessions/:id`. Returns the final state.
async fn handle_end_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionQuestioningState>, ApiError> {
    Ok(Json(state.store.end_session(&session_id).await?))
}

async fn handle_summary(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<Json<LearningSummary>, ApiError> {
    Ok(Json(state.store.summary(&session_id).await?))
}

/// Handler for `POST /api/sessions/:id/concepts`.
///
/// Fire-and-continue: answers 202 as soon as the event is queued.
async fn handle_concepts_taught(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    Json(request): Json<ConceptsTaughtRequest>,
) -> Result<(StatusCode, Json<ConceptsTaughtResponse>), ApiError> {
    let names = request.into_names();
    if names.iter().all(|name| name.trim().is_empty()) {
        return Err(SocraticError::invalid_concept_name(names.join(",")).into());
    }

    info!(session_id = %session_id, concepts = ?names, "Concepts taught");
    state.store.on_concepts_taught(&session_id, names).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(ConceptsTaughtResponse { accepted: true }),
    ))
}

async fn handle_teaching_text(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    Json(request): Json<TeachingTextRequest>,
) -> Result<Json<TeachingTextResponse>, ApiError> {
    let declaration = state
        .store
        .on_teaching_text(&session_id, &request.text)
        .await?;
    Ok(Json(TeachingTextResponse { declaration }))
}

async fn handle_student_message(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    Json(request): Json<StudentMessageRequest>,
) -> Result<Json<StudentMessageResponse>, ApiError> {
    let reply = state
        .store
        .student_message(&session_id, &request.text)
        .await?;

    Ok(Json(StudentMessageResponse {
        consumed: reply.consumed,
        message: reply.messages.first().cloned(),
        messages: reply.messages,
    }))
}

// ============================================================================
// Tests
// ============================================================================
