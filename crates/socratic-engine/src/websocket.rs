//! WebSocket event types and broadcasting for real-time session observation.
//!
//! Every outbound message the engine produces for a session is broadcast as
//! a [`SessionEvent`] to the clients connected to that session's `/ws`
//! endpoint.
//!
//! # Event Types
//!
//! - `connected` - Sent when a client connects, includes the current snapshot
//! - `concepts_taught` - A teaching turn was reported
//! - `message` - The engine emitted a question, feedback, reminder, hint or acknowledgement
//! - `session_ended` - The session was ended; the stream closes afterwards
//!
//! # Example
//!
//! ```no_run
//! use socratic_engine::websocket::{EventBroadcaster, SessionEvent};
//!
//! # async fn example() {
//! let broadcaster = EventBroadcaster::new(100);
//! let mut receiver = broadcaster.subscribe();
//!
//! broadcaster.send(SessionEvent::concepts_taught(vec!["arrays".to_string()]));
//!
//! if let Ok(event) = receiver.recv().await {
//!     println!("Received: {}", event.event_name());
//! }
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Path, State, WebSocketUpgrade,
    },
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::time::interval;
use tracing::{debug, info, warn};

use crate::api::{ApiError, AppState};
use crate::message::OutboundMessage;
use crate::state::SessionQuestioningState;

// ============================================================================
// Event Payloads
// ============================================================================

/// Payload for the `connected` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectedPayload {
    /// The session snapshot at connection time.
    pub state: SessionQuestioningState,
}

/// Payload for the `concepts_taught` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConceptsTaughtPayload {
    /// Concept names reported in the teaching turn.
    pub concepts: Vec<String>,
    /// When the turn was reported.
    pub timestamp: DateTime<Utc>,
}

/// Payload for the `message` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagePayload {
    /// The outbound message, exactly as delivered to the student channel.
    pub message: OutboundMessage,
}

/// Payload for the `session_ended` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionEndedPayload {
    /// The ended session.
    pub session_id: String,
    /// Distinct concepts taught during the session.
    pub concepts_taught: usize,
    /// Questions injected during the session.
    pub questions_asked: u32,
}

// ============================================================================
// Event Enum
// ============================================================================

/// WebSocket event types for session observation.
///
/// All events are serialized as JSON objects with "event" and "payload" fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload", rename_all = "snake_case")]
pub enum SessionEvent {
    /// Sent when a client connects.
    Connected(ConnectedPayload),
    /// Sent when a teaching turn is reported.
    ConceptsTaught(ConceptsTaughtPayload),
    /// Sent for every outbound message.
    Message(MessagePayload),
    /// Sent when the session ends.
    SessionEnded(SessionEndedPayload),
}

impl SessionEvent {
    /// Creates a `Connected` event with the current snapshot.
    #[must_use]
    pub const fn connected(state: SessionQuestioningState) -> Self {
        Self::Connected(ConnectedPayload { state })
    }

    /// Creates a `ConceptsTaught` event.
    #[must_use]
    pub fn concepts_taught(concepts: Vec<String>) -> Self {
        Self::ConceptsTaught(ConceptsTaughtPayload {
            concepts,
            timestamp: Utc::now(),
        })
    }

    /// Creates a `Message` event.
    #[must_use]
    pub const fn message(message: OutboundMessage) -> Self {
        Self::Message(MessagePayload { message })
    }

    /// Creates a `SessionEnded` event from the final state.
    #[must_use]
    pub fn session_ended(state: &SessionQuestioningState) -> Self {
        Self::SessionEnded(SessionEndedPayload {
            session_id: state.session_id.clone(),
            concepts_taught: state.ledger.len(),
            questions_asked: state.questions_asked,
        })
    }

    /// Returns the event name as a string.
    #[must_use]
    pub const fn event_name(&self) -> &'static str {
        match self {
            Self::Connected(_) => "connected",
            Self::ConceptsTaught(_) => "concepts_taught",
            Self::Message(_) => "message",
            Self::SessionEnded(_) => "session_ended",
        }
    }
}

// ============================================================================
// Event Broadcaster
// ============================================================================

/// Broadcasts one session's events to all of its WebSocket clients.
///
/// Events are not persisted for disconnected clients.
#[derive(Debug, Clone)]
pub struct EventBroadcaster {
    sender: broadcast::Sender<SessionEvent>,
}

impl EventBroadcaster {
    /// Creates a new `EventBroadcaster` with the specified buffer capacity.
    ///
    /// The buffer determines how many events can be queued per subscriber
    /// before old events are dropped.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Creates a new subscriber for receiving events.
    ///
    /// If a subscriber falls behind it receives a `Lagged` error and misses
    /// some events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.sender.subscribe()
    }

    /// Broadcasts an event to all connected subscribers.
    ///
    /// Returns the number of receivers; 0 means nobody is listening.
    pub fn send(&self, event: SessionEvent) -> usize {
        // send() returns Err only if there are no receivers, which is fine
        self.sender.send(event).unwrap_or(0)
    }

    /// Returns the number of active subscribers.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new(100)
    }
}

// ============================================================================
// WebSocket Handler
// ============================================================================

/// Interval between heartbeat pings.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Maximum number of missed pong responses before disconnecting.
const MAX_MISSED_PONGS: u8 = 3;

/// WebSocket upgrade handler for `GET /api/sessions/:id/ws`.
///
/// Responds 404 if the session does not exist.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(session_id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Response {
    info!(session_id = %session_id, "New WebSocket connection request");

    let handle = match state.store.get(&session_id).await {
        Ok(handle) => handle,
        Err(e) => return ApiError::from(e).into_response(),
    };

    // Subscribe before taking the snapshot so no event falls between the two
    let events = handle.subscribe();
    let snapshot = match handle.snapshot().await {
        Ok(snapshot) => snapshot,
        Err(e) => return ApiError::from(e).into_response(),
    };

    ws.on_upgrade(move |socket| handle_socket(socket, snapshot, events))
}

/// Handles a single WebSocket connection.
///
/// - Sends `connected` event with the current snapshot immediately
/// - Forwards all session events to the client
/// - Sends heartbeat pings every 30 seconds
/// - Closes after `session_ended` or 3 missed pongs
async fn handle_socket(
    socket: WebSocket,
    snapshot: SessionQuestioningState,
    mut events: broadcast::Receiver<SessionEvent>,
) {
    let (mut sender, mut receiver) = socket.split();
    let session_id = snapshot.session_id.clone();

    let connected_json = match serde_json::to_string(&SessionEvent::connected(snapshot)) {
        Ok(json) => json,
        Err(e) => {
            warn!(session_id = %session_id, "Failed to serialize connected event: {}", e);
            return;
        }
    };

    if sender.send(Message::Text(connected_json)).await.is_err() {
        debug!("Client disconnected before receiving connected event");
        return;
    }

    info!(session_id = %session_id, "WebSocket client connected, sent snapshot");

    let mut heartbeat_interval = interval(HEARTBEAT_INTERVAL);
    // The first tick completes immediately; skip it so the first ping goes out after one interval
    heartbeat_interval.tick().await;
    let mut missed_pongs = 0u8;

    loop {
        tokio::select! {
            // Handle incoming messages (primarily pong responses)
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Pong(_))) => {
                        missed_pongs = 0;
                        debug!("Received pong from client");
                    }
                    Some(Ok(Message::Close(_))) => {
                        info!(session_id = %session_id, "Client requested close");
                        break;
                    }
                    Some(Ok(Message::Text(_) | Message::Binary(_))) => {
                        // Student messages go through the HTTP API
                        debug!("Ignoring data message from client");
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            debug!("Failed to send pong, client disconnected");
                            break;
                        }
                    }
                    Some(Err(e)) => {
                        debug!("WebSocket error: {}", e);
                        break;
                    }
                    None => {
                        debug!("WebSocket stream ended");
                        break;
                    }
                }
            }

            // Forward session events to client
            event = events.recv() => {
                match event {
                    Ok(session_event) => {
                        let ended = matches!(session_event, SessionEvent::SessionEnded(_));
                        let json = match serde_json::to_string(&session_event) {
                            Ok(j) => j,
                            Err(e) => {
                                warn!("Failed to serialize event: {}", e);
                                continue;
                            }
                        };

                        if sender.send(Message::Text(json)).await.is_err() {
                            debug!("Failed to send event, client disconnected");
                            break;
                        }
                        if ended {
                            let _ = sender.send(Message::Close(None)).await;
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(session_id = %session_id, "Client lagged, missed {} events", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        info!(session_id = %session_id, "Session closed");
                        break;
                    }
                }
            }

            // Send heartbeat ping
            _ = heartbeat_interval.tick() => {
                if sender.send(Message::Ping(vec![])).await.is_err() {
                    debug!("Failed to send ping, client disconnected");
                    break;
                }
                missed_pongs += 1;
                if missed_pongs >= MAX_MISSED_PONGS {
                    info!("Client missed {} pongs, closing connection", MAX_MISSED_PONGS);
                    break;
                }
            }
        }
    }

    info!(session_id = %session_id, "WebSocket client disconnected");
}

// ============================================================================
// Tests
// ============================================================================
