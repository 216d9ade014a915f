//! Registry of running sessions.
//!
//! [`SessionStore`] is the entry point the teaching layer talks to. It maps
//! session ids to [`SessionHandle`]s and forwards each event to the owning
//! session actor, so events for different sessions run independently while
//! events for the same session stay ordered.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use socratic_report::LearningSummary;
use tokio::sync::{broadcast, RwLock};
use tracing::{info, warn};

use crate::config::DifficultyLevel;
use crate::declaration::{parse_concept_declaration, ConceptDeclaration};
use crate::engine::SocraticEngine;
use crate::error::{Result, SocraticError};
use crate::message::OutboundMessage;
use crate::session::{SessionHandle, StudentReply};
use crate::state::SessionQuestioningState;
use crate::websocket::{EventBroadcaster, SessionEvent};

/// Options for [`SessionStore::create_session`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionOptions {
    /// Session id to use; a random one is generated if absent.
    #[serde(default)]
    pub session_id: Option<String>,
    /// Difficulty for this session; the configured default if absent.
    #[serde(default)]
    pub difficulty: Option<DifficultyLevel>,
}

/// Thread-safe registry of session actors.
#[derive(Debug, Clone)]
pub struct SessionStore {
    engine: Arc<SocraticEngine>,
    sessions: Arc<RwLock<HashMap<String, SessionHandle>>>,
}

impl SessionStore {
    /// Creates an empty store backed by `engine`.
    #[must_use]
    pub fn new(engine: SocraticEngine) -> Self {
        Self {
            engine: Arc::new(engine),
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Returns the shared engine.
    #[must_use]
    pub fn engine(&self) -> &SocraticEngine {
        &self.engine
    }

    /// Starts a new session actor and returns its id.
    pub async fn create_session(&self, options: SessionOptions) -> Result<String> {
        let config = self.engine.config();
        let session_id = match options.session_id {
            Some(id) if id.trim().is_empty() => {
                return Err(SocraticError::config_validation(
                    "session id must not be blank",
                    "Omit sessionId to have one generated",
                ));
            }
            Some(id) => id,
            None => uuid::Uuid::new_v4().to_string(),
        };
        let difficulty = options.difficulty.unwrap_or(config.difficulty);

        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(&session_id) {
            return Err(SocraticError::session_exists(session_id));
        }

        let state = SessionQuestioningState::new(&session_id, difficulty, config.history_limit);
        let handle = SessionHandle::spawn(
            Arc::clone(&self.engine),
            state,
            config.server.inbox_capacity,
            EventBroadcaster::new(config.server.event_buffer),
        );
        sessions.insert(session_id.clone(), handle);

        info!(session_id = %session_id, difficulty = %difficulty, "Session created");
        Ok(session_id)
    }

    /// Returns the handle for a running session.
    pub async fn get(&self, session_id: &str) -> Result<SessionHandle> {
        self.sessions
            .read()
            .await
            .get(session_id)
            .cloned()
            .ok_or_else(|| SocraticError::session_not_found(session_id))
    }

    /// Records that one concept was taught. Returns once the event is queued.
    pub async fn on_concept_taught(&self, session_id: &str, concept_name: &str) -> Result<()> {
        self.on_concepts_taught(session_id, vec![concept_name.to_string()])
            .await
    }

    /// Records one teaching turn covering `names`. Returns once the event is queued.
    pub async fn on_concepts_taught(&self, session_id: &str, names: Vec<String>) -> Result<()> {
        self.get(session_id).await?.concepts_taught(names).await
    }

    /// Parses a concept declaration out of teaching text and records it as one turn.
    ///
    /// Returns `Ok(None)` and records nothing when the text declares no concepts.
    pub async fn on_teaching_text(
        &self,
        session_id: &str,
        text: &str,
    ) -> Result<Option<ConceptDeclaration>> {
        let handle = self.get(session_id).await?;
        let Some(declaration) = parse_concept_declaration(text) else {
            return Ok(None);
        };
        handle
            .concepts_taught_and_wait(declaration.concepts.clone())
            .await?;
        Ok(Some(declaration))
    }

    /// Delivers a student message and returns the engine's reply, if any.
    pub async fn on_student_message(
        &self,
        session_id: &str,
        text: &str,
    ) -> Result<Option<OutboundMessage>> {
        let reply = self.student_message(session_id, text).await?;
        Ok(reply.messages.into_iter().next())
    }

    /// Delivers a student message and returns the full reply.
    pub async fn student_message(&self, session_id: &str, text: &str) -> Result<StudentReply> {
        self.get(session_id).await?.student_message(text).await
    }

    /// Returns the current state of a session.
    pub async fn snapshot(&self, session_id: &str) -> Result<SessionQuestioningState> {
        self.get(session_id).await?.snapshot().await
    }

    /// Builds the learning summary for a running session.
    pub async fn summary(&self, session_id: &str) -> Result<LearningSummary> {
        let state = self.snapshot(session_id).await?;
        Ok(LearningSummary::from_input(&state.summary_input()))
    }

    /// Stops a session and returns its final state.
    pub async fn end_session(&self, session_id: &str) -> Result<SessionQuestioningState> {
        let handle = self
            .sessions
            .write()
            .await
            .remove(session_id)
            .ok_or_else(|| SocraticError::session_not_found(session_id))?;

        match handle.end().await {
            Ok(state) => {
                info!(
                    session_id = %session_id,
                    concepts = state.ledger.len(),
                    weak_areas = ?state.ledger.weak_areas(),
                    "Session ended"
                );
                Ok(state)
            }
            Err(e) => {
                warn!(session_id = %session_id, error = %e, "Session actor was already gone");
                Err(e)
            }
        }
    }

    /// Subscribes to a session's event stream.
    pub async fn subscribe(&self, session_id: &str) -> Result<broadcast::Receiver<SessionEvent>> {
        Ok(self.get(session_id).await?.subscribe())
    }

    /// Returns the ids of all running sessions, sorted.
    pub async fn session_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.sessions.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Returns the number of running sessions.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Returns `true` if no sessions are running.
    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}
