//! Per-session actor.
//!
//! Each session runs as one tokio task that owns the session's
//! [`SessionQuestioningState`] and its timer. Events arrive on an ordered
//! `mpsc` inbox and are handed to the shared [`SocraticEngine`] one at a time,
//! so no two events for the same session are ever processed concurrently.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, info};

use crate::engine::{SocraticEngine, Step, TimerDirective, TimerPhase};
use crate::error::{Result, SocraticError};
use crate::message::OutboundMessage;
use crate::state::SessionQuestioningState;
use crate::websocket::{EventBroadcaster, SessionEvent};

/// The engine's answer to a student message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StudentReply {
    /// The message was handled by the engine and should not reach normal teaching.
    pub consumed: bool,
    /// Messages the engine emitted in response, in delivery order.
    pub messages: Vec<OutboundMessage>,
}

impl StudentReply {
    /// Returns the first message the engine emitted, if any.
    #[must_use]
    pub fn message(&self) -> Option<&OutboundMessage> {
        self.messages.first()
    }
}

/// Commands accepted by a session actor.
#[derive(Debug)]
enum SessionCommand {
    ConceptsTaught {
        names: Vec<String>,
        done: Option<oneshot::Sender<()>>,
    },
    StudentMessage {
        text: String,
        reply: oneshot::Sender<StudentReply>,
    },
    Snapshot {
        reply: oneshot::Sender<SessionQuestioningState>,
    },
    End {
        reply: oneshot::Sender<SessionQuestioningState>,
    },
}

/// Cheap, cloneable handle to a running session actor.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    session_id: String,
    sender: mpsc::Sender<SessionCommand>,
    broadcaster: EventBroadcaster,
}

impl SessionHandle {
    /// Spawns the actor for `state` and returns its handle.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn spawn(
        engine: Arc<SocraticEngine>,
        state: SessionQuestioningState,
        inbox_capacity: usize,
        broadcaster: EventBroadcaster,
    ) -> Self {
        let (sender, inbox) = mpsc::channel(inbox_capacity.max(1));
        let session_id = state.session_id.clone();

        let actor = SessionActor {
            engine,
            state,
            inbox,
            broadcaster: broadcaster.clone(),
            timer: None,
        };
        tokio::spawn(actor.run());

        Self {
            session_id,
            sender,
            broadcaster,
        }
    }

    /// Returns the session id.
    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Enqueues a teaching turn without waiting for it to be processed.
    pub async fn concepts_taught(&self, names: Vec<String>) -> Result<()> {
        self.send(SessionCommand::ConceptsTaught { names, done: None })
            .await
    }

    /// Enqueues a teaching turn and waits until the engine has processed it.
    pub async fn concepts_taught_and_wait(&self, names: Vec<String>) -> Result<()> {
        let (done, rx) = oneshot::channel();
        self.send(SessionCommand::ConceptsTaught {
            names,
            done: Some(done),
        })
        .await?;
        rx.await.map_err(|_| self.closed())
    }

    /// Delivers a student message and waits for the engine's reply.
    pub async fn student_message(&self, text: impl Into<String>) -> Result<StudentReply> {
        let (reply, rx) = oneshot::channel();
        self.send(SessionCommand::StudentMessage {
            text: text.into(),
            reply,
        })
        .await?;
        rx.await.map_err(|_| self.closed())
    }

    /// Returns a copy of the session state after all queued events.
    pub async fn snapshot(&self) -> Result<SessionQuestioningState> {
        let (reply, rx) = oneshot::channel();
        self.send(SessionCommand::Snapshot { reply }).await?;
        rx.await.map_err(|_| self.closed())
    }

    /// Stops the actor after all queued events and returns the final state.
    pub async fn end(&self) -> Result<SessionQuestioningState> {
        let (reply, rx) = oneshot::channel();
        self.send(SessionCommand::End { reply }).await?;
        rx.await.map_err(|_| self.closed())
    }

    /// Subscribes to the session's event stream.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.broadcaster.subscribe()
    }

    /// Returns `true` once the actor has stopped.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    async fn send(&self, command: SessionCommand) -> Result<()> {
        self.sender.send(command).await.map_err(|_| self.closed())
    }

    fn closed(&self) -> SocraticError {
        SocraticError::session_closed(&self.session_id)
    }
}

/// An armed answer or hint timer.
#[derive(Debug)]
struct ArmedTimer {
    deadline: Instant,
    question_id: String,
    phase: TimerPhase,
}

struct SessionActor {
    engine: Arc<SocraticEngine>,
    state: SessionQuestioningState,
    inbox: mpsc::Receiver<SessionCommand>,
    broadcaster: EventBroadcaster,
    timer: Option<ArmedTimer>,
}

impl SessionActor {
    async fn run(mut self) {
        info!(session_id = %self.state.session_id, "Session started");

        loop {
            let deadline = self.timer.as_ref().map(|timer| timer.deadline);

            tokio::select! {
                command = self.inbox.recv() => {
                    match command {
                        Some(SessionCommand::End { reply }) => {
                            self.timer = None;
                            self.broadcaster.send(SessionEvent::session_ended(&self.state));
                            let _ = reply.send(self.state.clone());
                            break;
                        }
                        Some(command) => self.handle(command).await,
                        None => break,
                    }
                }
                () = sleep_until(deadline) => {
                    if let Some(timer) = self.timer.take() {
                        debug!(
                            session_id = %self.state.session_id,
                            question_id = %timer.question_id,
                            phase = %timer.phase,
                            "Timer elapsed"
                        );
                        let step = self.engine.timer_elapsed(&mut self.state, timer.phase, &timer.question_id);
                        self.apply(step);
                    }
                }
            }
        }

        info!(
            session_id = %self.state.session_id,
            concepts = self.state.ledger.len(),
            questions = self.state.questions_asked,
            "Session ended"
        );
    }

    async fn handle(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::ConceptsTaught { names, done } => {
                self.broadcaster
                    .send(SessionEvent::concepts_taught(names.clone()));
                let step = self.engine.concepts_taught(&mut self.state, &names).await;
                self.apply(step);
                if let Some(done) = done {
                    let _ = done.send(());
                }
            }
            SessionCommand::StudentMessage { text, reply } => {
                let step = self.engine.student_message(&mut self.state, &text).await;
                let student_reply = self.apply(step);
                let _ = reply.send(student_reply);
            }
            SessionCommand::Snapshot { reply } => {
                let _ = reply.send(self.state.clone());
            }
            // Handled by the run loop
            SessionCommand::End { reply } => {
                let _ = reply.send(self.state.clone());
            }
        }
    }

    /// Applies the step's timer directive and broadcasts its messages once each.
    fn apply(&mut self, step: Step) -> StudentReply {
        match step.timer {
            TimerDirective::Unchanged => {}
            TimerDirective::Clear => self.timer = None,
            TimerDirective::Arm(timer) => {
                self.timer = Some(ArmedTimer {
                    deadline: Instant::now() + timer.after,
                    question_id: timer.question_id,
                    phase: timer.phase,
                });
            }
        }

        for message in &step.messages {
            self.broadcaster.send(SessionEvent::message(message.clone()));
        }

        StudentReply {
            consumed: step.consumed,
            messages: step.messages,
        }
    }
}

/// Sleeps until `deadline`, or forever if there is none.
async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending::<()>().await,
    }
}
