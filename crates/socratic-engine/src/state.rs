//! Questioning state types for a single teaching session.
//!
//! This module defines the engine's state machine states, the transition
//! table, and the per-session state the engine mutates on every event.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use socratic_report::{ConceptInput, SummaryInput};

use crate::config::DifficultyLevel;
use crate::error::{Result, SocraticError};
use crate::ledger::ConceptLedger;
use crate::question::Question;

// ============================================================================
// EngineState
// ============================================================================

/// Current state of a session's questioning state machine.
///
/// The main cycle is:
/// - `Idle` -> `QuestionGenerated` -> `WaitingForAnswer` -> `Evaluating` -> `Feedback` -> `Idle`
/// - From `WaitingForAnswer`:
///   - `Timeout` -> `Hint` -> `WaitingForAnswer` (silence)
///   - `Idle` (skip)
/// - From `Feedback` or `Idle`:
///   - `CheckpointQuiz` -> `WaitingForAnswer`
///
/// There is no terminal state; a session ends when its owner discards it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineState {
    /// Teaching continues; no question is outstanding.
    #[default]
    Idle,
    /// A question was generated and is about to be injected.
    QuestionGenerated,
    /// A question was injected and the student's reply is awaited.
    WaitingForAnswer,
    /// The student's reply is being scored.
    Evaluating,
    /// The student went quiet; a gentle prompt was sent.
    Timeout,
    /// A hint is being delivered.
    Hint,
    /// Feedback on the answer is being delivered.
    Feedback,
    /// A checkpoint quiz over recent concepts is being prepared.
    CheckpointQuiz,
}

impl EngineState {
    /// Returns `true` if a question is outstanding and a student message
    /// should be treated as a reply to it.
    ///
    /// # Examples
    ///
    /// ```
    /// use socratic_engine::EngineState;
    ///
    /// assert!(EngineState::WaitingForAnswer.is_question_pending());
    /// assert!(EngineState::Timeout.is_question_pending());
    /// assert!(!EngineState::Idle.is_question_pending());
    /// ```
    #[must_use]
    pub const fn is_question_pending(&self) -> bool {
        matches!(self, Self::WaitingForAnswer | Self::Timeout)
    }

    /// Returns `true` if the state machine may move from `self` to `to`.
    #[must_use]
    pub const fn can_transition_to(&self, to: Self) -> bool {
        matches!(
            (*self, to),
            (Self::Idle, Self::QuestionGenerated | Self::CheckpointQuiz)
                | (Self::QuestionGenerated, Self::WaitingForAnswer)
                | (
                    Self::WaitingForAnswer,
                    Self::Evaluating | Self::Timeout | Self::Idle
                )
                | (Self::Timeout, Self::Hint | Self::Evaluating | Self::Idle)
                | (Self::Hint, Self::WaitingForAnswer)
                | (Self::Evaluating, Self::Feedback)
                | (Self::Feedback, Self::Idle | Self::CheckpointQuiz)
                | (Self::CheckpointQuiz, Self::WaitingForAnswer | Self::Idle)
        )
    }
}

impl std::fmt::Display for EngineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::QuestionGenerated => "question_generated",
            Self::WaitingForAnswer => "waiting_for_answer",
            Self::Evaluating => "evaluating",
            Self::Timeout => "timeout",
            Self::Hint => "hint",
            Self::Feedback => "feedback",
            Self::CheckpointQuiz => "checkpoint_quiz",
        };
        f.write_str(s)
    }
}

// ============================================================================
// TransitionRecord
// ============================================================================

/// One entry in the session's transition log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRecord {
    /// State before the transition.
    pub from: EngineState,
    /// State after the transition.
    pub to: EngineState,
    /// When the transition happened.
    pub at: DateTime<Utc>,
}

// ============================================================================
// SessionQuestioningState
// ============================================================================

/// Everything the engine knows about one session.
///
/// Only the engine mutates this value. It serializes to JSON for the
/// snapshot endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionQuestioningState {
    /// Session this state belongs to.
    pub session_id: String,

    /// Difficulty hint forwarded to the question and answer services.
    pub difficulty: DifficultyLevel,

    /// Current state machine state.
    pub state: EngineState,

    /// Concepts taught so far.
    pub ledger: ConceptLedger,

    /// Comprehension questions injected since the last checkpoint quiz.
    pub concepts_since_checkpoint: u32,

    /// The single outstanding question, if any.
    pub active_question: Option<Question>,

    /// Display names of concepts taught while a question was outstanding,
    /// oldest first.
    pub pending_concepts: Vec<String>,

    /// Display names of the extra concepts of multi-concept teaching turns.
    /// They are quizzed in the next checkpoint rather than one by one.
    #[serde(default)]
    pub checkpoint_backlog: Vec<String>,

    /// Checkpoint quizzes injected.
    pub checkpoints_fired: u32,

    /// Questions of any kind injected.
    pub questions_asked: u32,

    /// Most recent transitions, oldest first.
    pub history: VecDeque<TransitionRecord>,

    /// Maximum entries kept in `history`.
    #[serde(skip, default)]
    history_limit: usize,

    /// When the session started.
    pub created_at: DateTime<Utc>,

    /// When the state last changed.
    pub updated_at: DateTime<Utc>,
}

impl SessionQuestioningState {
    /// Creates an idle state with an empty ledger.
    #[must_use]
    pub fn new(
        session_id: impl Into<String>,
        difficulty: DifficultyLevel,
        history_limit: usize,
    ) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id.into(),
            difficulty,
            state: EngineState::Idle,
            ledger: ConceptLedger::new(),
            concepts_since_checkpoint: 0,
            active_question: None,
            pending_concepts: Vec::new(),
            checkpoint_backlog: Vec::new(),
            checkpoints_fired: 0,
            questions_asked: 0,
            history: VecDeque::new(),
            history_limit,
            created_at: now,
            updated_at: now,
        }
    }

    /// Moves the state machine to `to`, recording the transition.
    ///
    /// # Errors
    ///
    /// Returns `SocraticError::InvalidStateTransition` if the transition
    /// table does not allow it; the state is left unchanged.
    pub fn transition(&mut self, to: EngineState) -> Result<()> {
        let from = self.state;
        if !from.can_transition_to(to) {
            return Err(SocraticError::invalid_transition(from, to));
        }

        self.state = to;
        self.record_transition(from, to);
        Ok(())
    }

    /// Drops any outstanding question and returns to `Idle` regardless of the
    /// transition table. Only used to recover from bookkeeping defects.
    pub(crate) fn force_idle(&mut self) {
        let from = self.state;
        self.state = EngineState::Idle;
        self.active_question = None;
        if from != EngineState::Idle {
            self.record_transition(from, EngineState::Idle);
        }
    }

    fn record_transition(&mut self, from: EngineState, to: EngineState) {
        if self.history_limit > 0 {
            if self.history.len() == self.history_limit {
                self.history.pop_front();
            }
            self.history.push_back(TransitionRecord {
                from,
                to,
                at: Utc::now(),
            });
        }
        self.touch();
    }

    /// Returns `true` if a question is outstanding.
    #[must_use]
    pub const fn is_question_pending(&self) -> bool {
        self.state.is_question_pending()
    }

    /// Updates the `updated_at` timestamp to the current time.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Queues a concept for later questioning, keeping each concept once.
    pub(crate) fn queue_pending(&mut self, name: &str) {
        let key = crate::ledger::normalize_concept_name(name);
        self.pending_concepts
            .retain(|existing| crate::ledger::normalize_concept_name(existing) != key);
        self.pending_concepts.push(name.trim().to_string());
    }

    /// Holds a concept back for the next checkpoint quiz, keeping each concept once.
    pub(crate) fn fold_into_checkpoint(&mut self, name: &str) {
        let key = crate::ledger::normalize_concept_name(name);
        if !self
            .checkpoint_backlog
            .iter()
            .any(|existing| crate::ledger::normalize_concept_name(existing) == key)
        {
            self.checkpoint_backlog.push(name.trim().to_string());
        }
    }

    /// Drops questioned concepts from both waiting lists.
    pub(crate) fn forget_queued(&mut self, names: &[String]) {
        let covered: Vec<String> = names
            .iter()
            .map(|name| crate::ledger::normalize_concept_name(name))
            .collect();
        let keep = |name: &String| !covered.contains(&crate::ledger::normalize_concept_name(name));
        self.pending_concepts.retain(keep);
        self.checkpoint_backlog.retain(keep);
    }

    /// Builds the input for the end-of-session learning summary.
    #[must_use]
    pub fn summary_input(&self) -> SummaryInput {
        SummaryInput {
            session_id: self.session_id.clone(),
            difficulty: self.difficulty.to_string(),
            started_at: self.created_at,
            ended_at: self.updated_at,
            questions_asked: self.questions_asked,
            checkpoints: self.checkpoints_fired,
            concepts: self
                .ledger
                .iter()
                .map(|record| ConceptInput {
                    name: record.name.clone(),
                    times_taught: record.times_taught,
                    questioned: record.questioned,
                    understood: record.understood,
                    score: record.score,
                    attempts: record.verification_attempts,
                    skipped: record.skipped,
                    verified: record.verified,
                    weak: record.weak,
                })
                .collect(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
