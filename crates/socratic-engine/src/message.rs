//! Outbound messages delivered to the student-facing channel.

use serde::{Deserialize, Serialize};

use crate::question::Question;

/// What an outbound message is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutboundKind {
    /// A newly injected question.
    Question,
    /// Result of answer processing.
    Feedback,
    /// Nudge about a pending question.
    Reminder,
    /// Hint for a pending question.
    Hint,
    /// Confirms a skipped question.
    Acknowledgement,
}

/// Follow-up the teaching layer should act on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TeachingDirective {
    /// Explain the concept again before moving on.
    Reexplain {
        /// Concept to re-explain.
        concept: String,
    },
    /// Automatic probing stopped; record the concept as a weak area.
    WeakArea {
        /// Concept that is now a weak area.
        concept: String,
    },
}

/// A message for the student-facing channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundMessage {
    /// What the message is for.
    pub kind: OutboundKind,

    /// Text shown to the student.
    pub text: String,

    /// The question this message belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question_id: Option<String>,

    /// Concepts the message is about.
    #[serde(default)]
    pub concept_refs: Vec<String>,

    /// Seconds the student has before the first nudge (questions only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,

    /// Evaluated score (feedback only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,

    /// Follow-up for the teaching layer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directive: Option<TeachingDirective>,
}

impl OutboundMessage {
    fn about(kind: OutboundKind, text: impl Into<String>, question: &Question) -> Self {
        Self {
            kind,
            text: text.into(),
            question_id: Some(question.id.clone()),
            concept_refs: question.concept_refs.clone(),
            timeout_seconds: None,
            score: None,
            directive: None,
        }
    }

    /// Creates the `question` message announcing `question`.
    #[must_use]
    pub fn question(question: &Question, timeout_seconds: u64) -> Self {
        Self {
            timeout_seconds: Some(timeout_seconds),
            ..Self::about(OutboundKind::Question, question.text.clone(), question)
        }
    }

    /// Creates a `feedback` message for an answer to `question`.
    #[must_use]
    pub fn feedback(question: &Question, text: impl Into<String>, score: Option<f64>) -> Self {
        Self {
            score,
            ..Self::about(OutboundKind::Feedback, text, question)
        }
    }

    /// Creates a `reminder` message about the pending `question`.
    #[must_use]
    pub fn reminder(question: &Question, text: impl Into<String>) -> Self {
        Self::about(OutboundKind::Reminder, text, question)
    }

    /// Creates a `hint` message for the pending `question`.
    #[must_use]
    pub fn hint(question: &Question, text: impl Into<String>) -> Self {
        Self::about(OutboundKind::Hint, text, question)
    }

    /// Creates an `acknowledgement` message for a skipped `question`.
    #[must_use]
    pub fn acknowledgement(question: &Question, text: impl Into<String>) -> Self {
        Self::about(OutboundKind::Acknowledgement, text, question)
    }

    /// Attaches a follow-up for the teaching layer.
    #[must_use]
    pub fn with_directive(mut self, directive: Option<TeachingDirective>) -> Self {
        self.directive = directive;
        self
    }
}
