//! Question and evaluation types exchanged with the external services.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Why a question was asked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionKind {
    /// First-pass check right after a concept is taught.
    Comprehension,
    /// Application-style probe after the student claims to understand.
    Verification,
    /// Combined question over the last few taught concepts.
    Checkpoint,
}

impl std::fmt::Display for QuestionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Comprehension => write!(f, "comprehension"),
            Self::Verification => write!(f, "verification"),
            Self::Checkpoint => write!(f, "checkpoint"),
        }
    }
}

/// A question instance issued to the student.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    /// Unique id of this question instance.
    pub id: String,

    /// The question as shown to the student.
    pub text: String,

    /// Why the question was asked.
    pub kind: QuestionKind,

    /// Concepts the question covers (2-3 for checkpoints).
    pub concept_refs: Vec<String>,

    /// Hint offered after a stretch of silence, if the generator supplied one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,

    /// When the question was injected.
    pub issued_at: DateTime<Utc>,

    /// When the answer timer first fires.
    pub timeout_at: DateTime<Utc>,
}

impl Question {
    /// Creates a question issued now, timing out after `answer_timeout`.
    #[must_use]
    pub fn new(
        kind: QuestionKind,
        generated: GeneratedQuestion,
        concept_refs: Vec<String>,
        answer_timeout: Duration,
    ) -> Self {
        let issued_at = Utc::now();
        let timeout_at = chrono::Duration::from_std(answer_timeout)
            .map_or(issued_at, |timeout| issued_at + timeout);
        Self {
            id: Uuid::new_v4().to_string(),
            text: generated.text,
            kind,
            concept_refs,
            hint: generated.hint.filter(|hint| !hint.trim().is_empty()),
            issued_at,
            timeout_at,
        }
    }

    /// Returns the concept list formatted for prose ("arrays, loops and functions").
    #[must_use]
    pub fn concept_list(&self) -> String {
        join_concepts(&self.concept_refs)
    }
}

/// Joins concept names for use in a sentence.
pub(crate) fn join_concepts(names: &[String]) -> String {
    match names {
        [] => "this topic".to_string(),
        [only] => only.clone(),
        [init @ .., last] => format!("{} and {last}", init.join(", ")),
    }
}

/// What the question generator returns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedQuestion {
    /// The question text.
    pub text: String,

    /// Optional hint used if the student stays silent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl GeneratedQuestion {
    /// Creates a generated question without a hint.
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            hint: None,
        }
    }

    /// Attaches a hint.
    #[must_use]
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

/// Structured verdict from the answer evaluator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    /// Score in `[0, 1]`.
    pub score: f64,

    /// Feedback text shown to the student.
    pub feedback: String,
}

impl Evaluation {
    /// Creates an evaluation.
    #[must_use]
    pub fn new(score: f64, feedback: impl Into<String>) -> Self {
        Self {
            score,
            feedback: feedback.into(),
        }
    }
}
