//! Socratic Learning Summaries
//!
//! This crate turns the end-of-session state of a questioning session into a
//! learning summary. Summaries can be serialized to JSON for programmatic access
//! or rendered to Markdown for the student and the teaching layer.
//!
//! # Types
//!
//! - [`SummaryInput`] - Plain snapshot of a session's concept ledger
//! - [`LearningSummary`] - The summary built from a [`SummaryInput`]
//! - [`ConceptSummary`] - One concept with its [`MasteryLevel`]
//! - [`Recommendation`] - A prioritized followup for the teaching layer
//!
//! # Generators
//!
//! - [`json::JsonGenerator`] - Generate JSON summaries with compact or pretty formatting
//! - [`MarkdownGenerator`] - Generate human-readable Markdown summaries
//!
//! # Example
//!
//! ```rust
//! use chrono::Utc;
//! use socratic_report::{ConceptInput, LearningSummary, SummaryInput};
//! use socratic_report::json::JsonGenerator;
//!
//! let input = SummaryInput {
//!     session_id: "session-1".to_string(),
//!     difficulty: "beginner".to_string(),
//!     started_at: Utc::now(),
//!     ended_at: Utc::now(),
//!     questions_asked: 1,
//!     checkpoints: 0,
//!     concepts: vec![ConceptInput {
//!         understood: Some(true),
//!         score: Some(0.9),
//!         questioned: true,
//!         ..ConceptInput::new("variables")
//!     }],
//! };
//!
//! let summary = LearningSummary::from_input(&input);
//! assert_eq!(summary.mastered, vec!["variables"]);
//!
//! let json = JsonGenerator::new(&summary).generate_pretty().unwrap();
//! assert!(json.contains("\"mastered\""));
//! ```

pub mod json;
mod markdown;

pub use markdown::MarkdownGenerator;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur during summary generation.
#[derive(Debug, Error)]
pub enum ReportError {
    /// Failed to serialize the summary to JSON.
    #[error("failed to serialize summary: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Failed to write summary files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for report operations.
pub type Result<T> = std::result::Result<T, ReportError>;

// ============================================================================
// Summary Input (plain copy of the engine's ledger)
// ============================================================================

/// Snapshot of a questioning session, as handed over by the engine.
///
/// The engine owns the live ledger; this is a plain copy so the report crate
/// does not depend on the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryInput {
    /// Session the snapshot was taken from.
    pub session_id: String,
    /// Difficulty level the session ran at.
    pub difficulty: String,
    /// When the session was created.
    pub started_at: DateTime<Utc>,
    /// When the session last changed.
    pub ended_at: DateTime<Utc>,
    /// Questions issued over the whole session.
    pub questions_asked: u32,
    /// Checkpoint quizzes issued over the whole session.
    pub checkpoints: u32,
    /// Concepts in teaching order.
    pub concepts: Vec<ConceptInput>,
}

/// One ledger record inside a [`SummaryInput`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConceptInput {
    /// Display name of the concept.
    pub name: String,
    /// How many teaching events mentioned it.
    pub times_taught: u32,
    /// A question was issued in the latest teaching arc.
    pub questioned: bool,
    /// Outcome of the latest evaluated answer.
    pub understood: Option<bool>,
    /// Latest evaluated score.
    pub score: Option<f64>,
    /// Failed answers.
    pub attempts: u32,
    /// The student deferred the question.
    pub skipped: bool,
    /// A verification probe was passed.
    pub verified: bool,
    /// Probing has stopped after repeated failures.
    pub weak: bool,
}

impl ConceptInput {
    /// Creates an input for a concept taught once and not yet assessed.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            times_taught: 1,
            questioned: false,
            understood: None,
            score: None,
            attempts: 0,
            skipped: false,
            verified: false,
            weak: false,
        }
    }
}

// ============================================================================
// Mastery Level
// ============================================================================

/// Where a concept stands at the end of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MasteryLevel {
    /// Answered correctly.
    Mastered,
    /// Answered partially or incorrectly, still being worked on.
    Learning,
    /// Failed repeatedly; needs a different explanation.
    Weak,
    /// The student deferred the question.
    Skipped,
    /// No scored answer yet.
    NotAssessed,
}

impl MasteryLevel {
    /// Classifies a ledger record.
    ///
    /// A weak area stays weak even if a later score passed.
    #[must_use]
    pub fn classify(concept: &ConceptInput) -> Self {
        if concept.weak {
            Self::Weak
        } else if concept.understood == Some(true) {
            Self::Mastered
        } else if concept.skipped {
            Self::Skipped
        } else if concept.understood == Some(false) || concept.score.is_some() {
            Self::Learning
        } else {
            Self::NotAssessed
        }
    }

    /// Returns a human-readable label.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Mastered => "Mastered",
            Self::Learning => "Learning",
            Self::Weak => "Weak",
            Self::Skipped => "Skipped",
            Self::NotAssessed => "Not assessed",
        }
    }
}

impl std::fmt::Display for MasteryLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

// ============================================================================
// Learning Summary
// ============================================================================

/// End-of-session learning summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningSummary {
    /// Session the summary describes.
    pub session_id: String,

    /// Difficulty level the session ran at.
    pub difficulty: String,

    /// When the session was created.
    pub started_at: DateTime<Utc>,

    /// When the session last changed.
    pub ended_at: DateTime<Utc>,

    /// Session length in whole seconds.
    pub duration_seconds: u64,

    /// Every concept in teaching order.
    pub concepts: Vec<ConceptSummary>,

    /// Names of mastered concepts.
    pub mastered: Vec<String>,

    /// Names of concepts still being learned.
    pub learning: Vec<String>,

    /// Names of weak areas.
    pub weak_areas: Vec<String>,

    /// Names of skipped concepts.
    pub skipped: Vec<String>,

    /// Questions issued over the whole session.
    pub questions_asked: u32,

    /// Checkpoint quizzes issued over the whole session.
    pub checkpoints: u32,

    /// Followups ordered by priority.
    pub recommendations: Vec<Recommendation>,
}

impl LearningSummary {
    /// Builds a summary from a session snapshot.
    #[must_use]
    pub fn from_input(input: &SummaryInput) -> Self {
        let concepts: Vec<ConceptSummary> = input.concepts.iter().map(ConceptSummary::from).collect();

        let names_with = |level: MasteryLevel| -> Vec<String> {
            concepts
                .iter()
                .filter(|c| c.mastery == level)
                .map(|c| c.name.clone())
                .collect()
        };

        let mastered = names_with(MasteryLevel::Mastered);
        let learning = names_with(MasteryLevel::Learning);
        let weak_areas = names_with(MasteryLevel::Weak);
        let skipped = names_with(MasteryLevel::Skipped);

        let mut recommendations: Vec<Recommendation> = concepts
            .iter()
            .filter_map(Recommendation::for_concept)
            .collect();
        recommendations.sort_by_key(|r| r.priority);

        let duration_seconds =
            u64::try_from((input.ended_at - input.started_at).num_seconds()).unwrap_or(0);

        Self {
            session_id: input.session_id.clone(),
            difficulty: input.difficulty.clone(),
            started_at: input.started_at,
            ended_at: input.ended_at,
            duration_seconds,
            concepts,
            mastered,
            learning,
            weak_areas,
            skipped,
            questions_asked: input.questions_asked,
            checkpoints: input.checkpoints,
            recommendations,
        }
    }

    /// Serializes the summary to pretty JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(ReportError::from)
    }

    /// Counts concepts per mastery level.
    #[must_use]
    pub fn counts(&self) -> MasteryCounts {
        MasteryCounts {
            mastered: self.mastered.len(),
            learning: self.learning.len(),
            weak: self.weak_areas.len(),
            skipped: self.skipped.len(),
            not_assessed: self
                .concepts
                .iter()
                .filter(|c| c.mastery == MasteryLevel::NotAssessed)
                .count(),
        }
    }
}

/// Concept counts by mastery level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MasteryCounts {
    /// Mastered concepts.
    pub mastered: usize,
    /// Concepts still being learned.
    pub learning: usize,
    /// Weak areas.
    pub weak: usize,
    /// Skipped concepts.
    pub skipped: usize,
    /// Concepts without a scored answer.
    pub not_assessed: usize,
}

impl MasteryCounts {
    /// Returns the total number of concepts.
    #[must_use]
    pub const fn total(&self) -> usize {
        self.mastered + self.learning + self.weak + self.skipped + self.not_assessed
    }
}

// ============================================================================
// Concept Summary
// ============================================================================

/// One concept in a [`LearningSummary`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConceptSummary {
    /// Display name.
    pub name: String,
    /// Where the concept stands.
    pub mastery: MasteryLevel,
    /// Latest evaluated score.
    pub score: Option<f64>,
    /// How many teaching events mentioned it.
    pub times_taught: u32,
    /// Failed answers.
    pub attempts: u32,
    /// A verification probe was passed.
    pub verified: bool,
}

impl From<&ConceptInput> for ConceptSummary {
    fn from(concept: &ConceptInput) -> Self {
        Self {
            name: concept.name.clone(),
            mastery: MasteryLevel::classify(concept),
            score: concept.score,
            times_taught: concept.times_taught,
            attempts: concept.attempts,
            verified: concept.verified,
        }
    }
}

// ============================================================================
// Recommendation
// ============================================================================

/// A followup for the teaching layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recommendation {
    /// Priority level (1 = highest).
    pub priority: u32,

    /// Concept the recommendation is about.
    pub concept: String,

    /// What to do.
    pub description: String,
}

impl Recommendation {
    /// Creates a new recommendation.
    #[must_use]
    pub fn new(priority: u32, concept: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            priority,
            concept: concept.into(),
            description: description.into(),
        }
    }

    fn for_concept(concept: &ConceptSummary) -> Option<Self> {
        let name = &concept.name;
        match concept.mastery {
            MasteryLevel::Weak => Some(Self::new(
                1,
                name,
                format!("Re-teach {name} from a different angle before building on it"),
            )),
            MasteryLevel::Learning => Some(Self::new(
                2,
                name,
                format!("Give {name} another practice question"),
            )),
            MasteryLevel::Skipped => Some(Self::new(
                3,
                name,
                format!("Come back to {name}, which was skipped"),
            )),
            MasteryLevel::Mastered | MasteryLevel::NotAssessed => None,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
