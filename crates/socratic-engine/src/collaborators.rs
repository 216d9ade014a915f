//! Interfaces to the external question generator and answer evaluator.
//!
//! The engine only awaits these traits; [`crate::remote`] provides the HTTP
//! implementations used by the server binary.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::DifficultyLevel;
use crate::error::Result;
use crate::question::{Evaluation, GeneratedQuestion, QuestionKind};

/// Request sent to a [`QuestionGenerator`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionRequest {
    /// Kind of question wanted.
    pub kind: QuestionKind,
    /// Concepts the question must cover.
    pub concept_refs: Vec<String>,
    /// Difficulty hint for the wording.
    pub difficulty_hint: DifficultyLevel,
}

/// Request sent to an [`AnswerEvaluator`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationRequest {
    /// The question text the student saw.
    pub question: String,
    /// The student's answer.
    pub answer: String,
    /// Difficulty hint for grading.
    pub difficulty_hint: DifficultyLevel,
}

/// Produces question text for one or more concepts.
#[async_trait]
pub trait QuestionGenerator: Send + Sync {
    /// Generates a question.
    ///
    /// # Errors
    ///
    /// Returns `SocraticError::Generation` if the service fails or its reply
    /// is unusable.
    async fn generate_question(&self, request: &QuestionRequest) -> Result<GeneratedQuestion>;
}

/// Scores a free-text answer.
#[async_trait]
pub trait AnswerEvaluator: Send + Sync {
    /// Evaluates an answer.
    ///
    /// # Errors
    ///
    /// Returns `SocraticError::Evaluation` if the service fails or its reply
    /// is unusable.
    async fn evaluate_answer(&self, request: &EvaluationRequest) -> Result<Evaluation>;
}
