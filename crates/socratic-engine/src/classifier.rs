//! Classification of free-text student messages.
//!
//! The engine never matches phrases itself; it asks a [`MessageClassifier`]
//! what a message means and acts on the returned [`MessageIntent`]. The
//! default [`KeywordClassifier`] is a best-effort regex matcher. Because each
//! message is classified afresh, a misclassified message never loses the
//! pending question.

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::ledger::normalize_concept_name;

/// What a student message means to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageIntent {
    /// A reply to the pending question.
    Answer,
    /// The student defers the pending question.
    Skip,
    /// The student says they understand.
    ClaimUnderstanding,
    /// A new question unrelated to the pending one.
    NewQuestion,
    /// The student says they don't know the answer.
    DontKnow,
}

/// What the classifier may know about the session when a message arrives.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClassificationContext<'a> {
    /// A question is outstanding.
    pub question_pending: bool,
    /// Concepts the outstanding question covers.
    pub concept_refs: &'a [String],
}

/// Maps student text to an intent.
pub trait MessageClassifier: Send + Sync {
    /// Classifies `text` given the session context.
    fn classify(&self, text: &str, context: &ClassificationContext<'_>) -> MessageIntent;
}

const SKIP_PATTERNS: &[&str] = &[
    r"^(?:skip|pass)(?:\s+(?:it|this|this one|for now))?$",
    r"^(?:next|next question|move on|later|ask me later)$",
    r"\b(?:skip|pass on) (?:this|that|the) question\b",
];

// Whole-message matches only: a hedged answer ("I'm not sure, but...") is
// still an answer and goes to the evaluator.
const DONT_KNOW_PATTERNS: &[&str] = &[
    r"^(?:sorry,?\s+)?i\s+(?:really\s+)?(?:don['’]?t|do not)\s+know(?:\s+(?:this|that|it|the answer))?(?:,?\s+sorry)?\??$",
    r"^(?:sorry,?\s+)?i\s+(?:have\s+)?no\s+(?:idea|clue)(?:,?\s+sorry)?\??$",
    r"^(?:i['’]?m|i am)\s+not\s+sure\??$",
    r"^(?:no idea|no clue|not sure|idk|dunno)\??$",
];

const CLAIM_PATTERNS: &[&str] = &[
    r"\bgot it\b",
    r"\bmakes sense\b",
    r"\bi\s+(?:understand|get it|see now)\b",
    r"^(?:understood|ok(?:ay)?,?\s+understood)$",
    r"\bthat'?s\s+clear\b",
];

const QUESTION_START_PATTERN: &str = r"^(?:what|why|how|when|where|which|who|can you|could you|would you|is it|is there|are there|do i|does|should i)\b";

/// Default regex-based classifier.
///
/// Patterns are matched against the lowercased, whitespace-collapsed message
/// with trailing punctuation other than `?` removed.
#[derive(Debug, Clone)]
pub struct KeywordClassifier {
    skip: Vec<Regex>,
    dont_know: Vec<Regex>,
    claim: Vec<Regex>,
    question_start: Option<Regex>,
}

impl Default for KeywordClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl KeywordClassifier {
    /// Builds the classifier with the built-in English phrase lists.
    #[must_use]
    pub fn new() -> Self {
        Self {
            skip: compile(SKIP_PATTERNS),
            dont_know: compile(DONT_KNOW_PATTERNS),
            claim: compile(CLAIM_PATTERNS),
            question_start: Regex::new(QUESTION_START_PATTERN).ok(),
        }
    }

    fn is_new_question(&self, text: &str, concept_refs: &[String]) -> bool {
        if !text.ends_with('?') {
            return false;
        }
        let starts_like_question = self
            .question_start
            .as_ref()
            .is_some_and(|re| re.is_match(text));
        if !starts_like_question {
            return false;
        }
        // Asking about the pending question's own concepts is treated as an answer attempt
        !concept_refs.iter().any(|concept| {
            let concept = normalize_concept_name(concept);
            !concept.is_empty() && text.contains(&concept)
        })
    }
}

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns.iter().filter_map(|p| Regex::new(p).ok()).collect()
}

fn matches_any(patterns: &[Regex], text: &str) -> bool {
    patterns.iter().any(|re| re.is_match(text))
}

fn prepare(text: &str) -> String {
    normalize_concept_name(text)
        .trim_end_matches(|c: char| matches!(c, '.' | '!' | ',' | ';'))
        .trim()
        .to_string()
}

impl MessageClassifier for KeywordClassifier {
    fn classify(&self, text: &str, context: &ClassificationContext<'_>) -> MessageIntent {
        let text = prepare(text);

        let intent = if context.question_pending {
            if matches_any(&self.skip, &text) {
                MessageIntent::Skip
            } else if matches_any(&self.dont_know, &text) {
                MessageIntent::DontKnow
            } else if self.is_new_question(&text, context.concept_refs) {
                MessageIntent::NewQuestion
            } else {
                MessageIntent::Answer
            }
        } else if matches_any(&self.claim, &text) {
            MessageIntent::ClaimUnderstanding
        } else if self.is_new_question(&text, &[]) {
            MessageIntent::NewQuestion
        } else {
            MessageIntent::Answer
        };

        debug!(
            intent = ?intent,
            question_pending = context.question_pending,
            "Classified student message"
        );
        intent
    }
}
