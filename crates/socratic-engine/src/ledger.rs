//! Per-session record of taught concepts and their questioning status.
//!
//! Concept names are normalized (trimmed, inner whitespace collapsed,
//! lowercased) before lookup so "Arrays" and "arrays " share one record.
//! Records keep the spelling used the first time the concept was taught.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SocraticError};
use crate::question::Question;

/// Normalizes a concept name into its ledger key.
#[must_use]
pub fn normalize_concept_name(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Questioning status of one taught concept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConceptRecord {
    /// Display name, as first taught.
    pub name: String,

    /// When the concept was first taught.
    pub taught_at: DateTime<Utc>,

    /// When the concept was most recently taught.
    pub last_taught_at: DateTime<Utc>,

    /// How many teaching events mentioned the concept.
    pub times_taught: u32,

    /// A question has been issued in the current teaching arc.
    pub questioned: bool,

    /// Text of the most recent question covering the concept.
    pub question_text: Option<String>,

    /// The student's most recent answer.
    pub student_answer: Option<String>,

    /// `Some(true)` after a passing score, `Some(false)` after a failing one or
    /// an explicit "don't know", `None` while unknown.
    pub understood: Option<bool>,

    /// Most recent evaluated score.
    pub score: Option<f64>,

    /// Failed answers recorded for the concept.
    pub verification_attempts: u32,

    /// The student deferred the question.
    pub skipped: bool,

    /// Taught while another question was outstanding, or folded into the next checkpoint.
    pub pending: bool,

    /// A verification probe for the concept was passed.
    #[serde(default)]
    pub verified: bool,

    /// Automatic probing has stopped; the concept is a durable weak area.
    pub weak: bool,
}

impl ConceptRecord {
    fn new(name: &str, now: DateTime<Utc>) -> Self {
        Self {
            name: name.split_whitespace().collect::<Vec<_>>().join(" "),
            taught_at: now,
            last_taught_at: now,
            times_taught: 1,
            questioned: false,
            question_text: None,
            student_answer: None,
            understood: None,
            score: None,
            verification_attempts: 0,
            skipped: false,
            pending: false,
            verified: false,
            weak: false,
        }
    }

    /// Returns `true` if a comprehension question may be asked for the concept.
    #[must_use]
    pub const fn is_awaiting_question(&self) -> bool {
        !self.questioned && !self.weak
    }
}

/// Result of [`ConceptLedger::record_taught`].
#[derive(Debug, Clone, PartialEq)]
pub struct TaughtConcept {
    /// The record after the teaching event.
    pub record: ConceptRecord,
    /// `true` if the concept had never been taught in this session.
    pub first_time: bool,
}

/// Append-only ledger of concepts taught in a session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConceptLedger {
    /// Records keyed by normalized name, in first-taught order.
    records: IndexMap<String, ConceptRecord>,
    /// Normalized names ordered from least to most recently taught.
    recency: Vec<String>,
}

impl ConceptLedger {
    /// Creates an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a teaching event for `name`.
    ///
    /// Inserts a record on first teach. Re-teaching only refreshes the
    /// teaching timestamps; the questioning status is left unchanged.
    pub fn record_taught(&mut self, name: &str) -> Result<TaughtConcept> {
        let key = normalize_concept_name(name);
        if key.is_empty() {
            return Err(SocraticError::invalid_concept_name(name));
        }

        let now = Utc::now();
        self.recency.retain(|existing| existing != &key);
        self.recency.push(key.clone());

        if let Some(record) = self.records.get_mut(&key) {
            record.last_taught_at = now;
            record.times_taught += 1;
            return Ok(TaughtConcept {
                record: record.clone(),
                first_time: false,
            });
        }

        let record = ConceptRecord::new(name, now);
        self.records.insert(key, record.clone());
        Ok(TaughtConcept {
            record,
            first_time: true,
        })
    }

    /// Marks the concept as questioned by `question`.
    pub fn mark_questioned(&mut self, name: &str, question: &Question) -> Result<()> {
        let record = self.record_mut(name)?;
        record.questioned = true;
        record.pending = false;
        record.question_text = Some(question.text.clone());
        Ok(())
    }

    /// Stores an evaluated answer.
    pub fn mark_answered(
        &mut self,
        name: &str,
        answer: &str,
        understood: Option<bool>,
        score: Option<f64>,
    ) -> Result<()> {
        let record = self.record_mut(name)?;
        record.student_answer = Some(answer.to_string());
        record.understood = understood;
        record.score = score;
        Ok(())
    }

    /// Stores an answer that could not be scored, leaving `understood` untouched.
    pub fn record_unscored_answer(&mut self, name: &str, answer: &str) -> Result<()> {
        self.record_mut(name)?.student_answer = Some(answer.to_string());
        Ok(())
    }

    /// Marks the concept's question as deferred by the student.
    pub fn mark_skipped(&mut self, name: &str) -> Result<()> {
        let record = self.record_mut(name)?;
        record.skipped = true;
        record.understood = None;
        Ok(())
    }

    /// Sets or clears the pending flag.
    pub fn mark_pending(&mut self, name: &str, pending: bool) -> Result<()> {
        self.record_mut(name)?.pending = pending;
        Ok(())
    }

    /// Marks the concept as verified after a passed verification probe.
    pub fn mark_verified(&mut self, name: &str) -> Result<()> {
        self.record_mut(name)?.verified = true;
        Ok(())
    }

    /// Counts a failed answer and returns the new attempt count.
    pub fn record_failure(&mut self, name: &str) -> Result<u32> {
        let record = self.record_mut(name)?;
        record.understood = Some(false);
        record.verification_attempts += 1;
        Ok(record.verification_attempts)
    }

    /// Marks the concept as a durable weak area.
    pub fn mark_weak(&mut self, name: &str) -> Result<()> {
        let record = self.record_mut(name)?;
        record.weak = true;
        record.understood = Some(false);
        Ok(())
    }

    /// Opens a new teaching arc for a concept that was not understood.
    pub fn reset_for_reteach(&mut self, name: &str) -> Result<()> {
        let record = self.record_mut(name)?;
        record.questioned = false;
        record.skipped = false;
        Ok(())
    }

    /// Returns the last `n` taught concept names in teaching order.
    #[must_use]
    pub fn recent(&self, n: usize) -> Vec<String> {
        let start = self.recency.len().saturating_sub(n);
        self.recency[start..]
            .iter()
            .filter_map(|key| self.records.get(key))
            .map(|record| record.name.clone())
            .collect()
    }

    /// Returns the most recently taught concept.
    #[must_use]
    pub fn most_recent(&self) -> Option<&ConceptRecord> {
        self.recency.last().and_then(|key| self.records.get(key))
    }

    /// Looks up a concept by any spelling of its name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ConceptRecord> {
        self.records.get(&normalize_concept_name(name))
    }

    /// Iterates over records in first-taught order.
    pub fn iter(&self) -> impl Iterator<Item = &ConceptRecord> {
        self.records.values()
    }

    /// Returns the concepts that became weak areas.
    #[must_use]
    pub fn weak_areas(&self) -> Vec<String> {
        self.iter()
            .filter(|record| record.weak)
            .map(|record| record.name.clone())
            .collect()
    }

    /// Number of distinct concepts taught.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns `true` if nothing has been taught yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn record_mut(&mut self, name: &str) -> Result<&mut ConceptRecord> {
        self.records
            .get_mut(&normalize_concept_name(name))
            .ok_or_else(|| SocraticError::unknown_concept(name))
    }
}
