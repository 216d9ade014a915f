//! Markdown rendering of learning summaries.
//!
//! The generated document includes:
//!
//! - A summary table with session metrics
//! - Lists of mastered, learning, weak and skipped concepts
//! - A per-concept table
//! - Prioritized recommendations
//!
//! # Example
//!
//! ```rust,no_run
//! use socratic_report::{LearningSummary, MarkdownGenerator, SummaryInput};
//!
//! # fn example(input: SummaryInput) {
//! let summary = LearningSummary::from_input(&input);
//! let markdown = MarkdownGenerator::new(&summary).generate();
//! assert!(markdown.starts_with("# Learning Summary"));
//! # }
//! ```

use chrono::{DateTime, Utc};
use std::fmt::Write;

use crate::{ConceptSummary, LearningSummary, MasteryLevel};

/// Generates Markdown summaries.
pub struct MarkdownGenerator<'a> {
    summary: &'a LearningSummary,
}

impl<'a> MarkdownGenerator<'a> {
    /// Creates a new Markdown generator for the given summary.
    #[must_use]
    pub const fn new(summary: &'a LearningSummary) -> Self {
        Self { summary }
    }

    /// Generates the complete Markdown document.
    #[must_use]
    pub fn generate(&self) -> String {
        let mut output = String::new();

        self.write_title(&mut output);
        self.write_metrics(&mut output);
        Self::write_name_list(&mut output, "Mastered", &self.summary.mastered);
        Self::write_name_list(&mut output, "Still Learning", &self.summary.learning);
        self.write_weak_areas(&mut output);
        Self::write_name_list(&mut output, "Skipped", &self.summary.skipped);
        self.write_concept_table(&mut output);
        self.write_recommendations(&mut output);
        self.write_footer(&mut output);

        output
    }

    fn write_title(&self, output: &mut String) {
        let _ = writeln!(
            output,
            "# Learning Summary: {}\n",
            escape_markdown(&self.summary.session_id)
        );
    }

    fn write_metrics(&self, output: &mut String) {
        let counts = self.summary.counts();

        let _ = writeln!(output, "## Summary\n");
        let _ = writeln!(output, "| Metric | Value |");
        let _ = writeln!(output, "|--------|-------|");
        let _ = writeln!(
            output,
            "| Difficulty | {} |",
            escape_markdown(&self.summary.difficulty)
        );
        let _ = writeln!(
            output,
            "| Duration | {} |",
            format_duration(self.summary.duration_seconds)
        );
        let _ = writeln!(output, "| Concepts Taught | {} |", counts.total());
        let _ = writeln!(
            output,
            "| Questions Asked | {} |",
            self.summary.questions_asked
        );
        let _ = writeln!(
            output,
            "| Checkpoint Quizzes | {} |",
            self.summary.checkpoints
        );
        let _ = writeln!(output);
    }

    fn write_name_list(output: &mut String, title: &str, names: &[String]) {
        let _ = writeln!(output, "## {title}\n");

        if names.is_empty() {
            let _ = writeln!(output, "*None*\n");
            return;
        }

        for name in names {
            let _ = writeln!(output, "- {}", escape_markdown(name));
        }
        let _ = writeln!(output);
    }

    /// Weak areas carry their failed-attempt count.
    fn write_weak_areas(&self, output: &mut String) {
        let _ = writeln!(output, "## Weak Areas\n");

        let weak: Vec<&ConceptSummary> = self
            .summary
            .concepts
            .iter()
            .filter(|c| c.mastery == MasteryLevel::Weak)
            .collect();

        if weak.is_empty() {
            let _ = writeln!(output, "*None*\n");
            return;
        }

        for concept in weak {
            let _ = writeln!(
                output,
                "- {} ({} failed {})",
                escape_markdown(&concept.name),
                concept.attempts,
                if concept.attempts == 1 {
                    "attempt"
                } else {
                    "attempts"
                }
            );
        }
        let _ = writeln!(output);
    }

    fn write_concept_table(&self, output: &mut String) {
        let _ = writeln!(output, "## Concepts\n");

        if self.summary.concepts.is_empty() {
            let _ = writeln!(output, "*No concepts were taught.*\n");
            return;
        }

        let _ = writeln!(output, "| Concept | Status | Score | Times Taught | Attempts |");
        let _ = writeln!(output, "|---------|--------|-------|--------------|----------|");

        for concept in &self.summary.concepts {
            let score = concept
                .score
                .map_or_else(|| "-".to_string(), |s| format!("{s:.2}"));
            let status = if concept.verified {
                format!("{} (verified)", concept.mastery.label())
            } else {
                concept.mastery.label().to_string()
            };
            let _ = writeln!(
                output,
                "| {} | {status} | {score} | {} | {} |",
                escape_markdown(&concept.name),
                concept.times_taught,
                concept.attempts
            );
        }
        let _ = writeln!(output);
    }

    fn write_recommendations(&self, output: &mut String) {
        let _ = writeln!(output, "## Recommendations\n");

        if self.summary.recommendations.is_empty() {
            let _ = writeln!(output, "*No followups needed.*\n");
            return;
        }

        for (i, rec) in self.summary.recommendations.iter().enumerate() {
            let _ = writeln!(
                output,
                "{}. {}",
                i + 1,
                escape_markdown(&rec.description)
            );
        }
        let _ = writeln!(output);
    }

    fn write_footer(&self, output: &mut String) {
        let _ = writeln!(output, "---\n");
        let _ = writeln!(
            output,
            "*Session started {} and ended {}*",
            format_timestamp(&self.summary.started_at),
            format_timestamp(&self.summary.ended_at)
        );
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Formats a duration in seconds, e.g. 65 -> "1m 5s", 3661 -> "1h 1m 1s".
fn format_duration(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;

    let mut parts = Vec::new();

    if hours > 0 {
        parts.push(format!("{hours}h"));
    }
    if minutes > 0 {
        parts.push(format!("{minutes}m"));
    }
    if secs > 0 || parts.is_empty() {
        parts.push(format!("{secs}s"));
    }

    parts.join(" ")
}

/// Format: "YYYY-MM-DD HH:MM:SS UTC"
fn format_timestamp(dt: &DateTime<Utc>) -> String {
    dt.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

/// Escapes Markdown control characters in user-supplied text.
fn escape_markdown(text: &str) -> String {
    let mut result = String::with_capacity(text.len());

    for ch in text.chars() {
        match ch {
            '*' | '_' | '`' | '#' | '[' | ']' | '(' | ')' | '!' | '\\' | '<' | '>' | '|' => {
                result.push('\\');
                result.push(ch);
            }
            '\n' => result.push_str("<br>"),
            _ => result.push(ch),
        }
    }

    result
}

// ============================================================================
// Tests
// ============================================================================
