//! JSON summary generation.
//!
//! This module provides [`JsonGenerator`] for serializing learning summaries to JSON.
//! Summaries can be generated as compact single-line JSON or pretty-printed.
//!
//! # Example
//!
//! ```rust,no_run
//! use socratic_report::{LearningSummary, SummaryInput};
//! use socratic_report::json::JsonGenerator;
//! use std::path::Path;
//!
//! # fn example(input: SummaryInput) {
//! let summary = LearningSummary::from_input(&input);
//! let generator = JsonGenerator::new(&summary);
//!
//! let compact = generator.generate().unwrap();
//! generator.write_to_file(Path::new("learning-summary.json"), true).unwrap();
//! # }
//! ```

use std::fs::File;
use std::io::Write;
use std::path::Path;

use crate::{LearningSummary, ReportError, Result};

/// JSON summary generator.
pub struct JsonGenerator<'a> {
    summary: &'a LearningSummary,
}

impl<'a> JsonGenerator<'a> {
    /// Creates a new JSON generator for the given summary.
    #[must_use]
    pub const fn new(summary: &'a LearningSummary) -> Self {
        Self { summary }
    }

    /// Generates compact JSON output (single line, no extra whitespace).
    ///
    /// # Errors
    ///
    /// Returns [`ReportError::Serialization`] if JSON serialization fails.
    pub fn generate(&self) -> Result<String> {
        serde_json::to_string(self.summary).map_err(ReportError::from)
    }

    /// Generates pretty-printed JSON output with indentation.
    ///
    /// # Errors
    ///
    /// Returns [`ReportError::Serialization`] if JSON serialization fails.
    pub fn generate_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self.summary).map_err(ReportError::from)
    }

    /// Writes the JSON summary to a file, creating or overwriting it.
    ///
    /// Parent directories must exist.
    ///
    /// # Errors
    ///
    /// Returns [`ReportError::Serialization`] if JSON serialization fails.
    /// Returns [`ReportError::Io`] if file creation or writing fails.
    pub fn write_to_file(&self, path: &Path, pretty: bool) -> Result<()> {
        let json = if pretty {
            self.generate_pretty()?
        } else {
            self.generate()?
        };

        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;

        Ok(())
    }
}
