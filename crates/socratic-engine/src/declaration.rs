//! Parsing of concept declarations in teaching text.
//!
//! The teaching layer announces what a turn covers with a sentence such as
//! "This response teaches 3 concepts: variables, assignment, data types".
//! The declared names are recorded as one teaching turn.

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Concepts a single teaching turn should introduce at most.
pub const WORKING_MEMORY_LIMIT: usize = 3;

const DECLARATION_PATTERN: &str = r"(?i)teach(?:es|ing)?\s+(\d+)\s+concepts?:\s*([^.\n]+)";
const SEPARATOR_PATTERN: &str = r"(?i)\s*,\s*(?:and\s+)?|\s+and\s+|\s*&\s*";

/// A concept declaration found in teaching text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConceptDeclaration {
    /// The number the text claims to teach.
    pub declared_count: usize,
    /// Concept names in the order they were listed.
    pub concepts: Vec<String>,
}

impl ConceptDeclaration {
    /// Returns `true` if the turn declares more concepts than the working-memory limit.
    #[must_use]
    pub fn exceeds_limit(&self) -> bool {
        self.concepts.len().max(self.declared_count) > WORKING_MEMORY_LIMIT
    }
}

/// Extracts the concept declaration from `text`, if there is one.
///
/// Matching is case-insensitive; names keep the spelling used in the text.
/// A declaration over [`WORKING_MEMORY_LIMIT`] is logged but still returned.
#[must_use]
pub fn parse_concept_declaration(text: &str) -> Option<ConceptDeclaration> {
    let Ok(declaration) = Regex::new(DECLARATION_PATTERN) else {
        return None;
    };
    let Ok(separator) = Regex::new(SEPARATOR_PATTERN) else {
        return None;
    };

    let captures = declaration.captures(text)?;
    let declared_count = captures.get(1)?.as_str().parse::<usize>().ok()?;
    let list = captures.get(2)?.as_str();

    let concepts: Vec<String> = separator
        .split(list)
        .map(|name| name.trim().trim_start_matches("and ").trim().to_string())
        .filter(|name| !name.is_empty())
        .collect();
    if concepts.is_empty() {
        return None;
    }

    let parsed = ConceptDeclaration {
        declared_count,
        concepts,
    };

    if parsed.exceeds_limit() {
        warn!(
            declared = parsed.declared_count,
            listed = parsed.concepts.len(),
            limit = WORKING_MEMORY_LIMIT,
            "Teaching turn declares more concepts than the working-memory limit"
        );
    } else {
        info!(concepts = ?parsed.concepts, "Parsed concept declaration");
    }
    Some(parsed)
}
