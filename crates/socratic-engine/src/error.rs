//! Error types for the Socratic questioning engine.
//!
//! This module defines the error hierarchy for all engine operations,
//! including configuration loading, calls to the external question and answer
//! services, ledger bookkeeping, and session management.

use std::path::PathBuf;

/// A specialized `Result` type for Socratic engine operations.
pub type Result<T> = std::result::Result<T, SocraticError>;

/// Errors that can occur while running a Socratic questioning session.
///
/// Generation and evaluation failures are recovered locally by the engine and
/// never reach the student. Ledger and transition errors signal programming
/// defects and are logged rather than surfaced.
#[derive(Debug, thiserror::Error)]
pub enum SocraticError {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Invalid JSON syntax in configuration file.
    #[error("Invalid JSON in config file '{path}': {message}\n\nSuggestion: Validate your socratic.json with a JSON linter")]
    ConfigParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Description of the parse error.
        message: String,
    },

    /// Configuration validation failed.
    #[error("Invalid configuration: {message}\n\nSuggestion: {suggestion}")]
    ConfigValidationError {
        /// Description of the validation failure.
        message: String,
        /// Actionable suggestion for the user.
        suggestion: String,
    },

    // ========================================================================
    // External Collaborator Errors
    // ========================================================================
    /// The question service failed or returned something unusable.
    #[error("Question generation failed ({kind}): {message}")]
    Generation {
        /// What went wrong with the call.
        kind: CollaboratorErrorKind,
        /// Detailed error message.
        message: String,
    },

    /// The answer evaluation service failed or returned something unusable.
    #[error("Answer evaluation failed ({kind}): {message}")]
    Evaluation {
        /// What went wrong with the call.
        kind: CollaboratorErrorKind,
        /// Detailed error message.
        message: String,
    },

    // ========================================================================
    // Ledger Errors
    // ========================================================================
    /// The ledger has no record for the given concept.
    #[error("Unknown concept '{name}': no record in the concept ledger")]
    UnknownConcept {
        /// The concept name as it was looked up.
        name: String,
    },

    /// A concept name was empty after normalization.
    #[error("Invalid concept name '{name}': concept names must contain at least one non-whitespace character")]
    InvalidConceptName {
        /// The rejected name.
        name: String,
    },

    // ========================================================================
    // State Machine Errors
    // ========================================================================
    /// Invalid state transition attempted.
    #[error("Invalid state transition: cannot go from {from} to {to}")]
    InvalidStateTransition {
        /// The current state.
        from: String,
        /// The attempted target state.
        to: String,
    },

    // ========================================================================
    // Session Errors
    // ========================================================================
    /// No session is registered under the given id.
    #[error("Session not found: '{session_id}'")]
    SessionNotFound {
        /// The requested session id.
        session_id: String,
    },

    /// A session with the given id is already running.
    #[error("Session already exists: '{session_id}'\n\nSuggestion: End the existing session first or pick a different id")]
    SessionAlreadyExists {
        /// The conflicting session id.
        session_id: String,
    },

    /// The session's event loop has shut down.
    #[error("Session '{session_id}' is closed")]
    SessionClosed {
        /// The closed session id.
        session_id: String,
    },

    // ========================================================================
    // General I/O Errors
    // ========================================================================
    /// General I/O error during file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Categories of failures when calling the question or answer services.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollaboratorErrorKind {
    /// The call did not finish within the configured call timeout.
    Timeout,
    /// The service could not be reached or answered with an error status.
    Unavailable,
    /// The service answered with a body the engine cannot use.
    Malformed,
    /// Other unclassified errors.
    Other,
}

impl std::fmt::Display for CollaboratorErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Timeout => write!(f, "timeout"),
            Self::Unavailable => write!(f, "unavailable"),
            Self::Malformed => write!(f, "malformed"),
            Self::Other => write!(f, "other"),
        }
    }
}

impl CollaboratorErrorKind {
    /// Returns `true` if a later call of the same kind could succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout | Self::Unavailable)
    }
}

impl SocraticError {
    /// Creates a new `ConfigParseError` with the given path and message.
    #[must_use]
    pub fn config_parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::ConfigParseError {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a new `ConfigValidationError` with the given message and suggestion.
    #[must_use]
    pub fn config_validation(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::ConfigValidationError {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Creates a new `Generation` error.
    #[must_use]
    pub fn generation(kind: CollaboratorErrorKind, message: impl Into<String>) -> Self {
        Self::Generation {
            kind,
            message: message.into(),
        }
    }

    /// Creates a new `Evaluation` error.
    #[must_use]
    pub fn evaluation(kind: CollaboratorErrorKind, message: impl Into<String>) -> Self {
        Self::Evaluation {
            kind,
            message: message.into(),
        }
    }

    /// Creates a new `UnknownConcept` error.
    #[must_use]
    pub fn unknown_concept(name: impl Into<String>) -> Self {
        Self::UnknownConcept { name: name.into() }
    }

    /// Creates a new `InvalidConceptName` error.
    #[must_use]
    pub fn invalid_concept_name(name: impl Into<String>) -> Self {
        Self::InvalidConceptName { name: name.into() }
    }

    /// Creates a new `InvalidStateTransition` error.
    #[must_use]
    pub fn invalid_transition(from: impl std::fmt::Display, to: impl std::fmt::Display) -> Self {
        Self::InvalidStateTransition {
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    /// Creates a new `SessionNotFound` error.
    #[must_use]
    pub fn session_not_found(session_id: impl Into<String>) -> Self {
        Self::SessionNotFound {
            session_id: session_id.into(),
        }
    }

    /// Creates a new `SessionAlreadyExists` error.
    #[must_use]
    pub fn session_exists(session_id: impl Into<String>) -> Self {
        Self::SessionAlreadyExists {
            session_id: session_id.into(),
        }
    }

    /// Creates a new `SessionClosed` error.
    #[must_use]
    pub fn session_closed(session_id: impl Into<String>) -> Self {
        Self::SessionClosed {
            session_id: session_id.into(),
        }
    }

    /// Returns `true` if the engine recovers from this error by skipping the check.
    ///
    /// Question and answer service failures degrade to "no question asked"
    /// or neutral feedback instead of interrupting the lesson.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::Generation { .. } | Self::Evaluation { .. })
    }

    /// Returns `true` if this error indicates a bug in the engine's own bookkeeping.
    #[must_use]
    pub const fn is_defect(&self) -> bool {
        matches!(
            self,
            Self::UnknownConcept { .. } | Self::InvalidStateTransition { .. }
        )
    }

    /// Returns `true` if this error is transient and may be retried.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::Generation { kind, .. } | Self::Evaluation { kind, .. } => kind.is_transient(),
            _ => false,
        }
    }
}
