//! Configuration types for the Socratic questioning engine.
//!
//! This module provides the timing policy, grading thresholds, checkpoint
//! cadence, and server settings used by the engine and the HTTP surface.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SocraticError};

/// The default config file name.
const CONFIG_FILE_NAME: &str = "socratic.json";

/// Seconds to wait for an answer before sending a gentle prompt.
const fn default_answer_timeout() -> u64 {
    120
}

/// Seconds after the gentle prompt before a hint is offered.
const fn default_hint_delay() -> u64 {
    60
}

/// Upper bound in seconds for a single call to the question or answer service.
const fn default_call_timeout() -> u64 {
    10
}

const fn default_pass_threshold() -> f64 {
    0.7
}

const fn default_partial_threshold() -> f64 {
    0.5
}

const fn default_max_verification_attempts() -> u32 {
    2
}

/// Comprehension questions between checkpoint quizzes.
const fn default_checkpoint_interval() -> u32 {
    3
}

/// Number of recent concepts a checkpoint quiz covers.
const fn default_checkpoint_size() -> usize {
    3
}

const fn default_history_limit() -> usize {
    50
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

const fn default_port() -> u16 {
    3000
}

const fn default_event_buffer() -> usize {
    100
}

const fn default_inbox_capacity() -> usize {
    64
}

fn default_generator_url() -> String {
    "http://127.0.0.1:8080/generate".to_string()
}

fn default_evaluator_url() -> String {
    "http://127.0.0.1:8080/evaluate".to_string()
}

/// Main configuration for the Socratic engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Seconds of silence after a question before the gentle prompt.
    #[serde(default = "default_answer_timeout")]
    pub answer_timeout_seconds: u64,

    /// Seconds after the gentle prompt before a hint is offered.
    #[serde(default = "default_hint_delay")]
    pub hint_delay_seconds: u64,

    /// Timeout for each call to the question or answer service.
    #[serde(default = "default_call_timeout")]
    pub call_timeout_seconds: u64,

    /// Minimum score counted as understood.
    #[serde(default = "default_pass_threshold")]
    pub pass_threshold: f64,

    /// Minimum score earning partial credit.
    #[serde(default = "default_partial_threshold")]
    pub partial_threshold: f64,

    /// Failed attempts after which a concept becomes a weak area.
    #[serde(default = "default_max_verification_attempts")]
    pub max_verification_attempts: u32,

    /// Comprehension questions between checkpoint quizzes.
    #[serde(default = "default_checkpoint_interval")]
    pub checkpoint_interval: u32,

    /// How many recent concepts a checkpoint quiz covers (2 or 3).
    #[serde(default = "default_checkpoint_size")]
    pub checkpoint_size: usize,

    /// Whether a not-understood concept is questioned again after re-teaching.
    #[serde(default)]
    pub requestion_policy: RequestionPolicy,

    /// Default difficulty hint passed to the question and answer services.
    #[serde(default)]
    pub difficulty: DifficultyLevel,

    /// Number of state transitions kept in each session snapshot.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,

    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Endpoints of the remote question and answer services.
    #[serde(default)]
    pub collaborators: CollaboratorConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            answer_timeout_seconds: default_answer_timeout(),
            hint_delay_seconds: default_hint_delay(),
            call_timeout_seconds: default_call_timeout(),
            pass_threshold: default_pass_threshold(),
            partial_threshold: default_partial_threshold(),
            max_verification_attempts: default_max_verification_attempts(),
            checkpoint_interval: default_checkpoint_interval(),
            checkpoint_size: default_checkpoint_size(),
            requestion_policy: RequestionPolicy::default(),
            difficulty: DifficultyLevel::default(),
            history_limit: default_history_limit(),
            server: ServerConfig::default(),
            collaborators: CollaboratorConfig::default(),
        }
    }
}

impl Config {
    /// Loads configuration from the current working directory.
    ///
    /// Looks for `socratic.json` in the current directory. If not found,
    /// returns the default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but contains invalid JSON.
    pub fn load() -> Result<Self> {
        let current_dir = std::env::current_dir().map_err(|e| {
            SocraticError::config_parse(
                "<current directory>",
                format!("cannot determine current directory: {e}"),
            )
        })?;
        Self::load_from_dir(&current_dir)
    }

    /// Loads configuration from `socratic.json` in a specific directory.
    pub fn load_from_dir(dir: &Path) -> Result<Self> {
        let config_path = dir.join(CONFIG_FILE_NAME);
        Self::load_from_file(&config_path)
    }

    /// Loads configuration from a specific file path.
    ///
    /// If the file does not exist, returns default configuration.
    ///
    /// # Errors
    ///
    /// Returns `SocraticError::ConfigParseError` if the file exists but contains
    /// invalid JSON or invalid enum values.
    ///
    /// Returns `SocraticError::ConfigValidationError` if the configuration values
    /// are out of range.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let config = Self::default();
                config.validate()?;
                return Ok(config);
            }
            Err(e) => {
                return Err(SocraticError::config_parse(
                    path,
                    format!("failed to read file: {e}"),
                ));
            }
        };

        let config: Self = serde_json::from_str(&contents)
            .map_err(|e| SocraticError::config_parse(path, e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `SocraticError::ConfigValidationError` if any validation check fails.
    pub fn validate(&self) -> Result<()> {
        if self.answer_timeout_seconds == 0 {
            return Err(SocraticError::config_validation(
                "answerTimeoutSeconds must be greater than 0",
                "Set answerTimeoutSeconds to at least 1 second in your socratic.json",
            ));
        }

        if self.hint_delay_seconds == 0 {
            return Err(SocraticError::config_validation(
                "hintDelaySeconds must be greater than 0",
                "Set hintDelaySeconds to at least 1 second in your socratic.json",
            ));
        }

        if self.call_timeout_seconds == 0 {
            return Err(SocraticError::config_validation(
                "callTimeoutSeconds must be greater than 0",
                "Set callTimeoutSeconds to at least 1 second in your socratic.json",
            ));
        }

        if !(0.0..=1.0).contains(&self.pass_threshold)
            || !(0.0..=1.0).contains(&self.partial_threshold)
        {
            return Err(SocraticError::config_validation(
                "passThreshold and partialThreshold must be between 0.0 and 1.0",
                "Use scores such as 0.7 and 0.5 in your socratic.json",
            ));
        }

        if self.partial_threshold > self.pass_threshold {
            return Err(SocraticError::config_validation(
                "partialThreshold must not exceed passThreshold",
                "Lower partialThreshold or raise passThreshold in your socratic.json",
            ));
        }

        if self.max_verification_attempts == 0 {
            return Err(SocraticError::config_validation(
                "maxVerificationAttempts must be greater than 0",
                "Set maxVerificationAttempts to at least 1 in your socratic.json",
            ));
        }

        if self.checkpoint_interval == 0 {
            return Err(SocraticError::config_validation(
                "checkpointInterval must be greater than 0",
                "Set checkpointInterval to at least 1 in your socratic.json",
            ));
        }

        if !(2..=3).contains(&self.checkpoint_size) {
            return Err(SocraticError::config_validation(
                "checkpointSize must be 2 or 3",
                "Set checkpointSize to 2 or 3 in your socratic.json",
            ));
        }

        if self.server.host.trim().is_empty() {
            return Err(SocraticError::config_validation(
                "server.host must not be empty",
                "Provide a bind address such as 127.0.0.1 in your socratic.json",
            ));
        }

        if self.server.event_buffer == 0 || self.server.inbox_capacity == 0 {
            return Err(SocraticError::config_validation(
                "server.eventBuffer and server.inboxCapacity must be greater than 0",
                "Use the defaults (100 and 64) unless you have a reason to change them",
            ));
        }

        Ok(())
    }

    /// Returns the answer timeout as a `Duration`.
    #[must_use]
    pub const fn answer_timeout(&self) -> Duration {
        Duration::from_secs(self.answer_timeout_seconds)
    }

    /// Returns the hint delay as a `Duration`.
    #[must_use]
    pub const fn hint_delay(&self) -> Duration {
        Duration::from_secs(self.hint_delay_seconds)
    }

    /// Returns the collaborator call timeout as a `Duration`.
    #[must_use]
    pub const fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_seconds)
    }
}

/// Whether a concept that was not understood is questioned again after it is re-taught.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RequestionPolicy {
    /// Re-teaching a not-understood concept opens a new questioning round,
    /// until the concept becomes a weak area (default).
    #[default]
    AfterReteach,
    /// A concept is questioned automatically at most once per session.
    Never,
}

impl RequestionPolicy {
    /// Parses a string into a `RequestionPolicy`, case-insensitively.
    fn from_str_case_insensitive(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "afterreteach" | "after_reteach" | "after-reteach" => Some(Self::AfterReteach),
            "never" => Some(Self::Never),
            _ => None,
        }
    }
}

impl<'de> Deserialize<'de> for RequestionPolicy {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_str_case_insensitive(&s).ok_or_else(|| {
            serde::de::Error::custom(format!(
                "invalid requestion policy '{s}': expected one of 'afterReteach', 'never'"
            ))
        })
    }
}

impl Serialize for RequestionPolicy {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let s = match self {
            Self::AfterReteach => "afterReteach",
            Self::Never => "never",
        };
        serializer.serialize_str(s)
    }
}

/// Difficulty hint forwarded to the question and answer services.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DifficultyLevel {
    /// First exposure to the material (default).
    #[default]
    Beginner,
    /// Comfortable with the basics.
    Intermediate,
    /// Ready for edge cases and tradeoffs.
    Advanced,
}

impl DifficultyLevel {
    /// Parses a string into a `DifficultyLevel`, case-insensitively.
    fn from_str_case_insensitive(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "beginner" => Some(Self::Beginner),
            "intermediate" => Some(Self::Intermediate),
            "advanced" => Some(Self::Advanced),
            _ => None,
        }
    }

    /// Returns the hint string sent to the external services.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Beginner => "beginner",
            Self::Intermediate => "intermediate",
            Self::Advanced => "advanced",
        }
    }
}

impl std::fmt::Display for DifficultyLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for DifficultyLevel {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_str_case_insensitive(&s).ok_or_else(|| {
            serde::de::Error::custom(format!(
                "invalid difficulty '{s}': expected one of 'beginner', 'intermediate', 'advanced'"
            ))
        })
    }
}

impl Serialize for DifficultyLevel {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

/// HTTP server and per-session channel settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    /// Address to bind the HTTP server to.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port for the HTTP server.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Buffered events per WebSocket subscriber before old events are dropped.
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,

    /// Queued events per session before senders wait.
    #[serde(default = "default_inbox_capacity")]
    pub inbox_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            event_buffer: default_event_buffer(),
            inbox_capacity: default_inbox_capacity(),
        }
    }
}

/// Endpoints of the remote question and answer services.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollaboratorConfig {
    /// URL that receives question generation requests.
    #[serde(default = "default_generator_url")]
    pub generator_url: String,

    /// URL that receives answer evaluation requests.
    #[serde(default = "default_evaluator_url")]
    pub evaluator_url: String,
}

impl Default for CollaboratorConfig {
    fn default() -> Self {
        Self {
            generator_url: default_generator_url(),
            evaluator_url: default_evaluator_url(),
        }
    }
}
