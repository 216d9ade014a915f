//! HTTP implementations of the question generator and answer evaluator.
//!
//! Both services take a JSON POST and reply with JSON:
//! - generator: `{kind, conceptRefs, difficultyHint}` -> `{text, hint?}`
//! - evaluator: `{question, answer, difficultyHint}` -> `{score, feedback}`

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::collaborators::{AnswerEvaluator, EvaluationRequest, QuestionGenerator, QuestionRequest};
use crate::error::{CollaboratorErrorKind, Result, SocraticError};
use crate::question::{Evaluation, GeneratedQuestion};

fn build_client(timeout: Duration) -> Result<Client> {
    Client::builder().timeout(timeout).build().map_err(|e| {
        SocraticError::config_validation(
            format!("failed to build HTTP client: {e}"),
            "Check the TLS setup of this machine",
        )
    })
}

fn classify_reqwest_error(e: &reqwest::Error) -> CollaboratorErrorKind {
    if e.is_timeout() {
        CollaboratorErrorKind::Timeout
    } else if e.is_connect() || e.is_status() || e.is_request() {
        CollaboratorErrorKind::Unavailable
    } else if e.is_decode() || e.is_body() {
        CollaboratorErrorKind::Malformed
    } else {
        CollaboratorErrorKind::Other
    }
}

/// Posts `body` to `url` and decodes the JSON reply.
async fn post_json<B, R>(client: &Client, url: &str, body: &B) -> std::result::Result<R, (CollaboratorErrorKind, String)>
where
    B: Serialize + Sync,
    R: DeserializeOwned,
{
    let response = client
        .post(url)
        .json(body)
        .send()
        .await
        .map_err(|e| (classify_reqwest_error(&e), format!("POST {url} failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        return Err((
            CollaboratorErrorKind::Unavailable,
            format!("POST {url} returned {status}"),
        ));
    }

    response.json::<R>().await.map_err(|e| {
        let kind = if e.is_timeout() {
            CollaboratorErrorKind::Timeout
        } else {
            CollaboratorErrorKind::Malformed
        };
        (kind, format!("invalid reply from {url}: {e}"))
    })
}

/// Question generator backed by an HTTP endpoint.
#[derive(Debug, Clone)]
pub struct RemoteQuestionGenerator {
    client: Client,
    url: String,
}

impl RemoteQuestionGenerator {
    /// Creates a generator posting to `url`, giving up after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: build_client(timeout)?,
            url: url.into(),
        })
    }
}

#[async_trait]
impl QuestionGenerator for RemoteQuestionGenerator {
    async fn generate_question(&self, request: &QuestionRequest) -> Result<GeneratedQuestion> {
        let generated: GeneratedQuestion = post_json(&self.client, &self.url, request)
            .await
            .map_err(|(kind, message)| SocraticError::generation(kind, message))?;

        if generated.text.trim().is_empty() {
            return Err(SocraticError::generation(
                CollaboratorErrorKind::Malformed,
                format!("{} returned an empty question", self.url),
            ));
        }
        Ok(generated)
    }
}

/// Answer evaluator backed by an HTTP endpoint.
#[derive(Debug, Clone)]
pub struct RemoteAnswerEvaluator {
    client: Client,
    url: String,
}

impl RemoteAnswerEvaluator {
    /// Creates an evaluator posting to `url`, giving up after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: build_client(timeout)?,
            url: url.into(),
        })
    }
}

#[async_trait]
impl AnswerEvaluator for RemoteAnswerEvaluator {
    async fn evaluate_answer(&self, request: &EvaluationRequest) -> Result<Evaluation> {
        let evaluation: Evaluation = post_json(&self.client, &self.url, request)
            .await
            .map_err(|(kind, message)| SocraticError::evaluation(kind, message))?;

        if !evaluation.score.is_finite() {
            return Err(SocraticError::evaluation(
                CollaboratorErrorKind::Malformed,
                format!("{} returned a non-numeric score", self.url),
            ));
        }
        Ok(evaluation)
    }
}
