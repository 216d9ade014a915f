//! The Socratic questioning state machine.
//!
//! [`SocraticEngine`] is stateless apart from its collaborators and
//! configuration: every entry point takes the session's
//! [`SessionQuestioningState`] by mutable reference, advances it, and returns
//! a [`Step`] describing the messages to deliver and how the caller should
//! adjust the session's timer. The session actor in [`crate::session`] owns
//! the state and the timer.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::classifier::{ClassificationContext, KeywordClassifier, MessageClassifier, MessageIntent};
use crate::collaborators::{AnswerEvaluator, EvaluationRequest, QuestionGenerator, QuestionRequest};
use crate::config::{Config, RequestionPolicy};
use crate::error::{CollaboratorErrorKind, Result, SocraticError};
use crate::ledger::normalize_concept_name;
use crate::message::{OutboundMessage, TeachingDirective};
use crate::question::{Evaluation, GeneratedQuestion, Question, QuestionKind};
use crate::state::{EngineState, SessionQuestioningState};

const NEUTRAL_FEEDBACK: &str = "Thanks for your answer! Let's keep going.";
const SKIP_ACKNOWLEDGEMENT: &str = "No problem, we'll skip that one for now.";

// ============================================================================
// Step and timers
// ============================================================================

/// Which timer phase a deadline belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerPhase {
    /// Silence after a question; fires the gentle prompt.
    AnswerTimeout,
    /// Silence after the gentle prompt; fires the hint.
    HintDelay,
}

impl std::fmt::Display for TimerPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AnswerTimeout => write!(f, "answer_timeout"),
            Self::HintDelay => write!(f, "hint_delay"),
        }
    }
}

/// A deadline the session must arm, tagged with the question it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timer {
    /// Question the timer belongs to.
    pub question_id: String,
    /// What firing the timer means.
    pub phase: TimerPhase,
    /// Delay from now.
    pub after: Duration,
}

/// How the caller should change the session's timer after a step.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TimerDirective {
    /// Keep whatever timer is armed.
    #[default]
    Unchanged,
    /// Cancel the armed timer.
    Clear,
    /// Replace the armed timer.
    Arm(Timer),
}

/// Outcome of one engine entry point.
#[derive(Debug, Clone, Default)]
pub struct Step {
    /// Messages for the student-facing channel, in delivery order.
    pub messages: Vec<OutboundMessage>,
    /// The student's message was handled by the engine and should not be
    /// passed through to normal teaching.
    pub consumed: bool,
    /// Timer change requested by the engine.
    pub timer: TimerDirective,
}

impl Step {
    /// Returns the first outbound message, if any.
    #[must_use]
    pub fn first_message(&self) -> Option<&OutboundMessage> {
        self.messages.first()
    }
}

/// Result of scoring one answer.
#[derive(Debug, Clone, Copy)]
enum Grade {
    Pass,
    Partial,
    Fail,
}

// ============================================================================
// SocraticEngine
// ============================================================================

/// Decides when to question the student and how to react to replies.
#[derive(Clone)]
pub struct SocraticEngine {
    config: Config,
    generator: Arc<dyn QuestionGenerator>,
    evaluator: Arc<dyn AnswerEvaluator>,
    classifier: Arc<dyn MessageClassifier>,
}

impl std::fmt::Debug for SocraticEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SocraticEngine")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SocraticEngine {
    /// Creates an engine using the default keyword classifier.
    #[must_use]
    pub fn new(
        config: Config,
        generator: Arc<dyn QuestionGenerator>,
        evaluator: Arc<dyn AnswerEvaluator>,
    ) -> Self {
        Self {
            config,
            generator,
            evaluator,
            classifier: Arc::new(KeywordClassifier::new()),
        }
    }

    /// Replaces the message classifier.
    #[must_use]
    pub fn with_classifier(mut self, classifier: Arc<dyn MessageClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    /// Returns the engine configuration.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Handles one teaching turn that introduced `names`.
    ///
    /// Only the most recent eligible concept of the turn is questioned
    /// immediately; the others are marked pending. If a question is already
    /// outstanding every eligible concept is queued until the engine is idle.
    pub async fn concepts_taught(
        &self,
        state: &mut SessionQuestioningState,
        names: &[String],
    ) -> Step {
        let mut step = Step::default();
        if let Err(e) = self.handle_concepts_taught(state, names, &mut step).await {
            self.recover(state, &e, &mut step);
        }
        step
    }

    /// Handles a free-text message from the student.
    ///
    /// While a question is pending the message is an answer, a skip, a
    /// "don't know", or an unrelated question. While idle only an
    /// understanding claim is acted on; anything else passes through.
    pub async fn student_message(&self, state: &mut SessionQuestioningState, text: &str) -> Step {
        let mut step = Step::default();
        if let Err(e) = self.handle_student_message(state, text, &mut step).await {
            self.recover(state, &e, &mut step);
        }
        step
    }

    /// Handles an elapsed timer. Timers for a question that is no longer
    /// active, or for a phase the session has left, are ignored.
    pub fn timer_elapsed(
        &self,
        state: &mut SessionQuestioningState,
        phase: TimerPhase,
        question_id: &str,
    ) -> Step {
        let mut step = Step::default();
        if let Err(e) = self.handle_timer(state, phase, question_id, &mut step) {
            self.recover(state, &e, &mut step);
        }
        step
    }

    // ------------------------------------------------------------------------
    // Concept taught
    // ------------------------------------------------------------------------

    async fn handle_concepts_taught(
        &self,
        state: &mut SessionQuestioningState,
        names: &[String],
        step: &mut Step,
    ) -> Result<()> {
        let mut eligible = Vec::new();

        for name in names {
            let taught = match state.ledger.record_taught(name) {
                Ok(taught) => taught,
                Err(e @ SocraticError::InvalidConceptName { .. }) => {
                    warn!(session_id = %state.session_id, error = %e, "Ignoring concept");
                    continue;
                }
                Err(e) => return Err(e),
            };
            let record = taught.record;

            let in_active_question = state.active_question.as_ref().is_some_and(|q| {
                q.concept_refs
                    .iter()
                    .any(|r| normalize_concept_name(r) == normalize_concept_name(&record.name))
            });

            if !taught.first_time
                && record.questioned
                && record.understood == Some(false)
                && !record.weak
                && !in_active_question
                && self.config.requestion_policy == RequestionPolicy::AfterReteach
            {
                state.ledger.reset_for_reteach(&record.name)?;
                info!(
                    session_id = %state.session_id,
                    concept = %record.name,
                    "Concept re-taught after a failed answer; questioning reopened"
                );
            }

            let awaiting = state
                .ledger
                .get(&record.name)
                .is_some_and(|r| r.is_awaiting_question());
            if awaiting && !in_active_question {
                eligible.push(record.name);
            } else {
                debug!(
                    session_id = %state.session_id,
                    concept = %record.name,
                    "Concept already questioned; no question"
                );
            }
        }

        if state.state == EngineState::Idle {
            let mut candidates = std::mem::take(&mut state.pending_concepts);
            for name in eligible {
                let key = normalize_concept_name(&name);
                candidates.retain(|existing| normalize_concept_name(existing) != key);
                candidates.push(name);
            }
            self.ask_for_turn(state, candidates, step).await
        } else {
            for name in eligible {
                state.ledger.mark_pending(&name, true)?;
                state.queue_pending(&name);
                info!(
                    session_id = %state.session_id,
                    concept = %name,
                    "Question outstanding; concept queued"
                );
            }
            Ok(())
        }
    }

    fn fold_into_checkpoint(&self, state: &mut SessionQuestioningState, name: &str) -> Result<()> {
        state.ledger.mark_pending(name, true)?;
        state.fold_into_checkpoint(name);
        debug!(
            session_id = %state.session_id,
            concept = %name,
            "Concept held for the next checkpoint"
        );
        Ok(())
    }

    /// Questions one teaching turn's worth of candidate concepts, oldest first.
    ///
    /// Only the newest candidate is asked about; the others wait for the next
    /// checkpoint quiz.
    async fn ask_for_turn(
        &self,
        state: &mut SessionQuestioningState,
        candidates: Vec<String>,
        step: &mut Step,
    ) -> Result<()> {
        let candidates: Vec<String> = candidates
            .into_iter()
            .filter(|name| {
                state
                    .ledger
                    .get(name)
                    .is_some_and(|r| r.is_awaiting_question())
            })
            .collect();

        let Some((newest, rest)) = candidates.split_last() else {
            return Ok(());
        };
        for name in rest {
            self.fold_into_checkpoint(state, name)?;
        }

        if self.checkpoint_due(state) {
            self.fold_into_checkpoint(state, newest)?;
            state.transition(EngineState::CheckpointQuiz)?;
            self.log_transition(state, EngineState::Idle);
            return self.run_checkpoint(state, step).await;
        }

        self.ask(state, QuestionKind::Comprehension, vec![newest.clone()], step)
            .await
    }

    // ------------------------------------------------------------------------
    // Student message
    // ------------------------------------------------------------------------

    async fn handle_student_message(
        &self,
        state: &mut SessionQuestioningState,
        text: &str,
        step: &mut Step,
    ) -> Result<()> {
        let refs = state
            .active_question
            .as_ref()
            .map(|q| q.concept_refs.clone())
            .unwrap_or_default();
        let context = ClassificationContext {
            question_pending: state.is_question_pending(),
            concept_refs: &refs,
        };
        let intent = self.classifier.classify(text, &context);

        if !state.is_question_pending() {
            if intent == MessageIntent::ClaimUnderstanding {
                self.verify_claim(state, step).await?;
                step.consumed = !step.messages.is_empty();
            }
            return Ok(());
        }

        let Some(question) = state.active_question.clone() else {
            return Err(SocraticError::invalid_transition(
                state.state,
                EngineState::Evaluating,
            ));
        };

        match intent {
            MessageIntent::Skip => {
                step.consumed = true;
                self.skip(state, &question, step)
            }
            MessageIntent::NewQuestion => {
                info!(
                    session_id = %state.session_id,
                    question_id = %question.id,
                    "Unrelated question while a question is pending; reminding"
                );
                step.messages.push(OutboundMessage::reminder(
                    &question,
                    format!(
                        "Good question! Once that's answered, this one is still waiting for you: {}",
                        question.text
                    ),
                ));
                Ok(())
            }
            MessageIntent::DontKnow => {
                step.consumed = true;
                state.transition(EngineState::Evaluating)?;
                let evaluation = Evaluation::new(
                    0.0,
                    format!(
                        "That's okay, not knowing yet is part of learning. Let's go over {} again.",
                        question.concept_list()
                    ),
                );
                self.resolve(state, &question, text, Some(evaluation), step)
                    .await
            }
            MessageIntent::Answer | MessageIntent::ClaimUnderstanding => {
                step.consumed = true;
                state.transition(EngineState::Evaluating)?;
                let evaluation = match self.evaluate(state, &question, text).await {
                    Ok(evaluation) => Some(evaluation),
                    Err(e) => {
                        warn!(
                            session_id = %state.session_id,
                            question_id = %question.id,
                            error = %e,
                            "Answer evaluation failed; sending neutral feedback"
                        );
                        None
                    }
                };
                self.resolve(state, &question, text, evaluation, step).await
            }
        }
    }

    fn skip(
        &self,
        state: &mut SessionQuestioningState,
        question: &Question,
        step: &mut Step,
    ) -> Result<()> {
        for name in &question.concept_refs {
            state.ledger.mark_skipped(name)?;
        }
        let from = state.state;
        state.transition(EngineState::Idle)?;
        state.active_question = None;
        self.log_transition(state, from);

        step.messages
            .push(OutboundMessage::acknowledgement(question, SKIP_ACKNOWLEDGEMENT));
        step.timer = TimerDirective::Clear;
        Ok(())
    }

    async fn verify_claim(&self, state: &mut SessionQuestioningState, step: &mut Step) -> Result<()> {
        let Some(record) = state.ledger.most_recent().cloned() else {
            debug!(session_id = %state.session_id, "Understanding claim before any teaching");
            return Ok(());
        };
        if record.weak || record.verified {
            debug!(
                session_id = %state.session_id,
                concept = %record.name,
                "Concept is not probed again"
            );
            return Ok(());
        }
        self.ask(state, QuestionKind::Verification, vec![record.name], step)
            .await
    }

    /// Applies an evaluation (or its absence) to the ledger and delivers feedback.
    async fn resolve(
        &self,
        state: &mut SessionQuestioningState,
        question: &Question,
        answer: &str,
        evaluation: Option<Evaluation>,
        step: &mut Step,
    ) -> Result<()> {
        state.transition(EngineState::Feedback)?;
        state.active_question = None;
        step.timer = TimerDirective::Clear;

        let Some(evaluation) = evaluation else {
            for name in &question.concept_refs {
                state.ledger.record_unscored_answer(name, answer)?;
            }
            step.messages
                .push(OutboundMessage::feedback(question, NEUTRAL_FEEDBACK, None));
            return self.after_feedback(state, step).await;
        };

        let score = evaluation.score.clamp(0.0, 1.0);
        let grade = if score >= self.config.pass_threshold {
            Grade::Pass
        } else if score >= self.config.partial_threshold {
            Grade::Partial
        } else {
            Grade::Fail
        };

        let mut directive = None;
        for name in &question.concept_refs {
            match grade {
                Grade::Pass => {
                    state
                        .ledger
                        .mark_answered(name, answer, Some(true), Some(score))?;
                    if question.kind == QuestionKind::Verification {
                        state.ledger.mark_verified(name)?;
                    }
                }
                Grade::Partial => {
                    state.ledger.mark_answered(name, answer, None, Some(score))?;
                }
                Grade::Fail => {
                    state
                        .ledger
                        .mark_answered(name, answer, Some(false), Some(score))?;
                    let attempts = state.ledger.record_failure(name)?;
                    if attempts >= self.config.max_verification_attempts {
                        state.ledger.mark_weak(name)?;
                        warn!(
                            session_id = %state.session_id,
                            concept = %name,
                            attempts,
                            "Concept recorded as a weak area; no further automatic questions"
                        );
                        if question.kind != QuestionKind::Checkpoint {
                            directive = Some(TeachingDirective::WeakArea {
                                concept: name.clone(),
                            });
                        }
                    } else if question.kind != QuestionKind::Checkpoint {
                        directive = Some(TeachingDirective::Reexplain {
                            concept: name.clone(),
                        });
                    }
                }
            }
        }

        let text = if evaluation.feedback.trim().is_empty() {
            match grade {
                Grade::Pass => "Great job! You've got it.".to_string(),
                Grade::Partial => "You're on the right track. Let's build on that.".to_string(),
                Grade::Fail => format!("Not quite. Let's look at {} again.", question.concept_list()),
            }
        } else {
            evaluation.feedback
        };

        info!(
            session_id = %state.session_id,
            question_id = %question.id,
            kind = %question.kind,
            score,
            "Answer evaluated"
        );
        step.messages
            .push(OutboundMessage::feedback(question, text, Some(score)).with_directive(directive));

        match grade {
            Grade::Pass | Grade::Partial => self.after_feedback(state, step).await,
            Grade::Fail => {
                // Re-explanation comes first; nothing else is asked right away
                state.transition(EngineState::Idle)?;
                self.log_transition(state, EngineState::Feedback);
                Ok(())
            }
        }
    }

    /// Leaves `Feedback`: fires a due checkpoint, or returns to `Idle` and
    /// questions concepts that were queued while the question was pending.
    async fn after_feedback(&self, state: &mut SessionQuestioningState, step: &mut Step) -> Result<()> {
        if self.checkpoint_due(state) {
            state.transition(EngineState::CheckpointQuiz)?;
            self.log_transition(state, EngineState::Feedback);
            return self.run_checkpoint(state, step).await;
        }

        state.transition(EngineState::Idle)?;
        self.log_transition(state, EngineState::Feedback);

        let queued = std::mem::take(&mut state.pending_concepts);
        self.ask_for_turn(state, queued, step).await
    }

    // ------------------------------------------------------------------------
    // Questions
    // ------------------------------------------------------------------------

    /// Concepts for the next checkpoint in teaching order: held-back concepts
    /// first, topped up with the most recently taught ones. Weak areas are
    /// never included.
    fn checkpoint_refs(&self, state: &SessionQuestioningState) -> Vec<String> {
        let taught = state.ledger.recent(state.ledger.len());
        let mut chosen: Vec<String> = Vec::new();
        for name in state.checkpoint_backlog.iter().chain(taught.iter().rev()) {
            if chosen.len() >= self.config.checkpoint_size {
                break;
            }
            let key = normalize_concept_name(name);
            let eligible = state.ledger.get(name).is_some_and(|r| !r.weak);
            if eligible && !chosen.contains(&key) {
                chosen.push(key);
            }
        }
        taught
            .into_iter()
            .filter(|name| chosen.contains(&normalize_concept_name(name)))
            .collect()
    }

    fn checkpoint_due(&self, state: &SessionQuestioningState) -> bool {
        state.concepts_since_checkpoint >= self.config.checkpoint_interval
            && self.checkpoint_refs(state).len() >= 2
    }

    /// Generates and injects a checkpoint quiz. Must be called in `CheckpointQuiz`.
    async fn run_checkpoint(&self, state: &mut SessionQuestioningState, step: &mut Step) -> Result<()> {
        let refs = self.checkpoint_refs(state);
        self.ask(state, QuestionKind::Checkpoint, refs, step).await
    }

    /// Generates a question and injects it.
    ///
    /// Comprehension and verification questions are asked from `Idle`;
    /// checkpoint quizzes from `CheckpointQuiz`. On generator failure no
    /// question is asked and the engine returns to (or stays in) `Idle`.
    async fn ask(
        &self,
        state: &mut SessionQuestioningState,
        kind: QuestionKind,
        concept_refs: Vec<String>,
        step: &mut Step,
    ) -> Result<()> {
        let request = QuestionRequest {
            kind,
            concept_refs,
            difficulty_hint: state.difficulty,
        };

        let generated = match self.generate(&request).await {
            Ok(generated) => generated,
            Err(e) => {
                warn!(
                    session_id = %state.session_id,
                    kind = %kind,
                    concepts = ?request.concept_refs,
                    error = %e,
                    "Question generation failed; no question asked"
                );
                if state.state == EngineState::CheckpointQuiz {
                    state.concepts_since_checkpoint = 0;
                    state.transition(EngineState::Idle)?;
                    self.log_transition(state, EngineState::CheckpointQuiz);
                }
                return Ok(());
            }
        };

        let question = Question::new(
            kind,
            generated,
            request.concept_refs,
            self.config.answer_timeout(),
        );
        for name in &question.concept_refs {
            state.ledger.mark_questioned(name, &question)?;
        }

        if kind != QuestionKind::Checkpoint {
            state.transition(EngineState::QuestionGenerated)?;
            self.log_transition(state, EngineState::Idle);
        }
        let from = state.state;
        state.transition(EngineState::WaitingForAnswer)?;
        self.log_transition(state, from);

        match kind {
            QuestionKind::Comprehension => state.concepts_since_checkpoint += 1,
            QuestionKind::Checkpoint => {
                state.concepts_since_checkpoint = 0;
                state.checkpoints_fired += 1;
            }
            QuestionKind::Verification => {}
        }
        state.forget_queued(&question.concept_refs);
        state.questions_asked += 1;

        info!(
            session_id = %state.session_id,
            question_id = %question.id,
            kind = %kind,
            concepts = ?question.concept_refs,
            "Question injected"
        );

        step.messages.push(OutboundMessage::question(
            &question,
            self.config.answer_timeout_seconds,
        ));
        step.timer = TimerDirective::Arm(Timer {
            question_id: question.id.clone(),
            phase: TimerPhase::AnswerTimeout,
            after: self.config.answer_timeout(),
        });
        state.active_question = Some(question);
        Ok(())
    }

    async fn generate(&self, request: &QuestionRequest) -> Result<GeneratedQuestion> {
        let timeout = self.config.call_timeout();
        let generated = tokio::time::timeout(timeout, self.generator.generate_question(request))
            .await
            .map_err(|_| {
                SocraticError::generation(
                    CollaboratorErrorKind::Timeout,
                    format!("no question within {}s", timeout.as_secs()),
                )
            })??;

        if generated.text.trim().is_empty() {
            return Err(SocraticError::generation(
                CollaboratorErrorKind::Malformed,
                "generator returned an empty question",
            ));
        }
        Ok(generated)
    }

    async fn evaluate(
        &self,
        state: &SessionQuestioningState,
        question: &Question,
        answer: &str,
    ) -> Result<Evaluation> {
        let request = EvaluationRequest {
            question: question.text.clone(),
            answer: answer.to_string(),
            difficulty_hint: state.difficulty,
        };
        let timeout = self.config.call_timeout();
        let evaluation = tokio::time::timeout(timeout, self.evaluator.evaluate_answer(&request))
            .await
            .map_err(|_| {
                SocraticError::evaluation(
                    CollaboratorErrorKind::Timeout,
                    format!("no evaluation within {}s", timeout.as_secs()),
                )
            })??;

        if evaluation.score.is_nan() {
            return Err(SocraticError::evaluation(
                CollaboratorErrorKind::Malformed,
                "evaluator returned a NaN score",
            ));
        }
        Ok(evaluation)
    }

    // ------------------------------------------------------------------------
    // Timers
    // ------------------------------------------------------------------------

    fn handle_timer(
        &self,
        state: &mut SessionQuestioningState,
        phase: TimerPhase,
        question_id: &str,
        step: &mut Step,
    ) -> Result<()> {
        let Some(question) = state
            .active_question
            .clone()
            .filter(|q| q.id == question_id)
        else {
            debug!(
                session_id = %state.session_id,
                question_id,
                phase = %phase,
                "Ignoring timer for a question that is no longer active"
            );
            return Ok(());
        };

        match (phase, state.state) {
            (TimerPhase::AnswerTimeout, EngineState::WaitingForAnswer) => {
                state.transition(EngineState::Timeout)?;
                self.log_transition(state, EngineState::WaitingForAnswer);
                step.messages.push(OutboundMessage::reminder(
                    &question,
                    format!(
                        "Take your time. When you're ready, tell me what you think about {}.",
                        question.concept_list()
                    ),
                ));
                step.timer = TimerDirective::Arm(Timer {
                    question_id: question.id.clone(),
                    phase: TimerPhase::HintDelay,
                    after: self.config.hint_delay(),
                });
            }
            (TimerPhase::HintDelay, EngineState::Timeout) => {
                state.transition(EngineState::Hint)?;
                self.log_transition(state, EngineState::Timeout);
                let hint = question.hint.clone().unwrap_or_else(|| {
                    format!(
                        "Here's a hint: think about what {} lets you do in the example we just went through.",
                        question.concept_list()
                    )
                });
                step.messages.push(OutboundMessage::hint(&question, hint));
                state.transition(EngineState::WaitingForAnswer)?;
                self.log_transition(state, EngineState::Hint);
                step.timer = TimerDirective::Clear;
            }
            (phase, current) => {
                debug!(
                    session_id = %state.session_id,
                    question_id,
                    phase = %phase,
                    state = %current,
                    "Ignoring timer for a phase the session has left"
                );
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------------

    fn log_transition(&self, state: &SessionQuestioningState, from: EngineState) {
        info!(
            session_id = %state.session_id,
            from = %from,
            to = %state.state,
            "State transition"
        );
    }

    fn recover(&self, state: &mut SessionQuestioningState, err: &SocraticError, step: &mut Step) {
        error!(
            session_id = %state.session_id,
            state = %state.state,
            error = %err,
            "Questioning bookkeeping failed; returning to idle"
        );
        state.force_idle();
        step.timer = TimerDirective::Clear;
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::config::DifficultyLevel;
    use crate::message::OutboundKind;

    /// Generator that records requests and answers from a script.
    #[derive(Default)]
    struct ScriptedGenerator {
        failures: Mutex<VecDeque<bool>>,
        requests: Mutex<Vec<QuestionRequest>>,
    }

    impl ScriptedGenerator {
        fn fail_next(&self) {
            self.failures.lock().unwrap().push_back(true);
        }

        fn requests(&self) -> Vec<QuestionRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl QuestionGenerator for ScriptedGenerator {
        async fn generate_question(&self, request: &QuestionRequest) -> Result<GeneratedQuestion> {
            self.requests.lock().unwrap().push(request.clone());
            if self.failures.lock().unwrap().pop_front().unwrap_or(false) {
                return Err(SocraticError::generation(
                    CollaboratorErrorKind::Unavailable,
                    "scripted failure",
                ));
            }
            Ok(GeneratedQuestion::new(format!(
                "{} question about {}",
                request.kind,
                request.concept_refs.join(", ")
            )))
        }
    }

    /// Evaluator that returns queued scores; an empty queue means failure.
    #[derive(Default)]
    struct ScriptedEvaluator {
        scores: Mutex<VecDeque<f64>>,
        calls: Mutex<u32>,
    }

    impl ScriptedEvaluator {
        fn with_scores(scores: &[f64]) -> Self {
            Self {
                scores: Mutex::new(scores.iter().copied().collect()),
                calls: Mutex::new(0),
            }
        }

        fn calls(&self) -> u32 {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl AnswerEvaluator for ScriptedEvaluator {
        async fn evaluate_answer(&self, _request: &EvaluationRequest) -> Result<Evaluation> {
            *self.calls.lock().unwrap() += 1;
            match self.scores.lock().unwrap().pop_front() {
                Some(score) => Ok(Evaluation::new(score, "")),
                None => Err(SocraticError::evaluation(
                    CollaboratorErrorKind::Unavailable,
                    "scripted failure",
                )),
            }
        }
    }

    struct Harness {
        engine: SocraticEngine,
        generator: Arc<ScriptedGenerator>,
        evaluator: Arc<ScriptedEvaluator>,
        state: SessionQuestioningState,
    }

    fn harness_with(config: Config, scores: &[f64]) -> Harness {
        let generator = Arc::new(ScriptedGenerator::default());
        let evaluator = Arc::new(ScriptedEvaluator::with_scores(scores));
        let engine = SocraticEngine::new(config, generator.clone(), evaluator.clone());
        Harness {
            engine,
            generator,
            evaluator,
            state: SessionQuestioningState::new("test-session", DifficultyLevel::Beginner, 50),
        }
    }

    fn harness(scores: &[f64]) -> Harness {
        harness_with(Config::default(), scores)
    }

    impl Harness {
        async fn teach(&mut self, names: &[&str]) -> Step {
            let names: Vec<String> = names.iter().map(ToString::to_string).collect();
            self.engine.concepts_taught(&mut self.state, &names).await
        }

        async fn say(&mut self, text: &str) -> Step {
            self.engine.student_message(&mut self.state, text).await
        }

        fn fire(&mut self, phase: TimerPhase) -> Step {
            let id = self.state.active_question.as_ref().unwrap().id.clone();
            self.engine.timer_elapsed(&mut self.state, phase, &id)
        }
    }

    #[tokio::test]
    async fn test_teaching_a_concept_asks_one_question() {
        let mut h = harness(&[]);
        let step = h.teach(&["arrays"]).await;

        assert_eq!(step.messages.len(), 1);
        let message = &step.messages[0];
        assert_eq!(message.kind, OutboundKind::Question);
        assert_eq!(message.concept_refs, vec!["arrays"]);
        assert_eq!(message.timeout_seconds, Some(120));

        assert_eq!(h.state.state, EngineState::WaitingForAnswer);
        assert_eq!(h.state.concepts_since_checkpoint, 1);
        assert!(h.state.ledger.get("arrays").unwrap().questioned);
        assert!(matches!(
            step.timer,
            TimerDirective::Arm(Timer { phase: TimerPhase::AnswerTimeout, .. })
        ));
    }

    #[tokio::test]
    async fn test_passing_answer() {
        let mut h = harness(&[0.85]);
        h.teach(&["arrays"]).await;
        let step = h.say("An ordered collection of values").await;

        assert!(step.consumed);
        assert_eq!(step.messages.len(), 1);
        assert_eq!(step.messages[0].kind, OutboundKind::Feedback);
        assert_eq!(step.messages[0].score, Some(0.85));
        assert!(step.messages[0].directive.is_none());
        assert_eq!(step.timer, TimerDirective::Clear);

        let record = h.state.ledger.get("arrays").unwrap();
        assert_eq!(record.understood, Some(true));
        assert_eq!(
            record.student_answer.as_deref(),
            Some("An ordered collection of values")
        );
        assert_eq!(h.state.state, EngineState::Idle);
        assert!(h.state.active_question.is_none());
    }

    #[tokio::test]
    async fn test_partial_answer_leaves_understanding_unknown() {
        let mut h = harness(&[0.6]);
        h.teach(&["loops"]).await;
        h.say("They repeat things").await;

        let record = h.state.ledger.get("loops").unwrap();
        assert!(record.understood.is_none());
        assert_eq!(record.score, Some(0.6));
        assert_eq!(record.verification_attempts, 0);
    }

    #[tokio::test]
    async fn test_failing_answer_requests_reexplanation() {
        let mut h = harness(&[0.2]);
        h.teach(&["recursion"]).await;
        let step = h.say("It loops forever").await;

        assert_eq!(
            step.messages[0].directive,
            Some(TeachingDirective::Reexplain {
                concept: "recursion".to_string()
            })
        );
        let record = h.state.ledger.get("recursion").unwrap();
        assert_eq!(record.understood, Some(false));
        assert_eq!(record.verification_attempts, 1);
        assert_eq!(h.state.state, EngineState::Idle);
        // No immediate re-ask
        assert_eq!(step.messages.len(), 1);
    }

    #[tokio::test]
    async fn test_scores_are_clamped() {
        let mut h = harness(&[1.7]);
        h.teach(&["sets"]).await;
        let step = h.say("Unique items").await;
        assert_eq!(step.messages[0].score, Some(1.0));
    }

    #[tokio::test]
    async fn test_reteach_of_understood_concept_is_noop() {
        let mut h = harness(&[0.9]);
        h.teach(&["arrays"]).await;
        h.say("answer").await;

        let step = h.teach(&["Arrays "]).await;
        assert!(step.messages.is_empty());
        assert_eq!(h.state.ledger.len(), 1);
        assert_eq!(h.generator.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_only_newest_concept_of_a_turn_is_questioned() {
        let mut h = harness(&[]);
        let step = h.teach(&["variables", "assignment", "data types"]).await;

        assert_eq!(step.messages.len(), 1);
        assert_eq!(step.messages[0].concept_refs, vec!["data types"]);
        assert!(h.state.ledger.get("variables").unwrap().pending);
        assert!(h.state.ledger.get("assignment").unwrap().pending);
        assert!(!h.state.ledger.get("variables").unwrap().questioned);
        assert_eq!(h.state.checkpoint_backlog, vec!["variables", "assignment"]);
        assert!(h.state.pending_concepts.is_empty());
    }

    #[tokio::test]
    async fn test_rest_of_turn_is_folded_into_next_checkpoint() {
        let mut h = harness(&[0.9, 0.9, 0.9]);
        h.teach(&["variables", "assignment", "data types"]).await;
        h.say("a value's kind").await;
        // Held-back concepts are not asked one by one
        assert_eq!(h.generator.requests().len(), 1);

        for concept in ["loops", "functions"] {
            h.teach(&[concept]).await;
            h.say("a good answer").await;
        }

        let question = h.state.active_question.as_ref().unwrap();
        assert_eq!(question.kind, QuestionKind::Checkpoint);
        assert_eq!(question.concept_refs, vec!["variables", "assignment", "functions"]);
        for concept in ["variables", "assignment"] {
            let record = h.state.ledger.get(concept).unwrap();
            assert!(record.questioned);
            assert!(!record.pending);
        }
        assert!(h.state.checkpoint_backlog.is_empty());
    }

    #[tokio::test]
    async fn test_concepts_taught_while_pending_are_queued_then_asked() {
        let mut h = harness(&[0.9]);
        h.teach(&["arrays"]).await;

        let step = h.teach(&["loops"]).await;
        assert!(step.messages.is_empty());
        assert_eq!(h.state.pending_concepts, vec!["loops"]);
        assert!(h.state.ledger.get("loops").unwrap().pending);

        let step = h.say("ordered values").await;
        assert_eq!(step.messages.len(), 2);
        assert_eq!(step.messages[0].kind, OutboundKind::Feedback);
        assert_eq!(step.messages[1].kind, OutboundKind::Question);
        assert_eq!(step.messages[1].concept_refs, vec!["loops"]);
        assert!(h.state.pending_concepts.is_empty());
        assert!(matches!(step.timer, TimerDirective::Arm(_)));
    }

    #[tokio::test]
    async fn test_checkpoint_fires_after_three_comprehension_questions() {
        let mut h = harness(&[0.8, 0.8, 0.8]);
        for concept in ["arrays", "loops", "functions"] {
            h.teach(&[concept]).await;
            h.say("a good answer").await;
        }

        let question = h.state.active_question.as_ref().unwrap();
        assert_eq!(question.kind, QuestionKind::Checkpoint);
        assert_eq!(question.concept_refs, vec!["arrays", "loops", "functions"]);
        assert_eq!(h.state.concepts_since_checkpoint, 0);
        assert_eq!(h.state.checkpoints_fired, 1);
        assert!(h
            .state
            .history
            .iter()
            .any(|t| t.from == EngineState::Feedback && t.to == EngineState::CheckpointQuiz));
    }

    #[tokio::test]
    async fn test_checkpoint_does_not_count_toward_next_checkpoint() {
        let mut h = harness(&[0.8, 0.8, 0.8, 0.9]);
        for concept in ["arrays", "loops", "functions"] {
            h.teach(&[concept]).await;
            h.say("a good answer").await;
        }
        h.say("checkpoint answer").await;

        assert_eq!(h.state.state, EngineState::Idle);
        assert_eq!(h.state.concepts_since_checkpoint, 0);
        for concept in ["arrays", "loops", "functions"] {
            assert_eq!(h.state.ledger.get(concept).unwrap().understood, Some(true));
        }
    }

    #[tokio::test]
    async fn test_failed_checkpoint_counts_attempt_per_concept() {
        let mut h = harness(&[0.8, 0.8, 0.8, 0.1]);
        for concept in ["arrays", "loops", "functions"] {
            h.teach(&[concept]).await;
            h.say("a good answer").await;
        }
        let step = h.say("no clue what these are, honestly").await;

        assert!(step.messages[0].directive.is_none());
        for concept in ["arrays", "loops", "functions"] {
            let record = h.state.ledger.get(concept).unwrap();
            assert_eq!(record.understood, Some(false));
            assert_eq!(record.verification_attempts, 1);
        }
    }

    #[tokio::test]
    async fn test_checkpoint_generation_failure_resets_counter() {
        let mut h = harness(&[0.8, 0.8, 0.8]);
        for concept in ["arrays", "loops"] {
            h.teach(&[concept]).await;
            h.say("a good answer").await;
        }
        h.teach(&["functions"]).await;
        h.generator.fail_next();
        let step = h.say("a good answer").await;

        assert_eq!(step.messages.len(), 1);
        assert_eq!(h.state.state, EngineState::Idle);
        assert_eq!(h.state.concepts_since_checkpoint, 0);
        assert_eq!(h.state.checkpoints_fired, 0);
    }

    #[tokio::test]
    async fn test_generation_failure_stays_idle() {
        let mut h = harness(&[]);
        h.generator.fail_next();
        let step = h.teach(&["arrays"]).await;

        assert!(step.messages.is_empty());
        assert_eq!(h.state.state, EngineState::Idle);
        assert!(!h.state.ledger.get("arrays").unwrap().questioned);
        assert_eq!(h.state.concepts_since_checkpoint, 0);
    }

    #[tokio::test]
    async fn test_evaluation_failure_sends_neutral_feedback() {
        let mut h = harness(&[]);
        h.teach(&["arrays"]).await;
        let step = h.say("They hold values").await;

        assert_eq!(step.messages[0].kind, OutboundKind::Feedback);
        assert_eq!(step.messages[0].text, NEUTRAL_FEEDBACK);
        assert!(step.messages[0].score.is_none());

        let record = h.state.ledger.get("arrays").unwrap();
        assert!(record.understood.is_none());
        assert_eq!(record.student_answer.as_deref(), Some("They hold values"));
        assert_eq!(h.state.state, EngineState::Idle);
    }

    #[tokio::test]
    async fn test_skip() {
        let mut h = harness(&[]);
        h.teach(&["tuples"]).await;
        let step = h.say("skip").await;

        assert!(step.consumed);
        assert_eq!(step.messages.len(), 1);
        assert_eq!(step.messages[0].kind, OutboundKind::Acknowledgement);
        assert_eq!(step.timer, TimerDirective::Clear);

        let record = h.state.ledger.get("tuples").unwrap();
        assert!(record.skipped);
        assert!(record.understood.is_none());
        assert_eq!(h.state.state, EngineState::Idle);
        assert_eq!(h.evaluator.calls(), 0);
    }

    #[tokio::test]
    async fn test_new_question_keeps_pending_question() {
        let mut h = harness(&[0.9]);
        h.teach(&["arrays"]).await;
        let question_id = h.state.active_question.as_ref().unwrap().id.clone();
        let question_text = h.state.active_question.as_ref().unwrap().text.clone();

        let step = h.say("How do I install Python?").await;
        assert!(!step.consumed);
        assert_eq!(step.messages[0].kind, OutboundKind::Reminder);
        assert!(step.messages[0].text.starts_with("Good question! Once that's answered"));
        assert!(step.messages[0].text.ends_with(&question_text));
        assert_eq!(step.timer, TimerDirective::Unchanged);
        assert_eq!(h.state.state, EngineState::WaitingForAnswer);

        // The next message is classified afresh and answers the pending question
        let step = h.say("Arrays keep values in order").await;
        assert_eq!(step.messages[0].kind, OutboundKind::Feedback);
        assert_eq!(step.messages[0].question_id.as_deref(), Some(question_id.as_str()));
    }

    #[tokio::test]
    async fn test_dont_know_scores_zero_without_evaluator() {
        let mut h = harness(&[]);
        h.teach(&["pointers"]).await;
        let step = h.say("I don't know").await;

        assert_eq!(step.messages[0].score, Some(0.0));
        assert_eq!(h.evaluator.calls(), 0);
        assert_eq!(
            h.state.ledger.get("pointers").unwrap().verification_attempts,
            1
        );
    }

    #[tokio::test]
    async fn test_hedged_answer_is_evaluated() {
        let mut h = harness(&[0.9]);
        h.teach(&["arrays"]).await;
        let step = h
            .say("I'm not sure, but I think arrays store values in order by index")
            .await;

        assert_eq!(h.evaluator.calls(), 1);
        assert_eq!(step.messages[0].score, Some(0.9));
        let record = h.state.ledger.get("arrays").unwrap();
        assert_eq!(record.understood, Some(true));
        assert_eq!(record.verification_attempts, 0);
    }

    #[tokio::test]
    async fn test_two_failures_make_a_weak_area() {
        let mut h = harness(&[]);
        h.teach(&["closures"]).await;
        h.say("I don't know").await;

        // Re-teaching reopens questioning
        let step = h.teach(&["closures"]).await;
        assert_eq!(step.messages.len(), 1);
        let step = h.say("I don't know").await;
        assert_eq!(
            step.messages[0].directive,
            Some(TeachingDirective::WeakArea {
                concept: "closures".to_string()
            })
        );

        let record = h.state.ledger.get("closures").unwrap();
        assert!(record.weak);
        assert_eq!(record.verification_attempts, 2);

        // No third automatic question, by re-teach or by claim
        assert!(h.teach(&["closures"]).await.messages.is_empty());
        assert!(h.say("got it").await.messages.is_empty());
        assert_eq!(h.generator.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_never_policy_does_not_requestion() {
        let config = Config {
            requestion_policy: RequestionPolicy::Never,
            ..Config::default()
        };
        let mut h = harness_with(config, &[0.1]);
        h.teach(&["closures"]).await;
        h.say("wrong").await;

        assert!(h.teach(&["closures"]).await.messages.is_empty());
    }

    #[tokio::test]
    async fn test_claim_triggers_verification() {
        let mut h = harness(&[0.9, 0.95]);
        h.teach(&["arrays"]).await;
        h.say("ordered").await;

        let step = h.say("Got it, makes sense!").await;
        assert!(step.consumed);
        assert_eq!(step.messages[0].kind, OutboundKind::Question);
        let question = h.state.active_question.as_ref().unwrap();
        assert_eq!(question.kind, QuestionKind::Verification);
        assert_eq!(question.concept_refs, vec!["arrays"]);
        // Verification questions do not count toward checkpoints
        assert_eq!(h.state.concepts_since_checkpoint, 1);

        h.say("You index them from zero").await;
        assert!(h.state.ledger.get("arrays").unwrap().verified);
        assert!(h.say("got it").await.messages.is_empty());
    }

    #[tokio::test]
    async fn test_idle_message_passes_through() {
        let mut h = harness(&[]);
        let step = h.say("Can we start with Python basics?").await;
        assert!(!step.consumed);
        assert!(step.messages.is_empty());
    }

    #[tokio::test]
    async fn test_timeout_then_hint() {
        let mut h = harness(&[]);
        h.teach(&["arrays"]).await;

        let step = h.fire(TimerPhase::AnswerTimeout);
        assert_eq!(h.state.state, EngineState::Timeout);
        assert_eq!(step.messages[0].kind, OutboundKind::Reminder);
        assert!(matches!(
            &step.timer,
            TimerDirective::Arm(Timer { phase: TimerPhase::HintDelay, after, .. }) if *after == Duration::from_secs(60)
        ));

        let step = h.fire(TimerPhase::HintDelay);
        assert_eq!(step.messages[0].kind, OutboundKind::Hint);
        assert_eq!(h.state.state, EngineState::WaitingForAnswer);
        assert_eq!(step.timer, TimerDirective::Clear);
        assert!(h
            .state
            .history
            .iter()
            .any(|t| t.to == EngineState::Hint));
    }

    #[tokio::test]
    async fn test_answer_during_timeout_is_evaluated() {
        let mut h = harness(&[0.9]);
        h.teach(&["arrays"]).await;
        h.fire(TimerPhase::AnswerTimeout);

        let step = h.say("ordered values").await;
        assert_eq!(step.messages[0].kind, OutboundKind::Feedback);
        assert_eq!(h.state.ledger.get("arrays").unwrap().understood, Some(true));
    }

    #[tokio::test]
    async fn test_stale_timer_is_ignored() {
        let mut h = harness(&[0.9]);
        h.teach(&["arrays"]).await;
        let id = h.state.active_question.as_ref().unwrap().id.clone();
        h.say("ordered values").await;

        let step = h
            .engine
            .timer_elapsed(&mut h.state, TimerPhase::AnswerTimeout, &id);
        assert!(step.messages.is_empty());
        assert_eq!(h.state.state, EngineState::Idle);
    }

    #[tokio::test]
    async fn test_generator_receives_difficulty_and_kind() {
        let mut h = harness(&[]);
        h.state.difficulty = DifficultyLevel::Advanced;
        h.teach(&["generics"]).await;

        let requests = h.generator.requests();
        assert_eq!(requests[0].kind, QuestionKind::Comprehension);
        assert_eq!(requests[0].difficulty_hint, DifficultyLevel::Advanced);
    }

    #[tokio::test]
    async fn test_at_most_one_active_question() {
        let mut h = harness(&[]);
        h.teach(&["a"]).await;
        h.teach(&["b"]).await;
        h.teach(&["c"]).await;
        assert_eq!(h.generator.requests().len(), 1);
        assert_eq!(h.state.pending_concepts, vec!["b", "c"]);
    }
}
