//! End-to-end questioning scenarios through the session store.
//!
//! The question and answer services are replaced with scripted fakes; time is
//! paused so answer and hint timers can be driven deterministically.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use socratic_engine::{
    AnswerEvaluator, CollaboratorErrorKind, Config, EngineState, Evaluation, EvaluationRequest,
    GeneratedQuestion, OutboundKind, QuestionGenerator, QuestionKind, QuestionRequest, Result,
    SessionEvent, SessionOptions, SessionStore, SocraticEngine, SocraticError, TeachingDirective,
};
use socratic_report::MasteryLevel;
use tokio::sync::broadcast;

// ============================================================================
// Fakes
// ============================================================================

/// Generates a question naming its concepts, with a fixed hint.
#[derive(Default)]
struct EchoGenerator {
    requests: Mutex<Vec<QuestionRequest>>,
}

#[async_trait]
impl QuestionGenerator for EchoGenerator {
    async fn generate_question(&self, request: &QuestionRequest) -> Result<GeneratedQuestion> {
        self.requests.lock().unwrap().push(request.clone());
        Ok(GeneratedQuestion::new(format!(
            "In your own words, what is {}?",
            request.concept_refs.join(" and ")
        ))
        .with_hint("Think about the example we just walked through"))
    }
}

/// Returns queued scores in order; fails once the queue is empty.
struct ScriptedEvaluator {
    scores: Mutex<VecDeque<f64>>,
}

impl ScriptedEvaluator {
    fn new(scores: &[f64]) -> Self {
        Self {
            scores: Mutex::new(scores.iter().copied().collect()),
        }
    }
}

#[async_trait]
impl AnswerEvaluator for ScriptedEvaluator {
    async fn evaluate_answer(&self, _request: &EvaluationRequest) -> Result<Evaluation> {
        let score = self.scores.lock().unwrap().pop_front();
        score.map_or_else(
            || {
                Err(SocraticError::evaluation(
                    CollaboratorErrorKind::Unavailable,
                    "no scripted score left",
                ))
            },
            |score| Ok(Evaluation::new(score, format!("Scored {score}"))),
        )
    }
}

struct Fixture {
    store: SessionStore,
    generator: Arc<EchoGenerator>,
    session_id: String,
}

async fn fixture(scores: &[f64]) -> Fixture {
    let generator = Arc::new(EchoGenerator::default());
    let engine = SocraticEngine::new(
        Config::default(),
        generator.clone(),
        Arc::new(ScriptedEvaluator::new(scores)),
    );
    let store = SessionStore::new(engine);
    let session_id = store
        .create_session(SessionOptions::default())
        .await
        .unwrap();

    Fixture {
        store,
        generator,
        session_id,
    }
}

impl Fixture {
    async fn teach(&self, concept: &str) {
        self.store
            .on_concept_taught(&self.session_id, concept)
            .await
            .unwrap();
    }

    async fn say(&self, text: &str) -> socratic_engine::StudentReply {
        self.store
            .student_message(&self.session_id, text)
            .await
            .unwrap()
    }

    async fn state(&self) -> socratic_engine::SessionQuestioningState {
        self.store.snapshot(&self.session_id).await.unwrap()
    }

    fn question_count(&self) -> usize {
        self.generator.requests.lock().unwrap().len()
    }
}

/// Waits for the next outbound message on the event stream.
async fn next_message(events: &mut broadcast::Receiver<SessionEvent>) -> socratic_engine::OutboundMessage {
    loop {
        if let SessionEvent::Message(payload) = events.recv().await.unwrap() {
            return payload.message;
        }
    }
}

// ============================================================================
// Scenario A: single concept, passing answer
// ============================================================================

#[tokio::test]
async fn test_scenario_a_comprehension_question_and_pass() {
    let f = fixture(&[0.85]).await;
    let mut events = f.store.subscribe(&f.session_id).await.unwrap();

    f.teach("arrays").await;
    let question = next_message(&mut events).await;
    assert_eq!(question.kind, OutboundKind::Question);
    assert_eq!(question.concept_refs, vec!["arrays"]);
    assert_eq!(f.question_count(), 1);

    let reply = f.say("an ordered collection indexed from zero").await;
    assert!(reply.consumed);
    let feedback = reply.message().unwrap();
    assert_eq!(feedback.kind, OutboundKind::Feedback);
    assert_eq!(feedback.score, Some(0.85));
    assert!(feedback.directive.is_none());

    let state = f.state().await;
    assert_eq!(state.state, EngineState::Idle);
    assert_eq!(state.ledger.get("arrays").unwrap().understood, Some(true));
    assert!(state.active_question.is_none());
}

// ============================================================================
// Scenario B: checkpoint after three comprehension questions
// ============================================================================

#[tokio::test]
async fn test_scenario_b_checkpoint_after_three_concepts() {
    let f = fixture(&[0.8, 0.8, 0.8]).await;

    for (concept, answer) in [
        ("arrays", "indexed storage"),
        ("loops", "repeat a block"),
        ("functions", "named reusable code"),
    ] {
        f.teach(concept).await;
        let reply = f.say(answer).await;
        assert_eq!(reply.message().unwrap().kind, OutboundKind::Feedback);
    }

    let state = f.state().await;
    assert_eq!(state.checkpoints_fired, 1);
    assert_eq!(state.concepts_since_checkpoint, 0);
    let checkpoint = state.active_question.unwrap();
    assert_eq!(checkpoint.kind, QuestionKind::Checkpoint);
    assert_eq!(checkpoint.concept_refs, vec!["arrays", "loops", "functions"]);
    assert_eq!(state.state, EngineState::WaitingForAnswer);

    let visited: Vec<_> = state.history.iter().map(|t| t.to).collect();
    assert!(visited.contains(&EngineState::CheckpointQuiz));
}

// ============================================================================
// Scenario C: silence leads to a prompt, then a hint
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_scenario_c_timeout_then_hint() {
    let f = fixture(&[]).await;
    let mut events = f.store.subscribe(&f.session_id).await.unwrap();

    f.teach("recursion").await;
    let question = next_message(&mut events).await;
    assert_eq!(question.timeout_seconds, Some(120));

    tokio::time::advance(Duration::from_secs(120)).await;
    let reminder = next_message(&mut events).await;
    assert_eq!(reminder.kind, OutboundKind::Reminder);
    assert_eq!(reminder.question_id, question.question_id);
    assert_eq!(f.state().await.state, EngineState::Timeout);

    tokio::time::advance(Duration::from_secs(60)).await;
    let hint = next_message(&mut events).await;
    assert_eq!(hint.kind, OutboundKind::Hint);
    assert_eq!(hint.text, "Think about the example we just walked through");

    let state = f.state().await;
    assert_eq!(state.state, EngineState::WaitingForAnswer);
    let visited: Vec<_> = state.history.iter().map(|t| t.to).collect();
    assert!(visited.contains(&EngineState::Hint));

    // No further prompts after the hint
    tokio::time::advance(Duration::from_secs(3600)).await;
    assert!(events.try_recv().is_err());
}

// ============================================================================
// Scenario D: two "I don't know" answers make a weak area
// ============================================================================

#[tokio::test]
async fn test_scenario_d_repeated_dont_know_stops_probing() {
    let f = fixture(&[]).await;

    f.teach("pointers").await;
    let first = f.say("I don't know").await;
    assert_eq!(
        first.message().unwrap().directive,
        Some(TeachingDirective::Reexplain {
            concept: "pointers".to_string()
        })
    );

    // The teaching layer re-explains, which reopens questioning
    f.teach("pointers").await;
    assert_eq!(f.question_count(), 2);
    let second = f.say("I don't know").await;
    assert_eq!(
        second.message().unwrap().directive,
        Some(TeachingDirective::WeakArea {
            concept: "pointers".to_string()
        })
    );

    let state = f.state().await;
    let record = state.ledger.get("pointers").unwrap();
    assert_eq!(record.verification_attempts, 2);
    assert_eq!(record.understood, Some(false));
    assert!(record.weak);

    // No third automatic question
    f.teach("pointers").await;
    assert_eq!(f.state().await.state, EngineState::Idle);
    assert_eq!(f.question_count(), 2);

    let summary = f.store.summary(&f.session_id).await.unwrap();
    assert_eq!(summary.weak_areas, vec!["pointers"]);
    assert_eq!(summary.concepts[0].mastery, MasteryLevel::Weak);
}

// ============================================================================
// Scenario E: skip
// ============================================================================

#[tokio::test]
async fn test_scenario_e_skip() {
    let f = fixture(&[0.9]).await;

    f.teach("generics").await;
    let reply = f.say("skip").await;
    assert!(reply.consumed);
    let ack = reply.message().unwrap();
    assert_eq!(ack.kind, OutboundKind::Acknowledgement);
    assert!(ack.score.is_none());

    let state = f.state().await;
    assert_eq!(state.state, EngineState::Idle);
    let record = state.ledger.get("generics").unwrap();
    assert!(record.skipped);
    assert!(record.score.is_none());
    assert!(record.understood.is_none());
}

// ============================================================================
// Cross-cutting behavior
// ============================================================================

#[tokio::test]
async fn test_sessions_are_independent() {
    let f = fixture(&[0.9]).await;
    let other = f
        .store
        .create_session(SessionOptions::default())
        .await
        .unwrap();

    f.teach("traits").await;
    f.store.on_concept_taught(&other, "lifetimes").await.unwrap();

    let first = f.state().await;
    let second = f.store.snapshot(&other).await.unwrap();
    assert!(first.ledger.get("lifetimes").is_none());
    assert!(second.ledger.get("traits").is_none());
    assert_eq!(
        first.active_question.unwrap().concept_refs,
        vec!["traits"]
    );
    assert_eq!(
        second.active_question.unwrap().concept_refs,
        vec!["lifetimes"]
    );
}

#[tokio::test]
async fn test_student_question_while_pending_keeps_question() {
    let f = fixture(&[0.9]).await;
    f.teach("iterators").await;

    let reply = f.say("How do I install Rust?").await;
    assert!(!reply.consumed);
    assert_eq!(reply.message().unwrap().kind, OutboundKind::Reminder);
    assert_eq!(f.state().await.state, EngineState::WaitingForAnswer);

    let reply = f.say("they yield items one at a time").await;
    assert_eq!(reply.message().unwrap().kind, OutboundKind::Feedback);
}

#[tokio::test]
async fn test_evaluator_outage_gives_neutral_feedback() {
    let f = fixture(&[]).await;
    f.teach("slices").await;

    let reply = f.say("a view into a sequence").await;
    let feedback = reply.message().unwrap();
    assert_eq!(feedback.kind, OutboundKind::Feedback);
    assert!(feedback.score.is_none());

    let state = f.state().await;
    assert_eq!(state.state, EngineState::Idle);
    assert!(state.ledger.get("slices").unwrap().understood.is_none());
}

#[tokio::test]
async fn test_end_session_reports_final_state() {
    let f = fixture(&[0.9]).await;
    f.teach("modules").await;
    f.say("a way to organize code").await;

    let final_state = f.store.end_session(&f.session_id).await.unwrap();
    assert_eq!(final_state.questions_asked, 1);

    let err = f.store.snapshot(&f.session_id).await.unwrap_err();
    assert!(matches!(err, SocraticError::SessionNotFound { .. }));
}
