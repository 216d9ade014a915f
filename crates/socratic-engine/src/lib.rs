//! Socratic Questioning Engine
//!
//! Watches a teaching session, asks the student about each newly taught
//! concept, evaluates answers, and reports comprehension back to the teaching
//! layer. Each session runs as its own actor behind an HTTP and WebSocket API.

pub mod api;
pub mod classifier;
pub mod collaborators;
pub mod config;
pub mod declaration;
pub mod engine;
pub mod error;
pub mod ledger;
pub mod message;
pub mod question;
pub mod remote;
pub mod session;
pub mod state;
pub mod store;
pub mod websocket;

pub use api::{
    create_router, AppState, ConceptsTaughtRequest, CreateSessionResponse, ErrorResponse,
    HealthResponse, StudentMessageRequest, StudentMessageResponse, TeachingTextRequest,
    TeachingTextResponse,
};
pub use classifier::{ClassificationContext, KeywordClassifier, MessageClassifier, MessageIntent};
pub use collaborators::{AnswerEvaluator, EvaluationRequest, QuestionGenerator, QuestionRequest};
pub use config::{CollaboratorConfig, Config, DifficultyLevel, RequestionPolicy, ServerConfig};
pub use declaration::{parse_concept_declaration, ConceptDeclaration, WORKING_MEMORY_LIMIT};
pub use engine::{SocraticEngine, Step, Timer, TimerDirective, TimerPhase};
pub use error::{CollaboratorErrorKind, Result, SocraticError};
pub use ledger::{normalize_concept_name, ConceptLedger, ConceptRecord, TaughtConcept};
pub use message::{OutboundKind, OutboundMessage, TeachingDirective};
pub use question::{Evaluation, GeneratedQuestion, Question, QuestionKind};
pub use remote::{RemoteAnswerEvaluator, RemoteQuestionGenerator};
pub use session::{SessionHandle, StudentReply};
pub use state::{EngineState, SessionQuestioningState, TransitionRecord};
pub use store::{SessionOptions, SessionStore};
pub use websocket::{EventBroadcaster, SessionEvent};
