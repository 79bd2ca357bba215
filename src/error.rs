use thiserror::Error;
use uuid::Uuid;

use crate::quiz::QuestionId;

/// Failures raised by the progression engine.
///
/// Pure parts of the engine (access, scoring, certification) only ever
/// produce `Validation`, `Incomplete`, `AccessDenied` and the state errors.
/// `Network` comes exclusively from collaborator calls.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("invalid quiz data: {0}")]
    Validation(String),
    #[error("quiz incomplete: {answered} of {required} questions answered")]
    Incomplete { answered: usize, required: usize },
    #[error("lesson {0} is locked for this visitor")]
    AccessDenied(Uuid),
    #[error("lesson {0} not found in course")]
    LessonNotFound(Uuid),
    #[error("question {0} not found in quiz")]
    QuestionNotFound(QuestionId),
    #[error("no quiz loaded for the current lesson")]
    NoQuizLoaded,
    #[error("quiz already submitted; retake to answer again")]
    AlreadySubmitted,
    #[error("network: {0}")]
    Network(#[from] BackendError),
}

/// Collaborator call failures.
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("backend answered {status} for {endpoint}")]
    Status { endpoint: String, status: u16 },
    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("invalid backend url: {0}")]
    Url(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{name} is invalid: {value}")]
    Invalid { name: &'static str, value: String },
}
