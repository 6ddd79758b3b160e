use thiserror::Error;

/// Failures surfaced to the caller of the session engine.
///
/// Only validation-style problems escape the engine; collaborator failures
/// are logged and swallowed.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("invalid duration: {0}s")]
    InvalidDuration(i64),
    #[error("no active workout")]
    NoActiveSession,
    #[error("a workout is already in progress")]
    SessionAlreadyActive,
    #[error("no current exercise")]
    NoCurrentExercise,
    #[error("operation does not match the exercise type")]
    WrongExerciseKind,
}

pub type EngineResult<T> = Result<T, EngineError>;

/// Failures reported by the store, record registry and history sink.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("storage: {0}")]
    Storage(String),
    #[error("history: {0}")]
    History(String),
    #[error("encode: {0}")]
    Encode(String),
}

pub type ServiceResult<T> = Result<T, ServiceError>;

impl From<rusqlite::Error> for ServiceError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(err: serde_json::Error) -> Self {
        Self::Encode(err.to_string())
    }
}

impl From<std::io::Error> for ServiceError {
    fn from(err: std::io::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<csv::Error> for ServiceError {
    fn from(err: csv::Error) -> Self {
        Self::History(err.to_string())
    }
}
