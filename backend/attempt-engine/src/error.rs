use thiserror::Error;

/// Conditions the engine cannot resolve into a state/fraction outcome on its own.
///
/// Illegal transitions, stale grader callbacks and incomplete responses are not errors:
/// they end up as a DISCARD verdict or a recorded state instead.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Attempt not found: {0}")]
    AttemptNotFound(String),

    #[error("Question not found: {0}")]
    QuestionNotFound(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Storage error: {0:#}")]
    Storage(anyhow::Error),

    #[error("Grader error: {0:#}")]
    Grader(anyhow::Error),
}

impl EngineError {
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            EngineError::AttemptNotFound(_) | EngineError::QuestionNotFound(_)
        )
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
