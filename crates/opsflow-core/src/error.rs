use thiserror::Error;

/// Errors surfaced to callers of the engine.
///
/// Only `submit` can fail; every other operation reports an unknown id or
/// an incompatible status as a boolean/optional no-op instead of an error.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("invalid cron expression `{expr}`: {reason}")]
    InvalidCron { expr: String, reason: String },

    #[error("invalid timezone `{0}`")]
    InvalidTimezone(String),
}

/// A fault raised while executing a single checkpoint.
///
/// Never escapes the engine: the retry controller consumes it and, once the
/// retry budget is exhausted, surfaces it as a terminal `Failed` status with
/// the message attached to the task.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct ExecutionError(pub String);

impl ExecutionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}
