//! Error types for the task core

/// The result type a task settles with
pub type TaskResult<T> = Result<T, TaskError>;

/// The error type emitted by the task core
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum TaskError {
    /// The task was aborted before it could complete
    #[error("task aborted: {0}")]
    Aborted(String),
    /// The task's start action failed
    #[error("task failed: {0}")]
    Failed(String),
    /// No task could be constructed from the given arguments
    #[error("invalid task arguments: {0}")]
    InvalidArgs(String),
    /// The task was dropped without ever settling
    #[error("task never settled")]
    NeverSettled,
}

impl TaskError {
    /// Whether the error represents an externally requested abort, as opposed
    /// to a genuine task failure
    pub fn is_abort(&self) -> bool {
        matches!(self, TaskError::Aborted(_))
    }
}
