//! Error types for the task queue

use task_core::TaskError;

/// The error type emitted by the task queue
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    /// An error surfacing from the underlying task
    #[error("task error: {0}")]
    Task(#[from] TaskError),
}
