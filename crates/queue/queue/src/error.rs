use thiserror::Error;

/// Errors from task queue operations.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("task not found: {0}")]
    NotFound(String),

    /// The task is not in a status that permits the requested operation
    /// (e.g. retrying a task that is not failed).
    #[error("invalid task status: {0}")]
    InvalidStatus(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("backend error: {0}")]
    Backend(String),
}
