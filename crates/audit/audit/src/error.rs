/// Errors that can occur during audit store operations.
#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    /// An error from the underlying storage backend.
    #[error("storage error: {0}")]
    Storage(String),

    /// A serialization or deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// An insert would break the append-only sequence (duplicate sequence
    /// number), meaning two writers raced past the serialization point.
    #[error("sequence conflict at {0}")]
    SequenceConflict(u64),
}
