use thiserror::Error;

/// Errors that can occur during object storage operations.
#[derive(Debug, Error)]
pub enum BlobError {
    /// The requested object was not found.
    #[error("object not found: {bucket}/{key}")]
    NotFound {
        /// Bucket the lookup targeted.
        bucket: String,
        /// Key within the bucket.
        key: String,
    },

    /// The object exceeds the maximum allowed size.
    #[error("object too large: {size} bytes exceeds limit of {limit} bytes")]
    TooLarge {
        /// Actual size.
        size: u64,
        /// Maximum allowed size.
        limit: u64,
    },

    /// A storage backend error occurred.
    #[error("object storage error: {0}")]
    Storage(String),
}
