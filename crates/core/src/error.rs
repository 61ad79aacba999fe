use thiserror::Error;

use crate::status::DocumentStatus;

/// Top-level error type for the lifecycle core.
///
/// Backend crates carry their own error enums; the orchestration layer maps
/// them into this taxonomy at its boundary.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// Malformed input.
    #[error("validation error: {0}")]
    Validation(String),

    /// The requested transition is not in the allowed-next set.
    #[error("invalid transition: {from} -> {to}")]
    InvalidTransition {
        from: DocumentStatus,
        to: DocumentStatus,
    },

    /// The referenced entity does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A concurrent writer won the optimistic-concurrency race.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The audit hash chain failed verification. Reported for operator
    /// investigation; the chain is never rewritten.
    #[error("integrity violation: {0}")]
    Integrity(String),

    /// A storage or network collaborator failed mid-operation.
    #[error("external dependency error: {0}")]
    ExternalDependency(String),

    /// A queue task reached its attempt cap.
    #[error("exhausted retries after {attempts} attempts: {last_error}")]
    ExhaustedRetries { attempts: u32, last_error: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_transition_display_names_both_states() {
        let err = LifecycleError::InvalidTransition {
            from: DocumentStatus::Ingesting,
            to: DocumentStatus::Destroyed,
        };
        assert_eq!(err.to_string(), "invalid transition: INGESTING -> DESTROYED");
    }

    #[test]
    fn exhausted_retries_display() {
        let err = LifecycleError::ExhaustedRetries {
            attempts: 3,
            last_error: "ocr timeout".into(),
        };
        assert!(err.to_string().contains("3 attempts"));
    }
}
