use serde::{Deserialize, Serialize};

/// The legal status of a document in the archive.
///
/// The status set is closed and transitions between statuses follow a fixed
/// table (see [`DocumentStatus::allowed_transitions`]). Documents never leave
/// the terminal states [`Transferred`](Self::Transferred) and
/// [`Destroyed`](Self::Destroyed).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocumentStatus {
    /// Intake in progress; the ingestion saga has created the row but
    /// enrichment has not completed.
    Ingesting,
    /// Enrichment succeeded; awaiting formal registration into storage.
    Registered,
    /// In active storage, within its retention period.
    ActiveStorage,
    /// Flagged for archivist review ahead of disposition.
    Review,
    /// Approved for transfer to the permanent archive.
    AwaitingTransfer,
    /// Scheduled for destruction.
    Destroy,
    /// Transferred to the permanent archive. Terminal.
    Transferred,
    /// Destroyed at end of retention. Terminal. The row is kept; only the
    /// stored object is gone.
    Destroyed,
    /// Intake failed; a manual re-ingest is the only way out.
    ProcessingFailed,
}

impl DocumentStatus {
    /// The statuses a document in this status may move to.
    ///
    /// This is the single source of truth for the transition table; the
    /// lifecycle engine consults it before every write.
    #[must_use]
    pub fn allowed_transitions(self) -> &'static [DocumentStatus] {
        match self {
            Self::Ingesting => &[Self::Registered, Self::ProcessingFailed],
            Self::Registered => &[Self::ActiveStorage],
            Self::ActiveStorage => &[Self::Review, Self::AwaitingTransfer, Self::Destroy],
            Self::Review => &[Self::ActiveStorage, Self::AwaitingTransfer, Self::Destroy],
            Self::AwaitingTransfer => &[Self::Transferred],
            Self::Destroy => &[Self::Destroyed],
            Self::ProcessingFailed => &[Self::Ingesting],
            Self::Transferred | Self::Destroyed => &[],
        }
    }

    /// Whether a direct transition to `target` is permitted.
    #[must_use]
    pub fn can_transition_to(self, target: DocumentStatus) -> bool {
        self.allowed_transitions().contains(&target)
    }

    /// Terminal statuses have no outgoing transitions.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        self.allowed_transitions().is_empty()
    }

    /// The canonical upper-snake string form, as persisted.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ingesting => "INGESTING",
            Self::Registered => "REGISTERED",
            Self::ActiveStorage => "ACTIVE_STORAGE",
            Self::Review => "REVIEW",
            Self::AwaitingTransfer => "AWAITING_TRANSFER",
            Self::Destroy => "DESTROY",
            Self::Transferred => "TRANSFERRED",
            Self::Destroyed => "DESTROYED",
            Self::ProcessingFailed => "PROCESSING_FAILED",
        }
    }

    /// Every status, in declaration order. Used by stores and tests.
    #[must_use]
    pub fn all() -> &'static [DocumentStatus] {
        &[
            Self::Ingesting,
            Self::Registered,
            Self::ActiveStorage,
            Self::Review,
            Self::AwaitingTransfer,
            Self::Destroy,
            Self::Transferred,
            Self::Destroyed,
            Self::ProcessingFailed,
        ]
    }
}

impl std::fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DocumentStatus {
    type Err = crate::error::LifecycleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "INGESTING" => Ok(Self::Ingesting),
            "REGISTERED" => Ok(Self::Registered),
            "ACTIVE_STORAGE" => Ok(Self::ActiveStorage),
            "REVIEW" => Ok(Self::Review),
            "AWAITING_TRANSFER" => Ok(Self::AwaitingTransfer),
            "DESTROY" => Ok(Self::Destroy),
            "TRANSFERRED" => Ok(Self::Transferred),
            "DESTROYED" => Ok(Self::Destroyed),
            "PROCESSING_FAILED" => Ok(Self::ProcessingFailed),
            other => Err(crate::error::LifecycleError::Validation(format!(
                "unknown document status: {other}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states_have_no_outgoing_edges() {
        assert!(DocumentStatus::Transferred.is_terminal());
        assert!(DocumentStatus::Destroyed.is_terminal());
        assert!(DocumentStatus::Transferred.allowed_transitions().is_empty());
        assert!(DocumentStatus::Destroyed.allowed_transitions().is_empty());
    }

    #[test]
    fn ingesting_branches() {
        assert!(DocumentStatus::Ingesting.can_transition_to(DocumentStatus::Registered));
        assert!(DocumentStatus::Ingesting.can_transition_to(DocumentStatus::ProcessingFailed));
        assert!(!DocumentStatus::Ingesting.can_transition_to(DocumentStatus::ActiveStorage));
    }

    #[test]
    fn review_can_return_to_active_storage() {
        assert!(DocumentStatus::Review.can_transition_to(DocumentStatus::ActiveStorage));
        assert!(DocumentStatus::Review.can_transition_to(DocumentStatus::AwaitingTransfer));
        assert!(DocumentStatus::Review.can_transition_to(DocumentStatus::Destroy));
        assert!(!DocumentStatus::Review.can_transition_to(DocumentStatus::Destroyed));
    }

    #[test]
    fn processing_failed_only_allows_reingest() {
        assert_eq!(
            DocumentStatus::ProcessingFailed.allowed_transitions(),
            &[DocumentStatus::Ingesting]
        );
    }

    #[test]
    fn every_target_is_a_member_of_the_state_set() {
        for status in DocumentStatus::all() {
            for target in status.allowed_transitions() {
                assert!(DocumentStatus::all().contains(target));
            }
        }
    }

    #[test]
    fn string_roundtrip() {
        for status in DocumentStatus::all() {
            let parsed: DocumentStatus = status.as_str().parse().unwrap();
            assert_eq!(parsed, *status);
        }
        assert!("UPLOADED".parse::<DocumentStatus>().is_err());
    }
}
