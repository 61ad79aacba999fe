use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use openarchive_core::{
    classify, Actor, Disposition, Document, DocumentId, DocumentStatus, LifecycleError,
};
use openarchive_store::DocumentStore;

use crate::error::store_err;
use crate::machine::StateMachine;

/// Documents due for action, grouped by disposition.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LifecycleReport {
    /// Retention expired, permanent category: route to the archive.
    pub to_transfer: Vec<DocumentId>,
    /// Retention expired, non-permanent category: route to destruction.
    pub to_destroy: Vec<DocumentId>,
    /// Inside the review window: flag for archivist review.
    pub pending_review: Vec<DocumentId>,
}

impl LifecycleReport {
    /// Total number of documents with an action due.
    #[must_use]
    pub fn total(&self) -> usize {
        self.to_transfer.len() + self.to_destroy.len() + self.pending_review.len()
    }
}

/// What a sweep actually changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepOutcome {
    /// Documents moved to `AWAITING_TRANSFER`.
    pub to_transfer: u32,
    /// Documents moved to `DESTROY`.
    pub to_destroy: u32,
    /// Documents moved to `REVIEW`.
    pub to_review: u32,
    /// Transitions skipped because another writer got there first or the
    /// document had already moved on.
    pub skipped: u32,
}

/// Periodic retention evaluation over the active document population.
///
/// The scanner has no internal timer; an external scheduler (cron, a
/// lifecycle-check queue task) calls it. Both entry points take `today`
/// explicitly so sweeps replay deterministically in tests.
pub struct LifecycleScanner {
    store: Arc<dyn DocumentStore>,
    machine: Arc<StateMachine>,
}

impl LifecycleScanner {
    pub fn new(store: Arc<dyn DocumentStore>, machine: Arc<StateMachine>) -> Self {
        Self { store, machine }
    }

    /// Classify every document in active storage or review against its
    /// retention schedule. Read-only.
    #[instrument(skip(self))]
    pub async fn check_document_lifecycles(
        &self,
        today: NaiveDate,
    ) -> Result<LifecycleReport, LifecycleError> {
        let documents = self
            .store
            .list_by_status(&[DocumentStatus::ActiveStorage, DocumentStatus::Review])
            .await
            .map_err(store_err)?;

        let mut report = LifecycleReport::default();
        for document in &documents {
            match classify_document(document, today) {
                Disposition::Transfer => report.to_transfer.push(document.id),
                Disposition::Destroy => report.to_destroy.push(document.id),
                Disposition::Review => report.pending_review.push(document.id),
                Disposition::None => {}
            }
        }

        debug!(
            scanned = documents.len(),
            due = report.total(),
            "lifecycle check complete"
        );
        Ok(report)
    }

    /// Classify and apply: move due documents to their next status.
    ///
    /// Idempotent. A document that was already moved (by a concurrent sweep
    /// or an archivist) surfaces as `Conflict` or `InvalidTransition` from
    /// the state machine; those are counted as skipped, not errors.
    #[instrument(skip(self))]
    pub async fn run_sweep(&self, today: NaiveDate) -> Result<SweepOutcome, LifecycleError> {
        let report = self.check_document_lifecycles(today).await?;
        let mut outcome = SweepOutcome::default();

        for id in &report.to_transfer {
            match self.apply(*id, DocumentStatus::AwaitingTransfer).await? {
                Applied::Yes => outcome.to_transfer += 1,
                Applied::Skipped => outcome.skipped += 1,
            }
        }
        for id in &report.to_destroy {
            match self.apply(*id, DocumentStatus::Destroy).await? {
                Applied::Yes => outcome.to_destroy += 1,
                Applied::Skipped => outcome.skipped += 1,
            }
        }
        for id in &report.pending_review {
            match self.apply(*id, DocumentStatus::Review).await? {
                Applied::Yes => outcome.to_review += 1,
                Applied::Skipped => outcome.skipped += 1,
            }
        }

        info!(
            to_transfer = outcome.to_transfer,
            to_destroy = outcome.to_destroy,
            to_review = outcome.to_review,
            skipped = outcome.skipped,
            "lifecycle sweep complete"
        );
        Ok(outcome)
    }

    async fn apply(
        &self,
        id: DocumentId,
        status: DocumentStatus,
    ) -> Result<Applied, LifecycleError> {
        let result = self
            .machine
            .transition(id, status, Actor::System, Some("retention sweep".into()))
            .await;
        match result {
            Ok(_) => Ok(Applied::Yes),
            Err(LifecycleError::Conflict(_) | LifecycleError::InvalidTransition { .. }) => {
                debug!(document_id = %id, to = %status, "sweep transition skipped");
                Ok(Applied::Skipped)
            }
            Err(other) => Err(other),
        }
    }
}

enum Applied {
    Yes,
    Skipped,
}

/// One document's disposition for a given day.
#[must_use]
pub fn classify_document(document: &Document, today: NaiveDate) -> Disposition {
    classify(
        document.status,
        document.retention_category,
        document.creation_date,
        today,
    )
}
