use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tracing::{debug, error, instrument, warn};

use openarchive_audit::{AuditLog, NewEntry};
use openarchive_core::{Actor, Document, DocumentId, DocumentStatus, LifecycleError};
use openarchive_queue::{NewTask, TaskQueue, TaskType};
use openarchive_store::{DocumentStore, StatusCas};

use crate::error::{audit_err, store_err};
use crate::notify::{Notifier, TransitionNotice};

/// Queue priority for transfer preparation work.
pub const TRANSFER_PREP_PRIORITY: i32 = 3;

/// The document state machine.
///
/// The only writer of document status. Every transition is validated
/// against the fixed table, applied with a compare-and-set against the
/// status read at call start, and audited; a transition whose audit entry
/// cannot be written is reverted and never persists.
pub struct StateMachine {
    store: Arc<dyn DocumentStore>,
    audit: Arc<AuditLog>,
    queue: Arc<dyn TaskQueue>,
    notifier: Arc<dyn Notifier>,
}

impl StateMachine {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        audit: Arc<AuditLog>,
        queue: Arc<dyn TaskQueue>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            store,
            audit,
            queue,
            notifier,
        }
    }

    /// Move a document to `new_status`.
    ///
    /// Fails with [`LifecycleError::InvalidTransition`] when the edge is not
    /// in the table, [`LifecycleError::NotFound`] when the document does not
    /// exist, and [`LifecycleError::Conflict`] when another writer changed
    /// the status between the read and the conditional write.
    ///
    /// On success one audit entry records the change, the notifier is fired
    /// (failures logged, never blocking), and entering `AWAITING_TRANSFER`
    /// enqueues a transfer-prep task.
    #[instrument(skip(self, actor, notes), fields(document_id = %document_id, to = %new_status))]
    pub async fn transition(
        &self,
        document_id: DocumentId,
        new_status: DocumentStatus,
        actor: Actor,
        notes: Option<String>,
    ) -> Result<Document, LifecycleError> {
        let document = self
            .store
            .get(document_id)
            .await
            .map_err(store_err)?
            .ok_or_else(|| LifecycleError::NotFound(document_id.to_string()))?;

        let current = document.status;
        if !current.can_transition_to(new_status) {
            return Err(LifecycleError::InvalidTransition {
                from: current,
                to: new_status,
            });
        }

        let cas = self
            .store
            .compare_and_set_status(document_id, current, new_status, Utc::now())
            .await
            .map_err(store_err)?;

        let updated = match cas {
            StatusCas::Applied(doc) => doc,
            StatusCas::Conflict { current: observed } => {
                return Err(LifecycleError::Conflict(format!(
                    "document {document_id} is {observed}, expected {current}"
                )));
            }
        };

        let entry = NewEntry::new(
            "document.status_changed",
            "document",
            Some(document_id.to_string()),
            actor,
            json!({
                "from": current.as_str(),
                "to": new_status.as_str(),
                "notes": notes,
            }),
        );

        if let Err(e) = self.audit.append(entry).await {
            // A transition without its audit entry never persists.
            warn!(error = %e, "audit append failed, reverting transition");
            match self
                .store
                .compare_and_set_status(document_id, new_status, current, Utc::now())
                .await
            {
                Ok(StatusCas::Applied(_)) => {}
                Ok(StatusCas::Conflict { current: observed }) => {
                    // The unaudited status was overwritten before the revert
                    // landed; whatever stands now needs an operator.
                    error!(
                        status = %observed,
                        "unaudited transition already overwritten, revert skipped"
                    );
                }
                Err(revert) => {
                    error!(error = %revert, "failed to revert unaudited transition");
                }
            }
            return Err(audit_err(e));
        }

        debug!(from = %current, "transition applied");

        let notice = TransitionNotice {
            document_id,
            from: current,
            to: new_status,
        };
        if let Err(e) = self.notifier.notify(&notice).await {
            warn!(error = %e, "transition notification failed");
        }

        if new_status == DocumentStatus::AwaitingTransfer {
            let task = NewTask::new(
                TaskType::TransferPrep,
                TRANSFER_PREP_PRIORITY,
                json!({ "document_id": document_id }),
            );
            if let Err(e) = self.queue.enqueue(task).await {
                // The transition stands; the missing task needs an operator.
                error!(error = %e, "failed to enqueue transfer prep");
            }
        }

        Ok(updated)
    }
}
