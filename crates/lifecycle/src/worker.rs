use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Duration;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, error, info, instrument, warn};

use openarchive_core::{
    Actor, Disposition, Document, DocumentFile, DocumentId, DocumentStatus, FileId, LifecycleError,
};
use openarchive_queue::{QueueTask, TaskId, TaskQueue, TaskResult, TaskType};
use openarchive_store::DocumentStore;

use crate::error::{queue_err, store_err};
use crate::machine::StateMachine;
use crate::retry::RetryStrategy;
use crate::scanner::classify_document;

/// Handles one task type leased from the queue.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    /// The task type this handler consumes.
    fn task_type(&self) -> TaskType;

    /// Run the task. An error marks the task failed; the worker decides
    /// whether it is retried.
    async fn handle(&self, task: &QueueTask) -> Result<(), LifecycleError>;

    /// Called once when the task's attempts are exhausted. The task will
    /// not run again unless an operator retries it.
    async fn on_exhausted(&self, _task: &QueueTask) {}
}

/// What one worker pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Tasks leased this pass.
    pub leased: u32,
    /// Tasks that completed successfully.
    pub succeeded: u32,
    /// Tasks that failed and were rescheduled.
    pub retried: u32,
    /// Tasks that failed with no attempts left.
    pub exhausted: Vec<TaskId>,
}

/// Pulls tasks off the queue and dispatches them to registered handlers.
///
/// Externally driven: `run_once` processes one batch and returns, so the
/// host decides the cadence. Failed tasks are rescheduled with backoff
/// until their attempt cap, at which point the failure is terminal and
/// surfaced as [`LifecycleError::ExhaustedRetries`] in the report.
pub struct Worker {
    queue: Arc<dyn TaskQueue>,
    handlers: HashMap<TaskType, Arc<dyn TaskHandler>>,
    retry: RetryStrategy,
    batch_size: usize,
}

impl Worker {
    pub fn new(queue: Arc<dyn TaskQueue>, retry: RetryStrategy, batch_size: usize) -> Self {
        Self {
            queue,
            handlers: HashMap::new(),
            retry,
            batch_size,
        }
    }

    /// Register a handler. One handler per task type; the newest wins.
    pub fn register(&mut self, handler: Arc<dyn TaskHandler>) {
        self.handlers.insert(handler.task_type(), handler);
    }

    /// Lease and process one batch of tasks.
    ///
    /// Only task types with a registered handler are leased, so a worker
    /// deployment can own a subset of the queue.
    #[instrument(skip(self))]
    pub async fn run_once(&self) -> Result<BatchReport, LifecycleError> {
        let types: Vec<TaskType> = self.handlers.keys().copied().collect();
        if types.is_empty() {
            return Ok(BatchReport::default());
        }

        let leased = self
            .queue
            .lease(Some(&types), self.batch_size)
            .await
            .map_err(queue_err)?;

        let mut report = BatchReport {
            leased: u32::try_from(leased.len()).unwrap_or(u32::MAX),
            ..BatchReport::default()
        };

        for task in leased {
            // Lease filtering guarantees a handler exists for the type.
            let Some(handler) = self.handlers.get(&task.task_type) else {
                continue;
            };

            match handler.handle(&task).await {
                Ok(()) => {
                    self.queue
                        .complete(&task.id, TaskResult::Success)
                        .await
                        .map_err(queue_err)?;
                    report.succeeded += 1;
                    debug!(task_id = %task.id, task_type = %task.task_type, "task completed");
                }
                Err(e) => {
                    let failed = self
                        .queue
                        .complete(
                            &task.id,
                            TaskResult::Failure {
                                error: e.to_string(),
                            },
                        )
                        .await
                        .map_err(queue_err)?;

                    if failed.retries_remaining() {
                        // attempts includes the lease just consumed.
                        let delay = self.retry.delay_for(failed.attempts.saturating_sub(1));
                        let delay =
                            Duration::from_std(delay).unwrap_or_else(|_| Duration::seconds(300));
                        self.queue
                            .retry(&task.id, delay)
                            .await
                            .map_err(queue_err)?;
                        report.retried += 1;
                        warn!(
                            task_id = %task.id,
                            attempts = failed.attempts,
                            error = %e,
                            "task failed, rescheduled"
                        );
                    } else {
                        let terminal = LifecycleError::ExhaustedRetries {
                            attempts: failed.attempts,
                            last_error: e.to_string(),
                        };
                        error!(task_id = %task.id, error = %terminal, "task exhausted retries");
                        handler.on_exhausted(&failed).await;
                        report.exhausted.push(task.id);
                    }
                }
            }
        }

        info!(
            leased = report.leased,
            succeeded = report.succeeded,
            retried = report.retried,
            exhausted = report.exhausted.len(),
            "worker batch complete"
        );
        Ok(report)
    }
}

/// External metadata-extraction collaborator invoked for new documents.
#[async_trait]
pub trait EnrichmentProvider: Send + Sync {
    /// Produce extra metadata for a freshly ingested document. The returned
    /// object is merged into the document's metadata.
    async fn enrich(
        &self,
        document: &Document,
        file: &DocumentFile,
    ) -> Result<Value, LifecycleError>;
}

#[derive(Debug, Deserialize)]
struct EnrichmentPayload {
    document_id: DocumentId,
    file_id: FileId,
}

/// Runs enrichment for ingested documents and re-enters the state machine
/// with the result: success registers the document, exhausted retries mark
/// it processing-failed.
pub struct EnrichmentHandler {
    store: Arc<dyn DocumentStore>,
    machine: Arc<StateMachine>,
    provider: Arc<dyn EnrichmentProvider>,
}

impl EnrichmentHandler {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        machine: Arc<StateMachine>,
        provider: Arc<dyn EnrichmentProvider>,
    ) -> Self {
        Self {
            store,
            machine,
            provider,
        }
    }
}

#[async_trait]
impl TaskHandler for EnrichmentHandler {
    fn task_type(&self) -> TaskType {
        TaskType::Enrichment
    }

    #[instrument(skip(self, task), fields(task_id = %task.id))]
    async fn handle(&self, task: &QueueTask) -> Result<(), LifecycleError> {
        let payload: EnrichmentPayload = serde_json::from_value(task.payload.clone())
            .map_err(|e| LifecycleError::Validation(format!("bad enrichment payload: {e}")))?;

        let mut document = self
            .store
            .get(payload.document_id)
            .await
            .map_err(store_err)?
            .ok_or_else(|| LifecycleError::NotFound(payload.document_id.to_string()))?;

        let file = self
            .store
            .files_for(payload.document_id)
            .await
            .map_err(store_err)?
            .into_iter()
            .find(|f| f.id == payload.file_id)
            .ok_or_else(|| LifecycleError::NotFound(payload.file_id.to_string()))?;

        let extracted = self.provider.enrich(&document, &file).await?;

        if let (Some(target), Some(source)) = (document.metadata.as_object_mut(), extracted.as_object()) {
            for (key, value) in source {
                target.insert(key.clone(), value.clone());
            }
        } else if !extracted.is_null() {
            document.metadata = extracted;
        }
        self.store.update(&document).await.map_err(store_err)?;

        self.machine
            .transition(
                document.id,
                DocumentStatus::Registered,
                Actor::System,
                Some("enrichment complete".into()),
            )
            .await?;
        Ok(())
    }

    async fn on_exhausted(&self, task: &QueueTask) {
        let Ok(payload) = serde_json::from_value::<EnrichmentPayload>(task.payload.clone()) else {
            return;
        };
        if let Err(e) = self
            .machine
            .transition(
                payload.document_id,
                DocumentStatus::ProcessingFailed,
                Actor::System,
                Some("enrichment exhausted retries".into()),
            )
            .await
        {
            error!(
                document_id = %payload.document_id,
                error = %e,
                "failed to mark document processing-failed"
            );
        }
    }
}

#[derive(Debug, Deserialize)]
struct LifecycleCheckPayload {
    document_id: DocumentId,
}

/// Evaluates one document's retention schedule on demand.
///
/// The queue-driven counterpart of the full sweep: a scheduler can enqueue
/// per-document checks instead of scanning the whole population.
pub struct LifecycleCheckHandler {
    store: Arc<dyn DocumentStore>,
    machine: Arc<StateMachine>,
}

impl LifecycleCheckHandler {
    pub fn new(store: Arc<dyn DocumentStore>, machine: Arc<StateMachine>) -> Self {
        Self { store, machine }
    }
}

#[async_trait]
impl TaskHandler for LifecycleCheckHandler {
    fn task_type(&self) -> TaskType {
        TaskType::LifecycleCheck
    }

    #[instrument(skip(self, task), fields(task_id = %task.id))]
    async fn handle(&self, task: &QueueTask) -> Result<(), LifecycleError> {
        let payload: LifecycleCheckPayload = serde_json::from_value(task.payload.clone())
            .map_err(|e| LifecycleError::Validation(format!("bad lifecycle payload: {e}")))?;

        let document = self
            .store
            .get(payload.document_id)
            .await
            .map_err(store_err)?
            .ok_or_else(|| LifecycleError::NotFound(payload.document_id.to_string()))?;

        let today = chrono::Utc::now().date_naive();
        let target = match classify_document(&document, today) {
            Disposition::Transfer => DocumentStatus::AwaitingTransfer,
            Disposition::Destroy => DocumentStatus::Destroy,
            Disposition::Review => DocumentStatus::Review,
            Disposition::None => return Ok(()),
        };

        match self
            .machine
            .transition(
                document.id,
                target,
                Actor::System,
                Some("lifecycle check".into()),
            )
            .await
        {
            // Another writer got there first; the check's goal is met.
            Ok(_) | Err(LifecycleError::Conflict(_) | LifecycleError::InvalidTransition { .. }) => {
                Ok(())
            }
            Err(other) => Err(other),
        }
    }
}
