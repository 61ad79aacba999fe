use std::sync::Arc;

use bytes::Bytes;
use chrono::Utc;
use serde_json::json;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use openarchive_audit::{AuditLog, NewEntry};
use openarchive_blob::{checksum_sha256, ObjectStore};
use openarchive_core::{
    Actor, Document, DocumentFile, DocumentId, FileId, FileType, LifecycleError, NewDocument,
};
use openarchive_queue::{NewTask, TaskId, TaskQueue, TaskType};
use openarchive_store::DocumentStore;

use crate::error::{audit_err, blob_err, queue_err, store_err};

/// Queue priority for enrichment of a freshly ingested document.
pub const ENRICHMENT_PRIORITY: i32 = 7;

/// The upload being ingested alongside a [`NewDocument`].
#[derive(Debug, Clone)]
pub struct IngestFile {
    /// Original filename as uploaded.
    pub file_name: String,
    /// MIME content type.
    pub content_type: String,
    /// The raw bytes.
    pub data: Bytes,
}

/// What a successful ingestion produced.
#[derive(Debug, Clone)]
pub struct IngestedDocument {
    pub document: Document,
    pub file: DocumentFile,
    /// The enrichment task queued for the document.
    pub enrichment_task: TaskId,
}

/// Undo action for one completed forward step.
///
/// Pushed as each step commits; unwound in reverse on failure. Enqueues
/// are deliberately absent: an enrichment task for a document that no
/// longer exists fails harmlessly in the worker.
enum Compensation {
    DeleteDocument(DocumentId),
    DeleteObject { bucket: String, key: String },
    DeleteFile(FileId),
}

/// Orchestrates document ingestion as a saga.
///
/// Forward steps run in an order that keeps the cross-store invariants
/// true at every point: the object is uploaded before the file row that
/// references it exists, and the audit entry is written last so it only
/// ever describes a completed ingestion. On any failure the completed
/// steps are compensated in reverse and the original error is re-raised.
pub struct IngestionSaga {
    store: Arc<dyn DocumentStore>,
    blob: Arc<dyn ObjectStore>,
    queue: Arc<dyn TaskQueue>,
    audit: Arc<AuditLog>,
    bucket: String,
}

impl IngestionSaga {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        blob: Arc<dyn ObjectStore>,
        queue: Arc<dyn TaskQueue>,
        audit: Arc<AuditLog>,
        bucket: impl Into<String>,
    ) -> Self {
        Self {
            store,
            blob,
            queue,
            audit,
            bucket: bucket.into(),
        }
    }

    /// Ingest a new document with its original file.
    ///
    /// On success the document exists in `INGESTING` with exactly one file
    /// row, the bytes are in object storage under a derived key, an
    /// enrichment task is pending, and a `document.uploaded` audit entry
    /// records it all. On failure no document or file row survives.
    #[instrument(skip(self, document, file, actor), fields(title = %document.title))]
    pub async fn create_document(
        &self,
        document: NewDocument,
        file: IngestFile,
        actor: Actor,
    ) -> Result<IngestedDocument, LifecycleError> {
        let mut compensations: Vec<Compensation> = Vec::new();

        match self.run_forward(document, file, actor, &mut compensations).await {
            Ok(ingested) => Ok(ingested),
            Err(error) => {
                self.compensate(compensations).await;
                Err(error)
            }
        }
    }

    async fn run_forward(
        &self,
        document: NewDocument,
        file: IngestFile,
        actor: Actor,
        compensations: &mut Vec<Compensation>,
    ) -> Result<IngestedDocument, LifecycleError> {
        let now = Utc::now();

        let document = document.into_document(now);
        self.store
            .insert(document.clone())
            .await
            .map_err(store_err)?;
        compensations.push(Compensation::DeleteDocument(document.id));
        debug!(document_id = %document.id, "document row inserted");

        let checksum = checksum_sha256(&file.data);

        let key = storage_key(document.id, &file.file_name);
        let object = self
            .blob
            .put(&self.bucket, &key, &file.content_type, file.data)
            .await
            .map_err(blob_err)?;
        compensations.push(Compensation::DeleteObject {
            bucket: self.bucket.clone(),
            key: key.clone(),
        });

        let file_row = DocumentFile {
            id: FileId::new(),
            document_id: document.id,
            file_type: FileType::Original,
            file_name: file.file_name.clone(),
            storage_bucket: self.bucket.clone(),
            storage_key: key,
            content_type: file.content_type,
            checksum,
            size_bytes: object.size_bytes,
            created_at: now,
        };
        self.store
            .insert_file(file_row.clone())
            .await
            .map_err(store_err)?;
        compensations.push(Compensation::DeleteFile(file_row.id));

        let task = self
            .queue
            .enqueue(NewTask::new(
                TaskType::Enrichment,
                ENRICHMENT_PRIORITY,
                json!({
                    "document_id": document.id,
                    "file_id": file_row.id,
                }),
            ))
            .await
            .map_err(queue_err)?;

        self.audit
            .append(NewEntry::new(
                "document.uploaded",
                "document",
                Some(document.id.to_string()),
                actor,
                json!({
                    "file_name": file_row.file_name,
                    "checksum": file_row.checksum,
                    "size_bytes": file_row.size_bytes,
                }),
            ))
            .await
            .map_err(audit_err)?;

        debug!(document_id = %document.id, task_id = %task.id, "ingestion complete");
        Ok(IngestedDocument {
            document,
            file: file_row,
            enrichment_task: task.id,
        })
    }

    /// Unwind completed steps, newest first. Compensation failures are
    /// logged and never mask the error that triggered the unwind.
    async fn compensate(&self, compensations: Vec<Compensation>) {
        for step in compensations.into_iter().rev() {
            match step {
                Compensation::DeleteFile(id) => {
                    if let Err(e) = self.store.delete_file(id).await {
                        warn!(file_id = %id, error = %e, "saga compensation failed");
                    }
                }
                Compensation::DeleteObject { bucket, key } => {
                    if let Err(e) = self.blob.delete(&bucket, &key).await {
                        warn!(%bucket, %key, error = %e, "saga compensation failed");
                    }
                }
                Compensation::DeleteDocument(id) => {
                    if let Err(e) = self.store.delete(id).await {
                        warn!(document_id = %id, error = %e, "saga compensation failed");
                    }
                }
            }
        }
    }
}

/// Key for a document's original upload: a per-upload UUID keeps repeated
/// uploads of the same filename from colliding.
fn storage_key(document_id: DocumentId, file_name: &str) -> String {
    format!(
        "documents/{document_id}/original/{}-{file_name}",
        Uuid::new_v4()
    )
}
