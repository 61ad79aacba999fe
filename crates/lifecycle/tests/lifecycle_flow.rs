//! End-to-end lifecycle tests over the in-memory backends.
//!
//! These cover the cross-crate behavior the unit tests cannot: saga
//! compensation, transition/audit linkage, sweep idempotency and the
//! worker retry loop.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{NaiveDate, Utc};
use serde_json::{json, Value};

use openarchive_audit::{AuditError, AuditLog, AuditStore};
use openarchive_audit_memory::MemoryAuditStore;
use openarchive_blob::{BlobError, MemoryObjectStore, ObjectStore};
use openarchive_core::{
    Actor, Document, DocumentFile, DocumentId, DocumentStatus, LifecycleError, NewDocument,
    RetentionCategory,
};
use openarchive_lifecycle::{
    EnrichmentHandler, EnrichmentProvider, IngestFile, IngestionSaga, LifecycleScanner,
    NullNotifier, RetryStrategy, StateMachine, TaskHandler, Worker,
};
use openarchive_queue::{NewTask, QueueTask, TaskQueue, TaskType};
use openarchive_queue_memory::MemoryTaskQueue;
use openarchive_store::DocumentStore;
use openarchive_store_memory::MemoryDocumentStore;

const BUCKET: &str = "archive-files";

// -- Harness --

struct Harness {
    store: Arc<MemoryDocumentStore>,
    blob: Arc<MemoryObjectStore>,
    queue: Arc<MemoryTaskQueue>,
    audit_store: Arc<MemoryAuditStore>,
    audit: Arc<AuditLog>,
    machine: Arc<StateMachine>,
}

impl Harness {
    fn new() -> Self {
        let store = Arc::new(MemoryDocumentStore::new());
        let blob = Arc::new(MemoryObjectStore::new());
        let queue = Arc::new(MemoryTaskQueue::new());
        let audit_store = Arc::new(MemoryAuditStore::new());
        let audit = Arc::new(AuditLog::new(audit_store.clone()));
        let machine = Arc::new(StateMachine::new(
            store.clone(),
            audit.clone(),
            queue.clone(),
            Arc::new(NullNotifier),
        ));
        Self {
            store,
            blob,
            queue,
            audit_store,
            audit,
            machine,
        }
    }

    fn saga(&self) -> IngestionSaga {
        IngestionSaga::new(
            self.store.clone(),
            self.blob.clone(),
            self.queue.clone(),
            self.audit.clone(),
            BUCKET,
        )
    }

    fn saga_with_blob(&self, blob: Arc<dyn ObjectStore>) -> IngestionSaga {
        IngestionSaga::new(
            self.store.clone(),
            blob,
            self.queue.clone(),
            self.audit.clone(),
            BUCKET,
        )
    }

    /// Insert a document directly with a chosen status, bypassing the saga.
    async fn seed_document(
        &self,
        status: DocumentStatus,
        category: RetentionCategory,
        creation_date: NaiveDate,
    ) -> Document {
        let mut document = NewDocument {
            title: "Seeded record".into(),
            description: None,
            retention_category: category,
            creation_date,
            metadata: json!({}),
            tags: vec![],
        }
        .into_document(Utc::now());
        document.status = status;
        self.store.insert(document.clone()).await.unwrap();
        document
    }
}

fn new_document() -> NewDocument {
    NewDocument {
        title: "Planning committee minutes".into(),
        description: Some("Q1 meeting records".into()),
        retention_category: RetentionCategory::Y10,
        creation_date: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
        metadata: json!({"agency": "planning"}),
        tags: vec!["minutes".into()],
    }
}

fn ingest_file() -> IngestFile {
    IngestFile {
        file_name: "minutes.pdf".into(),
        content_type: "application/pdf".into(),
        data: Bytes::from_static(b"%PDF-1.4 minutes"),
    }
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

// -- Failing / recording collaborators --

struct FailingObjectStore;

#[async_trait]
impl ObjectStore for FailingObjectStore {
    async fn put(
        &self,
        _bucket: &str,
        _key: &str,
        _content_type: &str,
        _data: Bytes,
    ) -> Result<openarchive_blob::ObjectMetadata, BlobError> {
        Err(BlobError::Storage("upload refused".into()))
    }

    async fn get(
        &self,
        _bucket: &str,
        _key: &str,
    ) -> Result<Option<(openarchive_blob::ObjectMetadata, Bytes)>, BlobError> {
        Ok(None)
    }

    async fn head(
        &self,
        _bucket: &str,
        _key: &str,
    ) -> Result<Option<openarchive_blob::ObjectMetadata>, BlobError> {
        Ok(None)
    }

    async fn delete(&self, _bucket: &str, _key: &str) -> Result<bool, BlobError> {
        Ok(false)
    }

    async fn presign(
        &self,
        bucket: &str,
        key: &str,
        _expires_in: chrono::Duration,
    ) -> Result<openarchive_blob::PresignedUrl, BlobError> {
        Err(BlobError::NotFound {
            bucket: bucket.into(),
            key: key.into(),
        })
    }
}

/// Audit store that refuses every insert. Reads delegate to an inner store.
struct RefusingAuditStore {
    inner: MemoryAuditStore,
}

#[async_trait]
impl AuditStore for RefusingAuditStore {
    async fn insert(&self, _entry: openarchive_audit::AuditEntry) -> Result<(), AuditError> {
        Err(AuditError::Storage("audit backend down".into()))
    }

    async fn latest(&self) -> Result<Option<openarchive_audit::AuditEntry>, AuditError> {
        self.inner.latest().await
    }

    async fn get_by_id(
        &self,
        id: &str,
    ) -> Result<Option<openarchive_audit::AuditEntry>, AuditError> {
        self.inner.get_by_id(id).await
    }

    async fn range(
        &self,
        from_sequence: u64,
        limit: u32,
    ) -> Result<Vec<openarchive_audit::AuditEntry>, AuditError> {
        self.inner.range(from_sequence, limit).await
    }

    async fn count(&self) -> Result<u64, AuditError> {
        self.inner.count().await
    }

    async fn query(
        &self,
        query: &openarchive_audit::AuditQuery,
    ) -> Result<openarchive_audit::AuditPage, AuditError> {
        self.inner.query(query).await
    }
}

/// Records compensation deletes, shared between store and blob wrappers.
type OpLog = Arc<Mutex<Vec<String>>>;

struct RecordingStore {
    inner: Arc<MemoryDocumentStore>,
    ops: OpLog,
}

#[async_trait]
impl DocumentStore for RecordingStore {
    async fn insert(&self, document: Document) -> Result<(), openarchive_store::StoreError> {
        self.inner.insert(document).await
    }

    async fn get(
        &self,
        id: DocumentId,
    ) -> Result<Option<Document>, openarchive_store::StoreError> {
        self.inner.get(id).await
    }

    async fn update(&self, document: &Document) -> Result<(), openarchive_store::StoreError> {
        self.inner.update(document).await
    }

    async fn compare_and_set_status(
        &self,
        id: DocumentId,
        expected: DocumentStatus,
        new: DocumentStatus,
        updated_at: chrono::DateTime<Utc>,
    ) -> Result<openarchive_store::StatusCas, openarchive_store::StoreError> {
        self.inner
            .compare_and_set_status(id, expected, new, updated_at)
            .await
    }

    async fn list_by_status(
        &self,
        statuses: &[DocumentStatus],
    ) -> Result<Vec<Document>, openarchive_store::StoreError> {
        self.inner.list_by_status(statuses).await
    }

    async fn count(&self) -> Result<u64, openarchive_store::StoreError> {
        self.inner.count().await
    }

    async fn delete(&self, id: DocumentId) -> Result<bool, openarchive_store::StoreError> {
        self.ops.lock().unwrap().push("delete_document".into());
        self.inner.delete(id).await
    }

    async fn insert_file(&self, file: DocumentFile) -> Result<(), openarchive_store::StoreError> {
        self.inner.insert_file(file).await
    }

    async fn files_for(
        &self,
        document_id: DocumentId,
    ) -> Result<Vec<DocumentFile>, openarchive_store::StoreError> {
        self.inner.files_for(document_id).await
    }

    async fn file_count(&self) -> Result<u64, openarchive_store::StoreError> {
        self.inner.file_count().await
    }

    async fn delete_file(
        &self,
        id: openarchive_core::FileId,
    ) -> Result<bool, openarchive_store::StoreError> {
        self.ops.lock().unwrap().push("delete_file".into());
        self.inner.delete_file(id).await
    }
}

/// Lets the first status CAS through, then reports every later CAS as lost
/// to a concurrent writer.
struct ContestedCasStore {
    inner: Arc<MemoryDocumentStore>,
    cas_calls: AtomicU32,
}

#[async_trait]
impl DocumentStore for ContestedCasStore {
    async fn insert(&self, document: Document) -> Result<(), openarchive_store::StoreError> {
        self.inner.insert(document).await
    }

    async fn get(
        &self,
        id: DocumentId,
    ) -> Result<Option<Document>, openarchive_store::StoreError> {
        self.inner.get(id).await
    }

    async fn update(&self, document: &Document) -> Result<(), openarchive_store::StoreError> {
        self.inner.update(document).await
    }

    async fn compare_and_set_status(
        &self,
        id: DocumentId,
        expected: DocumentStatus,
        new: DocumentStatus,
        updated_at: chrono::DateTime<Utc>,
    ) -> Result<openarchive_store::StatusCas, openarchive_store::StoreError> {
        if self.cas_calls.fetch_add(1, Ordering::SeqCst) == 0 {
            self.inner
                .compare_and_set_status(id, expected, new, updated_at)
                .await
        } else {
            Ok(openarchive_store::StatusCas::Conflict {
                current: DocumentStatus::Review,
            })
        }
    }

    async fn list_by_status(
        &self,
        statuses: &[DocumentStatus],
    ) -> Result<Vec<Document>, openarchive_store::StoreError> {
        self.inner.list_by_status(statuses).await
    }

    async fn count(&self) -> Result<u64, openarchive_store::StoreError> {
        self.inner.count().await
    }

    async fn delete(&self, id: DocumentId) -> Result<bool, openarchive_store::StoreError> {
        self.inner.delete(id).await
    }

    async fn insert_file(&self, file: DocumentFile) -> Result<(), openarchive_store::StoreError> {
        self.inner.insert_file(file).await
    }

    async fn files_for(
        &self,
        document_id: DocumentId,
    ) -> Result<Vec<DocumentFile>, openarchive_store::StoreError> {
        self.inner.files_for(document_id).await
    }

    async fn file_count(&self) -> Result<u64, openarchive_store::StoreError> {
        self.inner.file_count().await
    }

    async fn delete_file(
        &self,
        id: openarchive_core::FileId,
    ) -> Result<bool, openarchive_store::StoreError> {
        self.inner.delete_file(id).await
    }
}

struct RecordingBlob {
    inner: MemoryObjectStore,
    ops: OpLog,
}

#[async_trait]
impl ObjectStore for RecordingBlob {
    async fn put(
        &self,
        bucket: &str,
        key: &str,
        content_type: &str,
        data: Bytes,
    ) -> Result<openarchive_blob::ObjectMetadata, BlobError> {
        self.inner.put(bucket, key, content_type, data).await
    }

    async fn get(
        &self,
        bucket: &str,
        key: &str,
    ) -> Result<Option<(openarchive_blob::ObjectMetadata, Bytes)>, BlobError> {
        self.inner.get(bucket, key).await
    }

    async fn head(
        &self,
        bucket: &str,
        key: &str,
    ) -> Result<Option<openarchive_blob::ObjectMetadata>, BlobError> {
        self.inner.head(bucket, key).await
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<bool, BlobError> {
        self.ops.lock().unwrap().push("delete_object".into());
        self.inner.delete(bucket, key).await
    }

    async fn presign(
        &self,
        bucket: &str,
        key: &str,
        expires_in: chrono::Duration,
    ) -> Result<openarchive_blob::PresignedUrl, BlobError> {
        self.inner.presign(bucket, key, expires_in).await
    }
}

// -- Saga --

mod saga {
    use super::*;

    #[tokio::test]
    async fn successful_ingestion_creates_everything() {
        let h = Harness::new();
        let ingested = h
            .saga()
            .create_document(new_document(), ingest_file(), Actor::System)
            .await
            .unwrap();

        assert_eq!(ingested.document.status, DocumentStatus::Ingesting);
        assert_eq!(
            ingested.document.retention_end_date,
            date(2030, 1, 1)
        );

        // Stored object matches the file row's checksum.
        let (meta, data) = h
            .blob
            .get(BUCKET, &ingested.file.storage_key)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(meta.checksum_sha256, ingested.file.checksum);
        assert_eq!(data, Bytes::from_static(b"%PDF-1.4 minutes"));

        // Enrichment task queued at priority 7.
        let task = h.queue.get(&ingested.enrichment_task).await.unwrap().unwrap();
        assert_eq!(task.task_type, TaskType::Enrichment);
        assert_eq!(task.priority, 7);

        // One audit entry describing the upload.
        let trail = h
            .audit
            .entity_trail("document", &ingested.document.id.to_string())
            .await
            .unwrap();
        assert_eq!(trail.len(), 1);
        assert_eq!(trail[0].action, "document.uploaded");
    }

    #[tokio::test]
    async fn failed_upload_leaves_no_rows() {
        let h = Harness::new();
        let saga = h.saga_with_blob(Arc::new(FailingObjectStore));

        let result = saga
            .create_document(new_document(), ingest_file(), Actor::System)
            .await;

        assert!(matches!(
            result,
            Err(LifecycleError::ExternalDependency(_))
        ));
        assert_eq!(h.store.count().await.unwrap(), 0);
        assert_eq!(h.store.file_count().await.unwrap(), 0);
        assert!(h.audit_store.count().await.unwrap() == 0);
    }

    #[tokio::test]
    async fn compensation_unwinds_in_reverse_order() {
        let ops: OpLog = Arc::new(Mutex::new(Vec::new()));
        let inner_store = Arc::new(MemoryDocumentStore::new());
        let store = Arc::new(RecordingStore {
            inner: inner_store.clone(),
            ops: ops.clone(),
        });
        let blob = Arc::new(RecordingBlob {
            inner: MemoryObjectStore::new(),
            ops: ops.clone(),
        });
        let queue = Arc::new(MemoryTaskQueue::new());
        // Audit refuses the final append, forcing a full unwind.
        let audit = Arc::new(AuditLog::new(Arc::new(RefusingAuditStore {
            inner: MemoryAuditStore::new(),
        })));

        let saga = IngestionSaga::new(store, blob, queue, audit, BUCKET);
        let result = saga
            .create_document(new_document(), ingest_file(), Actor::System)
            .await;
        assert!(result.is_err());

        let ops = ops.lock().unwrap().clone();
        assert_eq!(ops, vec!["delete_file", "delete_object", "delete_document"]);
        assert_eq!(inner_store.count().await.unwrap(), 0);
        assert_eq!(inner_store.file_count().await.unwrap(), 0);
    }
}

// -- State machine --

mod transitions {
    use super::*;

    #[tokio::test]
    async fn transition_writes_audit_entry() {
        let h = Harness::new();
        let doc = h
            .seed_document(
                DocumentStatus::Registered,
                RetentionCategory::Y10,
                date(2020, 1, 1),
            )
            .await;

        let updated = h
            .machine
            .transition(
                doc.id,
                DocumentStatus::ActiveStorage,
                Actor::user("u-1", "archivist@example.gov"),
                Some("intake complete".into()),
            )
            .await
            .unwrap();
        assert_eq!(updated.status, DocumentStatus::ActiveStorage);

        let trail = h
            .audit
            .entity_trail("document", &doc.id.to_string())
            .await
            .unwrap();
        assert_eq!(trail.len(), 1);
        assert_eq!(trail[0].action, "document.status_changed");
        assert_eq!(trail[0].details["from"], "REGISTERED");
        assert_eq!(trail[0].details["to"], "ACTIVE_STORAGE");
    }

    #[tokio::test]
    async fn invalid_edge_is_rejected() {
        let h = Harness::new();
        let doc = h
            .seed_document(
                DocumentStatus::Ingesting,
                RetentionCategory::Y10,
                date(2020, 1, 1),
            )
            .await;

        let result = h
            .machine
            .transition(doc.id, DocumentStatus::Destroyed, Actor::System, None)
            .await;
        assert!(matches!(
            result,
            Err(LifecycleError::InvalidTransition {
                from: DocumentStatus::Ingesting,
                to: DocumentStatus::Destroyed,
            })
        ));
    }

    #[tokio::test]
    async fn missing_document_is_not_found() {
        let h = Harness::new();
        let result = h
            .machine
            .transition(
                DocumentId::new(),
                DocumentStatus::Registered,
                Actor::System,
                None,
            )
            .await;
        assert!(matches!(result, Err(LifecycleError::NotFound(_))));
    }

    #[tokio::test]
    async fn concurrent_transitions_have_one_winner() {
        let h = Harness::new();
        let doc = h
            .seed_document(
                DocumentStatus::ActiveStorage,
                RetentionCategory::Y10,
                date(2020, 1, 1),
            )
            .await;

        let (a, b) = tokio::join!(
            h.machine
                .transition(doc.id, DocumentStatus::Review, Actor::System, None),
            h.machine
                .transition(doc.id, DocumentStatus::Review, Actor::System, None),
        );

        let winners = [&a, &b].iter().filter(|r| r.is_ok()).count();
        assert_eq!(winners, 1);
        let loser = if a.is_err() { a } else { b };
        assert!(matches!(
            loser,
            Err(LifecycleError::Conflict(_) | LifecycleError::InvalidTransition { .. })
        ));

        let stored = h.store.get(doc.id).await.unwrap().unwrap();
        assert_eq!(stored.status, DocumentStatus::Review);
    }

    #[tokio::test]
    async fn failed_audit_append_reverts_the_transition() {
        let store = Arc::new(MemoryDocumentStore::new());
        let queue = Arc::new(MemoryTaskQueue::new());
        let audit = Arc::new(AuditLog::new(Arc::new(RefusingAuditStore {
            inner: MemoryAuditStore::new(),
        })));
        let machine = StateMachine::new(
            store.clone(),
            audit,
            queue,
            Arc::new(NullNotifier),
        );

        let mut doc = new_document().into_document(Utc::now());
        doc.status = DocumentStatus::Registered;
        store.insert(doc.clone()).await.unwrap();

        let result = machine
            .transition(doc.id, DocumentStatus::ActiveStorage, Actor::System, None)
            .await;
        assert!(matches!(
            result,
            Err(LifecycleError::ExternalDependency(_))
        ));

        // The unaudited status change did not persist.
        let stored = store.get(doc.id).await.unwrap().unwrap();
        assert_eq!(stored.status, DocumentStatus::Registered);
    }

    #[tokio::test]
    async fn contested_revert_still_surfaces_the_audit_error() {
        let inner = Arc::new(MemoryDocumentStore::new());
        let store = Arc::new(ContestedCasStore {
            inner: inner.clone(),
            cas_calls: AtomicU32::new(0),
        });
        let queue = Arc::new(MemoryTaskQueue::new());
        let audit = Arc::new(AuditLog::new(Arc::new(RefusingAuditStore {
            inner: MemoryAuditStore::new(),
        })));
        let machine = StateMachine::new(store, audit, queue, Arc::new(NullNotifier));

        let mut doc = new_document().into_document(Utc::now());
        doc.status = DocumentStatus::Registered;
        inner.insert(doc.clone()).await.unwrap();

        // Audit append fails and the revert loses its own race; the caller
        // still sees the append failure, not the revert outcome.
        let result = machine
            .transition(doc.id, DocumentStatus::ActiveStorage, Actor::System, None)
            .await;
        assert!(matches!(
            result,
            Err(LifecycleError::ExternalDependency(_))
        ));
    }

    #[tokio::test]
    async fn entering_awaiting_transfer_enqueues_transfer_prep() {
        let h = Harness::new();
        let doc = h
            .seed_document(
                DocumentStatus::ActiveStorage,
                RetentionCategory::Permanent,
                date(1000, 1, 1),
            )
            .await;

        h.machine
            .transition(doc.id, DocumentStatus::AwaitingTransfer, Actor::System, None)
            .await
            .unwrap();

        let leased = h
            .queue
            .lease(Some(&[TaskType::TransferPrep]), 10)
            .await
            .unwrap();
        assert_eq!(leased.len(), 1);
        assert_eq!(leased[0].priority, 3);
        assert_eq!(leased[0].payload["document_id"], json!(doc.id));
    }
}

// -- Audit chain --

mod audit_chain {
    use super::*;
    use openarchive_audit::{Checkpoint, FaultReason, NewEntry};

    async fn append_n(h: &Harness, n: u64) {
        for i in 0..n {
            h.audit
                .append(NewEntry::new(
                    "document.status_changed",
                    "document",
                    Some(format!("d-{i}")),
                    Actor::System,
                    json!({"step": i}),
                ))
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn untouched_chain_verifies_valid() {
        let h = Harness::new();
        append_n(&h, 5).await;

        let report = h.audit.verify_integrity().await.unwrap();
        assert!(report.valid);
        assert_eq!(report.entries_checked, 5);
        assert!(report.first_invalid.is_none());
    }

    #[tokio::test]
    async fn tampered_entry_is_reported_first() {
        let h = Harness::new();
        append_n(&h, 5).await;

        assert!(h.audit_store.corrupt_details(3, json!({"step": "forged"})));

        let report = h.audit.verify_integrity().await.unwrap();
        assert!(!report.valid);
        let fault = report.first_invalid.unwrap();
        assert_eq!(fault.sequence, 3);
        assert_eq!(fault.reason, FaultReason::HashMismatch);
    }

    #[tokio::test]
    async fn checkpoint_resumes_verification() {
        let h = Harness::new();
        append_n(&h, 4).await;

        let second = h.audit.store().range(2, 1).await.unwrap().remove(0);
        let checkpoint = Checkpoint {
            sequence: second.sequence,
            hash: second.hash,
        };

        let report = h.audit.verify_integrity_from(&checkpoint).await.unwrap();
        assert!(report.valid);
        assert_eq!(report.entries_checked, 2);
    }
}

// -- Scanner --

mod scanner {
    use super::*;

    fn scanner(h: &Harness) -> LifecycleScanner {
        LifecycleScanner::new(h.store.clone(), h.machine.clone())
    }

    #[tokio::test]
    async fn check_buckets_documents_by_disposition() {
        let h = Harness::new();
        let permanent = h
            .seed_document(
                DocumentStatus::ActiveStorage,
                RetentionCategory::Permanent,
                date(1000, 1, 1),
            )
            .await;
        let expired = h
            .seed_document(
                DocumentStatus::ActiveStorage,
                RetentionCategory::Y3,
                date(2020, 1, 1),
            )
            .await;
        let in_window = h
            .seed_document(
                DocumentStatus::ActiveStorage,
                RetentionCategory::Y10,
                date(2020, 1, 1),
            )
            .await;
        // Far from any deadline.
        h.seed_document(
            DocumentStatus::ActiveStorage,
            RetentionCategory::Y30,
            date(2020, 1, 1),
        )
        .await;

        let report = scanner(&h)
            .check_document_lifecycles(date(2029, 8, 1))
            .await
            .unwrap();
        assert_eq!(report.to_transfer, vec![permanent.id]);
        assert_eq!(report.to_destroy, vec![expired.id]);
        assert_eq!(report.pending_review, vec![in_window.id]);
    }

    #[tokio::test]
    async fn sweep_applies_and_is_idempotent() {
        let h = Harness::new();
        let permanent = h
            .seed_document(
                DocumentStatus::ActiveStorage,
                RetentionCategory::Permanent,
                date(1000, 1, 1),
            )
            .await;
        let expired = h
            .seed_document(
                DocumentStatus::ActiveStorage,
                RetentionCategory::Y3,
                date(2020, 1, 1),
            )
            .await;
        let in_window = h
            .seed_document(
                DocumentStatus::ActiveStorage,
                RetentionCategory::Y10,
                date(2020, 1, 1),
            )
            .await;

        let scanner = scanner(&h);
        let today = date(2029, 8, 1);

        let first = scanner.run_sweep(today).await.unwrap();
        assert_eq!(first.to_transfer, 1);
        assert_eq!(first.to_destroy, 1);
        assert_eq!(first.to_review, 1);
        assert_eq!(first.skipped, 0);

        let statuses = [
            (permanent.id, DocumentStatus::AwaitingTransfer),
            (expired.id, DocumentStatus::Destroy),
            (in_window.id, DocumentStatus::Review),
        ];
        for (id, expected) in statuses {
            assert_eq!(h.store.get(id).await.unwrap().unwrap().status, expected);
        }

        // The same day again: everything already moved, nothing to do.
        let second = scanner.run_sweep(today).await.unwrap();
        assert_eq!(second, openarchive_lifecycle::SweepOutcome::default());
        for (id, expected) in statuses {
            assert_eq!(h.store.get(id).await.unwrap().unwrap().status, expected);
        }
    }
}

// -- Worker --

mod worker {
    use super::*;

    /// Fails the first `fail_times` calls, then succeeds.
    struct FlakyHandler {
        calls: AtomicU32,
        fail_times: u32,
    }

    #[async_trait]
    impl TaskHandler for FlakyHandler {
        fn task_type(&self) -> TaskType {
            TaskType::Ocr
        }

        async fn handle(&self, _task: &QueueTask) -> Result<(), LifecycleError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.fail_times {
                Err(LifecycleError::ExternalDependency("ocr timeout".into()))
            } else {
                Ok(())
            }
        }
    }

    fn worker(queue: Arc<MemoryTaskQueue>, handler: Arc<dyn TaskHandler>) -> Worker {
        let mut worker = Worker::new(
            queue,
            RetryStrategy::Constant {
                delay: StdDuration::ZERO,
            },
            10,
        );
        worker.register(handler);
        worker
    }

    #[tokio::test]
    async fn flaky_task_succeeds_within_attempt_cap() {
        let queue = Arc::new(MemoryTaskQueue::new());
        let task = queue
            .enqueue(NewTask::new(TaskType::Ocr, 5, json!({})))
            .await
            .unwrap();

        let worker = worker(
            queue.clone(),
            Arc::new(FlakyHandler {
                calls: AtomicU32::new(0),
                fail_times: 2,
            }),
        );

        assert_eq!(worker.run_once().await.unwrap().retried, 1);
        assert_eq!(worker.run_once().await.unwrap().retried, 1);
        let third = worker.run_once().await.unwrap();
        assert_eq!(third.succeeded, 1);

        let stored = queue.get(&task.id).await.unwrap().unwrap();
        assert_eq!(stored.status, openarchive_queue::TaskStatus::Completed);
        assert_eq!(stored.attempts, 3);
    }

    #[tokio::test]
    async fn exhausted_task_stays_failed() {
        let queue = Arc::new(MemoryTaskQueue::new());
        let task = queue
            .enqueue(NewTask::new(TaskType::Ocr, 5, json!({})).with_max_attempts(2))
            .await
            .unwrap();

        let worker = worker(
            queue.clone(),
            Arc::new(FlakyHandler {
                calls: AtomicU32::new(0),
                fail_times: u32::MAX,
            }),
        );

        assert_eq!(worker.run_once().await.unwrap().retried, 1);
        let second = worker.run_once().await.unwrap();
        assert_eq!(second.exhausted, vec![task.id]);

        let stored = queue.get(&task.id).await.unwrap().unwrap();
        assert_eq!(stored.status, openarchive_queue::TaskStatus::Failed);
        assert_eq!(stored.last_error.as_deref(), Some("external dependency error: ocr timeout"));

        // Terminal: nothing left to lease.
        let third = worker.run_once().await.unwrap();
        assert_eq!(third.leased, 0);
    }

    #[tokio::test]
    async fn worker_only_leases_registered_types() {
        let queue = Arc::new(MemoryTaskQueue::new());
        queue
            .enqueue(NewTask::new(TaskType::Redaction, 9, json!({})))
            .await
            .unwrap();
        let ocr = queue
            .enqueue(NewTask::new(TaskType::Ocr, 1, json!({})))
            .await
            .unwrap();

        let worker = worker(
            queue.clone(),
            Arc::new(FlakyHandler {
                calls: AtomicU32::new(0),
                fail_times: 0,
            }),
        );
        let report = worker.run_once().await.unwrap();
        assert_eq!(report.leased, 1);
        assert_eq!(report.succeeded, 1);
        assert_eq!(
            queue.get(&ocr.id).await.unwrap().unwrap().status,
            openarchive_queue::TaskStatus::Completed
        );
    }
}

// -- Enrichment --

mod enrichment {
    use super::*;

    struct StubEnrichment {
        result: Result<Value, ()>,
    }

    #[async_trait]
    impl EnrichmentProvider for StubEnrichment {
        async fn enrich(
            &self,
            _document: &Document,
            _file: &DocumentFile,
        ) -> Result<Value, LifecycleError> {
            self.result
                .clone()
                .map_err(|()| LifecycleError::ExternalDependency("enrichment offline".into()))
        }
    }

    fn enrichment_worker(h: &Harness, provider: StubEnrichment) -> Worker {
        let handler = Arc::new(EnrichmentHandler::new(
            h.store.clone(),
            h.machine.clone(),
            Arc::new(provider),
        ));
        let mut worker = Worker::new(
            h.queue.clone(),
            RetryStrategy::Constant {
                delay: StdDuration::ZERO,
            },
            10,
        );
        worker.register(handler);
        worker
    }

    #[tokio::test]
    async fn successful_enrichment_registers_document() {
        let h = Harness::new();
        let ingested = h
            .saga()
            .create_document(new_document(), ingest_file(), Actor::System)
            .await
            .unwrap();

        let worker = enrichment_worker(
            &h,
            StubEnrichment {
                result: Ok(json!({"pages": 3, "language": "en"})),
            },
        );
        let report = worker.run_once().await.unwrap();
        assert_eq!(report.succeeded, 1);

        let doc = h.store.get(ingested.document.id).await.unwrap().unwrap();
        assert_eq!(doc.status, DocumentStatus::Registered);
        assert_eq!(doc.metadata["pages"], 3);
        // Intake metadata survives the merge.
        assert_eq!(doc.metadata["agency"], "planning");
    }

    #[tokio::test]
    async fn exhausted_enrichment_marks_processing_failed() {
        let h = Harness::new();
        let ingested = h
            .saga()
            .create_document(new_document(), ingest_file(), Actor::System)
            .await
            .unwrap();

        let worker = enrichment_worker(&h, StubEnrichment { result: Err(()) });
        // Default max_attempts is 3.
        worker.run_once().await.unwrap();
        worker.run_once().await.unwrap();
        let last = worker.run_once().await.unwrap();
        assert_eq!(last.exhausted, vec![ingested.enrichment_task]);

        let doc = h.store.get(ingested.document.id).await.unwrap().unwrap();
        assert_eq!(doc.status, DocumentStatus::ProcessingFailed);
    }
}
