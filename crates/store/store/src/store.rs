use async_trait::async_trait;
use chrono::{DateTime, Utc};

use openarchive_core::{Document, DocumentFile, DocumentId, DocumentStatus, FileId};

use crate::error::StoreError;

/// Result of a conditional status write.
#[derive(Debug, Clone)]
pub enum StatusCas {
    /// The expected status matched and the new status is stored. Carries the
    /// document as re-read after the write.
    Applied(Document),
    /// A concurrent writer changed the status first.
    Conflict {
        /// The status actually found at write time.
        current: DocumentStatus,
    },
}

/// Trait for persisting documents and their files.
///
/// Implementations must be `Send + Sync` and safe for concurrent access.
/// The only mutation path for `status` is [`compare_and_set_status`]; plain
/// [`update`] must never touch it. Document rows past intake are never
/// deleted; [`delete`] exists solely for saga compensation of half-created
/// `INGESTING` rows.
///
/// [`compare_and_set_status`]: DocumentStore::compare_and_set_status
/// [`update`]: DocumentStore::update
/// [`delete`]: DocumentStore::delete
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Insert a new document row.
    async fn insert(&self, document: Document) -> Result<(), StoreError>;

    /// Fetch a document by id. Returns `None` if it does not exist.
    async fn get(&self, id: DocumentId) -> Result<Option<Document>, StoreError>;

    /// Overwrite a document's non-status fields (metadata edits). The stored
    /// status is preserved regardless of the status carried by `document`.
    async fn update(&self, document: &Document) -> Result<(), StoreError>;

    /// Atomically set `new` only if the stored status still equals
    /// `expected`. This is the optimistic-concurrency point for every
    /// transition: two racing writers cannot both succeed.
    async fn compare_and_set_status(
        &self,
        id: DocumentId,
        expected: DocumentStatus,
        new: DocumentStatus,
        updated_at: DateTime<Utc>,
    ) -> Result<StatusCas, StoreError>;

    /// List documents whose status is in `statuses`.
    async fn list_by_status(
        &self,
        statuses: &[DocumentStatus],
    ) -> Result<Vec<Document>, StoreError>;

    /// Total document rows. Used by integrity checks and tests.
    async fn count(&self) -> Result<u64, StoreError>;

    /// Delete a document row. Saga compensation only; returns `true` if the
    /// row existed.
    async fn delete(&self, id: DocumentId) -> Result<bool, StoreError>;

    /// Insert a file row.
    async fn insert_file(&self, file: DocumentFile) -> Result<(), StoreError>;

    /// List the file rows owned by a document.
    async fn files_for(&self, document_id: DocumentId) -> Result<Vec<DocumentFile>, StoreError>;

    /// Total file rows.
    async fn file_count(&self) -> Result<u64, StoreError>;

    /// Delete a file row. Saga compensation only; returns `true` if the row
    /// existed.
    async fn delete_file(&self, id: FileId) -> Result<bool, StoreError>;
}
