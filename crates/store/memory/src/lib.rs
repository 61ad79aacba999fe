//! In-memory [`DocumentStore`] backed by [`DashMap`]. Suitable for
//! development and testing.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

use openarchive_core::{Document, DocumentFile, DocumentId, DocumentStatus, FileId};
use openarchive_store::{DocumentStore, StatusCas, StoreError};

/// In-memory document store.
///
/// Documents and files live in concurrent hash maps. The status
/// compare-and-set relies on `DashMap`'s per-entry locking: the guard from
/// `get_mut` holds the shard write lock for the whole read-compare-write,
/// so racing writers serialize and exactly one wins.
#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    documents: DashMap<DocumentId, Document>,
    files: DashMap<FileId, DocumentFile>,
}

impl MemoryDocumentStore {
    /// Create a new, empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn insert(&self, document: Document) -> Result<(), StoreError> {
        let id = document.id;
        if self.documents.contains_key(&id) {
            return Err(StoreError::Duplicate(id.to_string()));
        }
        self.documents.insert(id, document);
        Ok(())
    }

    async fn get(&self, id: DocumentId) -> Result<Option<Document>, StoreError> {
        Ok(self.documents.get(&id).map(|d| d.value().clone()))
    }

    async fn update(&self, document: &Document) -> Result<(), StoreError> {
        let mut entry = self
            .documents
            .get_mut(&document.id)
            .ok_or_else(|| StoreError::NotFound(document.id.to_string()))?;
        // Status is owned by compare_and_set_status; keep the stored value.
        let status = entry.status;
        *entry = document.clone();
        entry.status = status;
        Ok(())
    }

    async fn compare_and_set_status(
        &self,
        id: DocumentId,
        expected: DocumentStatus,
        new: DocumentStatus,
        updated_at: DateTime<Utc>,
    ) -> Result<StatusCas, StoreError> {
        let mut entry = self
            .documents
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        if entry.status != expected {
            return Ok(StatusCas::Conflict {
                current: entry.status,
            });
        }

        entry.status = new;
        entry.updated_at = updated_at;
        Ok(StatusCas::Applied(entry.clone()))
    }

    async fn list_by_status(
        &self,
        statuses: &[DocumentStatus],
    ) -> Result<Vec<Document>, StoreError> {
        let mut out: Vec<Document> = self
            .documents
            .iter()
            .filter(|entry| statuses.contains(&entry.value().status))
            .map(|entry| entry.value().clone())
            .collect();
        // Deterministic order for sweeps and tests.
        out.sort_by_key(|d| d.created_at);
        Ok(out)
    }

    async fn count(&self) -> Result<u64, StoreError> {
        Ok(self.documents.len() as u64)
    }

    async fn delete(&self, id: DocumentId) -> Result<bool, StoreError> {
        Ok(self.documents.remove(&id).is_some())
    }

    async fn insert_file(&self, file: DocumentFile) -> Result<(), StoreError> {
        let id = file.id;
        if self.files.contains_key(&id) {
            return Err(StoreError::Duplicate(id.to_string()));
        }
        self.files.insert(id, file);
        Ok(())
    }

    async fn files_for(&self, document_id: DocumentId) -> Result<Vec<DocumentFile>, StoreError> {
        let mut out: Vec<DocumentFile> = self
            .files
            .iter()
            .filter(|entry| entry.value().document_id == document_id)
            .map(|entry| entry.value().clone())
            .collect();
        out.sort_by_key(|f| f.created_at);
        Ok(out)
    }

    async fn file_count(&self) -> Result<u64, StoreError> {
        Ok(self.files.len() as u64)
    }

    async fn delete_file(&self, id: FileId) -> Result<bool, StoreError> {
        Ok(self.files.remove(&id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use openarchive_core::{NewDocument, RetentionCategory};

    fn make_document() -> Document {
        NewDocument {
            title: "test".into(),
            description: None,
            retention_category: RetentionCategory::Y5,
            creation_date: NaiveDate::from_ymd_opt(2021, 6, 1).unwrap(),
            metadata: serde_json::json!({}),
            tags: vec![],
        }
        .into_document(Utc::now())
    }

    #[tokio::test]
    async fn insert_and_get() {
        let store = MemoryDocumentStore::new();
        let doc = make_document();
        let id = doc.id;
        store.insert(doc).await.unwrap();
        let fetched = store.get(id).await.unwrap().unwrap();
        assert_eq!(fetched.id, id);
        assert_eq!(fetched.status, DocumentStatus::Ingesting);
    }

    #[tokio::test]
    async fn duplicate_insert_rejected() {
        let store = MemoryDocumentStore::new();
        let doc = make_document();
        store.insert(doc.clone()).await.unwrap();
        assert!(matches!(
            store.insert(doc).await,
            Err(StoreError::Duplicate(_))
        ));
    }

    #[tokio::test]
    async fn cas_applies_once_then_conflicts() {
        let store = MemoryDocumentStore::new();
        let doc = make_document();
        let id = doc.id;
        store.insert(doc).await.unwrap();

        let first = store
            .compare_and_set_status(
                id,
                DocumentStatus::Ingesting,
                DocumentStatus::Registered,
                Utc::now(),
            )
            .await
            .unwrap();
        assert!(matches!(first, StatusCas::Applied(_)));

        let second = store
            .compare_and_set_status(
                id,
                DocumentStatus::Ingesting,
                DocumentStatus::ProcessingFailed,
                Utc::now(),
            )
            .await
            .unwrap();
        match second {
            StatusCas::Conflict { current } => {
                assert_eq!(current, DocumentStatus::Registered);
            }
            StatusCas::Applied(_) => panic!("stale expected status must not apply"),
        }
    }

    #[tokio::test]
    async fn cas_missing_document_is_not_found() {
        let store = MemoryDocumentStore::new();
        let result = store
            .compare_and_set_status(
                DocumentId::new(),
                DocumentStatus::Ingesting,
                DocumentStatus::Registered,
                Utc::now(),
            )
            .await;
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn update_preserves_status() {
        let store = MemoryDocumentStore::new();
        let doc = make_document();
        let id = doc.id;
        store.insert(doc).await.unwrap();
        store
            .compare_and_set_status(
                id,
                DocumentStatus::Ingesting,
                DocumentStatus::Registered,
                Utc::now(),
            )
            .await
            .unwrap();

        // An edit carrying a stale status must not roll it back.
        let mut edited = store.get(id).await.unwrap().unwrap();
        edited.title = "renamed".into();
        edited.status = DocumentStatus::Ingesting;
        store.update(&edited).await.unwrap();

        let fetched = store.get(id).await.unwrap().unwrap();
        assert_eq!(fetched.title, "renamed");
        assert_eq!(fetched.status, DocumentStatus::Registered);
    }

    #[tokio::test]
    async fn list_by_status_filters() {
        let store = MemoryDocumentStore::new();
        let a = make_document();
        let b = make_document();
        let a_id = a.id;
        store.insert(a).await.unwrap();
        store.insert(b).await.unwrap();
        store
            .compare_and_set_status(
                a_id,
                DocumentStatus::Ingesting,
                DocumentStatus::Registered,
                Utc::now(),
            )
            .await
            .unwrap();

        let ingesting = store
            .list_by_status(&[DocumentStatus::Ingesting])
            .await
            .unwrap();
        assert_eq!(ingesting.len(), 1);
        let both = store
            .list_by_status(&[DocumentStatus::Ingesting, DocumentStatus::Registered])
            .await
            .unwrap();
        assert_eq!(both.len(), 2);
    }
}
