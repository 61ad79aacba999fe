//! In-memory [`ObjectStore`]. Suitable for development and testing.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{Duration, Utc};
use dashmap::DashMap;

use crate::error::BlobError;
use crate::store::ObjectStore;
use crate::types::{checksum_sha256, ObjectMetadata, PresignedUrl};

/// In-memory object store keyed by `bucket/key`.
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    objects: DashMap<String, (ObjectMetadata, Bytes)>,
}

impl MemoryObjectStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored objects.
    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Whether the store holds no objects.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    fn address(bucket: &str, key: &str) -> String {
        format!("{bucket}/{key}")
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put(
        &self,
        bucket: &str,
        key: &str,
        content_type: &str,
        data: Bytes,
    ) -> Result<ObjectMetadata, BlobError> {
        let metadata = ObjectMetadata {
            bucket: bucket.to_owned(),
            key: key.to_owned(),
            content_type: content_type.to_owned(),
            size_bytes: data.len() as u64,
            checksum_sha256: checksum_sha256(&data),
            created_at: Utc::now(),
        };
        self.objects
            .insert(Self::address(bucket, key), (metadata.clone(), data));
        Ok(metadata)
    }

    async fn get(
        &self,
        bucket: &str,
        key: &str,
    ) -> Result<Option<(ObjectMetadata, Bytes)>, BlobError> {
        Ok(self
            .objects
            .get(&Self::address(bucket, key))
            .map(|entry| entry.value().clone()))
    }

    async fn head(&self, bucket: &str, key: &str) -> Result<Option<ObjectMetadata>, BlobError> {
        Ok(self
            .objects
            .get(&Self::address(bucket, key))
            .map(|entry| entry.value().0.clone()))
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<bool, BlobError> {
        Ok(self.objects.remove(&Self::address(bucket, key)).is_some())
    }

    async fn presign(
        &self,
        bucket: &str,
        key: &str,
        expires_in: Duration,
    ) -> Result<PresignedUrl, BlobError> {
        if !self.objects.contains_key(&Self::address(bucket, key)) {
            return Err(BlobError::NotFound {
                bucket: bucket.to_owned(),
                key: key.to_owned(),
            });
        }
        Ok(PresignedUrl {
            url: format!("memory://{bucket}/{key}"),
            expires_at: Utc::now() + expires_in,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_get_roundtrip_with_checksum() {
        let store = MemoryObjectStore::new();
        let data = Bytes::from_static(b"archived content");
        let meta = store
            .put("archive-files", "doc-1/original", "application/pdf", data.clone())
            .await
            .unwrap();

        assert_eq!(meta.size_bytes, data.len() as u64);
        assert_eq!(meta.checksum_sha256, checksum_sha256(&data));

        let (got_meta, got_data) = store
            .get("archive-files", "doc-1/original")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(got_meta.checksum_sha256, meta.checksum_sha256);
        assert_eq!(got_data, data);
    }

    #[tokio::test]
    async fn delete_reports_existence() {
        let store = MemoryObjectStore::new();
        store
            .put("b", "k", "text/plain", Bytes::from_static(b"x"))
            .await
            .unwrap();

        assert!(store.delete("b", "k").await.unwrap());
        assert!(!store.delete("b", "k").await.unwrap());
        assert!(store.get("b", "k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn presign_requires_existing_object() {
        let store = MemoryObjectStore::new();
        let missing = store.presign("b", "k", Duration::minutes(5)).await;
        assert!(matches!(missing, Err(BlobError::NotFound { .. })));

        store
            .put("b", "k", "text/plain", Bytes::from_static(b"x"))
            .await
            .unwrap();
        let url = store.presign("b", "k", Duration::minutes(5)).await.unwrap();
        assert_eq!(url.url, "memory://b/k");
    }
}
