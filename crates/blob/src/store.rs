use async_trait::async_trait;
use bytes::Bytes;
use chrono::Duration;

use crate::error::BlobError;
use crate::types::{ObjectMetadata, PresignedUrl};

/// Pluggable object storage backend for document files.
///
/// Implementors provide the actual storage mechanism (e.g. S3, GCS,
/// filesystem). Objects are addressed by bucket and key; the archive
/// derives keys from document ids so an upload is idempotent per file.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store an object, overwriting any previous content at the same key.
    ///
    /// The store computes a `SHA-256` checksum over the content and returns
    /// it in the metadata.
    async fn put(
        &self,
        bucket: &str,
        key: &str,
        content_type: &str,
        data: Bytes,
    ) -> Result<ObjectMetadata, BlobError>;

    /// Retrieve an object, returning both metadata and content.
    ///
    /// Returns `None` if no object exists at the key.
    async fn get(&self, bucket: &str, key: &str)
        -> Result<Option<(ObjectMetadata, Bytes)>, BlobError>;

    /// Retrieve only the metadata for an object.
    async fn head(&self, bucket: &str, key: &str) -> Result<Option<ObjectMetadata>, BlobError>;

    /// Delete an object. Returns `true` if it existed.
    async fn delete(&self, bucket: &str, key: &str) -> Result<bool, BlobError>;

    /// Produce a time-limited read URL for an object.
    async fn presign(
        &self,
        bucket: &str,
        key: &str,
        expires_in: Duration,
    ) -> Result<PresignedUrl, BlobError>;
}
