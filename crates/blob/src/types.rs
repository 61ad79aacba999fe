use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Metadata for a stored object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectMetadata {
    /// Bucket the object lives in.
    pub bucket: String,
    /// Key within the bucket.
    pub key: String,
    /// MIME content type (e.g. `"application/pdf"`).
    pub content_type: String,
    /// Size in bytes.
    pub size_bytes: u64,
    /// `SHA-256` hex digest of the object content.
    pub checksum_sha256: String,
    /// When the object was stored.
    pub created_at: DateTime<Utc>,
}

/// A time-limited URL granting direct read access to an object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresignedUrl {
    /// The URL itself.
    pub url: String,
    /// When the URL stops working.
    pub expires_at: DateTime<Utc>,
}

/// Compute the `SHA-256` hex digest of object content.
///
/// This is the checksum recorded on a document file at ingestion and
/// compared against the stored object during integrity checks.
#[must_use]
pub fn checksum_sha256(data: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_is_stable_hex() {
        let digest = checksum_sha256(b"hello");
        assert_eq!(digest.len(), 64);
        assert_eq!(digest, checksum_sha256(b"hello"));
        assert_ne!(digest, checksum_sha256(b"hello!"));
    }
}
