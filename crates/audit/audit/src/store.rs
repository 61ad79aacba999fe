use async_trait::async_trait;

use crate::entry::{AuditEntry, AuditPage, AuditQuery};
use crate::error::AuditError;

/// Trait for audit entry storage backends.
///
/// The surface is deliberately append-only: there is no update and no
/// delete. Implementations must be `Send + Sync` and must reject an insert
/// whose sequence number already exists, so that a broken serialization
/// discipline upstream surfaces as [`AuditError::SequenceConflict`] instead
/// of a silently forked chain.
#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Persist an entry. Fails with [`AuditError::SequenceConflict`] if an
    /// entry with the same sequence number is already stored.
    async fn insert(&self, entry: AuditEntry) -> Result<(), AuditError>;

    /// The entry with the highest sequence number, if any.
    async fn latest(&self) -> Result<Option<AuditEntry>, AuditError>;

    /// Retrieve an entry by its unique ID.
    async fn get_by_id(&self, id: &str) -> Result<Option<AuditEntry>, AuditError>;

    /// Entries with `sequence >= from_sequence`, ascending, at most `limit`.
    /// Chain verification walks the log through this method with bounded
    /// memory.
    async fn range(&self, from_sequence: u64, limit: u32) -> Result<Vec<AuditEntry>, AuditError>;

    /// Total number of stored entries.
    async fn count(&self) -> Result<u64, AuditError>;

    /// Query entries with filters and pagination, newest first.
    async fn query(&self, query: &AuditQuery) -> Result<AuditPage, AuditError>;
}
