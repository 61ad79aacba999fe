//! In-memory [`AuditStore`]. Suitable for development and testing.

use std::sync::Mutex;

use async_trait::async_trait;

use openarchive_audit::entry::{AuditEntry, AuditPage, AuditQuery};
use openarchive_audit::error::AuditError;
use openarchive_audit::store::AuditStore;

/// In-memory audit store.
///
/// Entries live in a `Vec` ordered by sequence, guarded by a standard
/// mutex. The lock is never held across an await point; the async trait
/// methods complete immediately.
#[derive(Debug, Default)]
pub struct MemoryAuditStore {
    entries: Mutex<Vec<AuditEntry>>,
}

impl MemoryAuditStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite the `details` of the entry at `sequence`, bypassing the
    /// append-only surface.
    ///
    /// Test support only: simulates out-of-band tampering with stored data
    /// so integrity verification can be exercised. Returns `false` if no
    /// entry has that sequence.
    pub fn corrupt_details(&self, sequence: u64, details: serde_json::Value) -> bool {
        let mut entries = self.entries.lock().expect("audit mutex poisoned");
        match entries.iter_mut().find(|e| e.sequence == sequence) {
            Some(entry) => {
                entry.details = details;
                true
            }
            None => false,
        }
    }
}

fn matches_filter(filter: Option<&String>, value: &str) -> bool {
    filter.is_none_or(|f| f == value)
}

#[async_trait]
impl AuditStore for MemoryAuditStore {
    async fn insert(&self, entry: AuditEntry) -> Result<(), AuditError> {
        let mut entries = self.entries.lock().expect("audit mutex poisoned");
        if entries.iter().any(|e| e.sequence == entry.sequence) {
            return Err(AuditError::SequenceConflict(entry.sequence));
        }
        entries.push(entry);
        entries.sort_by_key(|e| e.sequence);
        Ok(())
    }

    async fn latest(&self) -> Result<Option<AuditEntry>, AuditError> {
        let entries = self.entries.lock().expect("audit mutex poisoned");
        Ok(entries.last().cloned())
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<AuditEntry>, AuditError> {
        let entries = self.entries.lock().expect("audit mutex poisoned");
        Ok(entries.iter().find(|e| e.id.to_string() == id).cloned())
    }

    async fn range(&self, from_sequence: u64, limit: u32) -> Result<Vec<AuditEntry>, AuditError> {
        let entries = self.entries.lock().expect("audit mutex poisoned");
        Ok(entries
            .iter()
            .filter(|e| e.sequence >= from_sequence)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn count(&self) -> Result<u64, AuditError> {
        let entries = self.entries.lock().expect("audit mutex poisoned");
        Ok(entries.len() as u64)
    }

    async fn query(&self, query: &AuditQuery) -> Result<AuditPage, AuditError> {
        let limit = query.effective_limit();
        let offset = query.effective_offset();

        let entries = self.entries.lock().expect("audit mutex poisoned");
        let mut matching: Vec<AuditEntry> = entries
            .iter()
            .filter(|e| {
                if !matches_filter(query.action.as_ref(), &e.action) {
                    return false;
                }
                if !matches_filter(query.entity_type.as_ref(), &e.entity_type) {
                    return false;
                }
                if let Some(ref id) = query.entity_id {
                    if e.entity_id.as_deref() != Some(id.as_str()) {
                        return false;
                    }
                }
                if let Some(ref actor) = query.actor {
                    if &e.actor.label() != actor {
                        return false;
                    }
                }
                if let Some(ref from) = query.from {
                    if e.recorded_at < *from {
                        return false;
                    }
                }
                if let Some(ref to) = query.to {
                    if e.recorded_at > *to {
                        return false;
                    }
                }
                true
            })
            .cloned()
            .collect();

        // Newest first.
        matching.sort_by(|a, b| b.sequence.cmp(&a.sequence));

        let total = matching.len() as u64;
        let page: Vec<AuditEntry> = matching
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect();

        Ok(AuditPage {
            entries: page,
            total,
            limit,
            offset,
        })
    }
}
