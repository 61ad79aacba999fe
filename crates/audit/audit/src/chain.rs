//! The hash chain over audit entries.
//!
//! [`AuditLog`] is the only writer to an [`AuditStore`]. Appends are
//! serialized through an async mutex around "read tip, compute hash,
//! insert": two concurrent appends can never both read the same tip and
//! fork the chain. The tip is cached in memory after the first append and
//! recovered from the store on startup, so the chain survives restarts
//! without relying on in-process state alone.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tracing::{debug, instrument, warn};

use crate::entry::{AuditEntry, AuditQuery, EntryId, NewEntry};
use crate::error::AuditError;
use crate::store::AuditStore;

/// `prev_hash` of the first entry in a chain: 64 zero hex characters.
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// Page size used when walking the chain during verification.
const VERIFY_PAGE_SIZE: u32 = 1000;

/// The most recent entry's position and hash.
#[derive(Debug, Clone)]
struct ChainTip {
    sequence: u64,
    hash: String,
}

/// A resumable verification checkpoint: the last known-good entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Sequence of the last verified entry.
    pub sequence: u64,
    /// Stored hash of that entry.
    pub hash: String,
}

/// Why an entry failed verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultReason {
    /// The recomputed hash disagrees with the stored hash: the entry's
    /// content was altered after it was written.
    HashMismatch,
    /// `prev_hash` does not match the preceding entry's stored hash.
    BrokenLink,
    /// A sequence number is missing: an entry was removed.
    SequenceGap,
}

/// The first entry at which the chain fails verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainFault {
    /// The offending entry's id.
    pub entry_id: String,
    /// The offending entry's sequence number.
    pub sequence: u64,
    /// What is wrong with it.
    pub reason: FaultReason,
}

/// Result of a chain verification walk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityReport {
    /// `true` when every checked entry verified.
    pub valid: bool,
    /// How many entries were checked.
    pub entries_checked: u64,
    /// The first failing entry, when `valid` is `false`.
    pub first_invalid: Option<ChainFault>,
}

/// Compute the canonical hash of an entry's content given its predecessor's
/// hash.
///
/// The canonical form is the JSON object of the content fields; serde_json
/// serializes object keys in sorted order, so the byte string is stable.
/// `recorded_at` is rendered as RFC 3339 to pin the format.
#[must_use]
pub fn compute_hash(prev_hash: &str, entry: &AuditEntry) -> String {
    let canonical = serde_json::json!({
        "id": entry.id.to_string(),
        "sequence": entry.sequence,
        "recorded_at": entry.recorded_at.to_rfc3339(),
        "action": entry.action,
        "entity_type": entry.entity_type,
        "entity_id": entry.entity_id,
        "actor": entry.actor,
        "details": entry.details,
    });

    let mut hasher = Sha256::new();
    hasher.update(prev_hash.as_bytes());
    hasher.update(canonical.to_string().as_bytes());
    hex::encode(hasher.finalize())
}

/// The append-only, hash-chained audit log.
///
/// All state-affecting operations in the lifecycle core go through
/// [`append`](Self::append). Verification never repairs anything: a fault
/// is reported for operator investigation and the chain is left untouched.
pub struct AuditLog {
    store: Arc<dyn AuditStore>,
    /// Serialization point for appends. `None` until the tip has been
    /// loaded from the store.
    tip: Mutex<Option<ChainTip>>,
}

impl AuditLog {
    /// Create an audit log over the given backend.
    pub fn new(store: Arc<dyn AuditStore>) -> Self {
        Self {
            store,
            tip: Mutex::new(None),
        }
    }

    /// Access the underlying store (queries, trails).
    pub fn store(&self) -> &Arc<dyn AuditStore> {
        &self.store
    }

    /// Append an entry to the chain and return it as stored.
    ///
    /// Holds the tip lock across read-compute-insert so appends are totally
    /// ordered. On first use the tip is recovered from the store's latest
    /// entry.
    #[instrument(skip(self, entry), fields(action = %entry.action, entity = %entry.entity_type))]
    pub async fn append(&self, entry: NewEntry) -> Result<AuditEntry, AuditError> {
        let mut tip = self.tip.lock().await;

        if tip.is_none() {
            *tip = self.store.latest().await?.map(|last| ChainTip {
                sequence: last.sequence,
                hash: last.hash,
            });
        }

        let (sequence, prev_hash) = match tip.as_ref() {
            Some(t) => (t.sequence + 1, t.hash.clone()),
            None => (1, GENESIS_HASH.to_owned()),
        };

        let mut stored = AuditEntry {
            id: EntryId::new(),
            sequence,
            recorded_at: Utc::now(),
            action: entry.action,
            entity_type: entry.entity_type,
            entity_id: entry.entity_id,
            actor: entry.actor,
            details: entry.details,
            prev_hash: prev_hash.clone(),
            hash: String::new(),
        };
        stored.hash = compute_hash(&prev_hash, &stored);

        if let Err(e) = self.store.insert(stored.clone()).await {
            if matches!(e, AuditError::SequenceConflict(_)) {
                // Another writer took this sequence; drop the cached tip so
                // the next append re-reads the store's latest entry.
                *tip = None;
            }
            return Err(e);
        }

        *tip = Some(ChainTip {
            sequence,
            hash: stored.hash.clone(),
        });

        debug!(sequence, action = %stored.action, "audit entry appended");
        Ok(stored)
    }

    /// Full history of one entity, oldest first.
    ///
    /// Pages through the store until the entity's entries are exhausted.
    pub async fn entity_trail(
        &self,
        entity_type: &str,
        entity_id: &str,
    ) -> Result<Vec<AuditEntry>, AuditError> {
        let mut query = AuditQuery {
            entity_type: Some(entity_type.to_owned()),
            entity_id: Some(entity_id.to_owned()),
            limit: Some(VERIFY_PAGE_SIZE),
            ..AuditQuery::default()
        };

        let mut trail = Vec::new();
        loop {
            let page = self.store.query(&query).await?;
            let fetched = u32::try_from(page.entries.len()).unwrap_or(u32::MAX);
            trail.extend(page.entries);
            if trail.len() as u64 >= page.total || fetched == 0 {
                break;
            }
            query.offset = Some(query.effective_offset() + fetched);
        }

        // Query pages are newest first; trails read oldest first.
        trail.sort_by_key(|e| e.sequence);
        Ok(trail)
    }

    /// Walk the whole chain from the genesis, recomputing every hash.
    ///
    /// O(n) in total entry count; pages through the store with bounded
    /// memory. Returns the first faulty entry, if any.
    pub async fn verify_integrity(&self) -> Result<IntegrityReport, AuditError> {
        self.verify_from_state(1, GENESIS_HASH.to_owned()).await
    }

    /// Resume verification from a previously verified checkpoint.
    ///
    /// Only entries after `checkpoint.sequence` are walked, using the
    /// checkpoint's hash as the expected link. The checkpoint itself must
    /// come from a prior successful verification.
    pub async fn verify_integrity_from(
        &self,
        checkpoint: &Checkpoint,
    ) -> Result<IntegrityReport, AuditError> {
        self.verify_from_state(checkpoint.sequence + 1, checkpoint.hash.clone())
            .await
    }

    async fn verify_from_state(
        &self,
        start_sequence: u64,
        mut expected_prev: String,
    ) -> Result<IntegrityReport, AuditError> {
        let mut next_sequence = start_sequence;
        let mut entries_checked: u64 = 0;

        loop {
            let page = self.store.range(next_sequence, VERIFY_PAGE_SIZE).await?;
            if page.is_empty() {
                break;
            }

            for entry in &page {
                entries_checked += 1;

                if entry.sequence != next_sequence {
                    return Ok(fault(entry, FaultReason::SequenceGap, entries_checked));
                }
                if entry.prev_hash != expected_prev {
                    return Ok(fault(entry, FaultReason::BrokenLink, entries_checked));
                }
                let recomputed = compute_hash(&entry.prev_hash, entry);
                if recomputed != entry.hash {
                    warn!(
                        sequence = entry.sequence,
                        entry_id = %entry.id,
                        "audit chain hash mismatch"
                    );
                    return Ok(fault(entry, FaultReason::HashMismatch, entries_checked));
                }

                expected_prev = entry.hash.clone();
                next_sequence = entry.sequence + 1;
            }
        }

        Ok(IntegrityReport {
            valid: true,
            entries_checked,
            first_invalid: None,
        })
    }
}

fn fault(entry: &AuditEntry, reason: FaultReason, entries_checked: u64) -> IntegrityReport {
    IntegrityReport {
        valid: false,
        entries_checked,
        first_invalid: Some(ChainFault {
            entry_id: entry.id.to_string(),
            sequence: entry.sequence,
            reason,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use openarchive_core::Actor;

    #[test]
    fn compute_hash_is_deterministic_and_prev_sensitive() {
        let entry = AuditEntry {
            id: EntryId::new(),
            sequence: 1,
            recorded_at: Utc::now(),
            action: "document.uploaded".into(),
            entity_type: "document".into(),
            entity_id: Some("d-1".into()),
            actor: Actor::System,
            details: serde_json::json!({"size": 42}),
            prev_hash: GENESIS_HASH.into(),
            hash: String::new(),
        };

        let a = compute_hash(GENESIS_HASH, &entry);
        let b = compute_hash(GENESIS_HASH, &entry);
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);

        let other = compute_hash("ff", &entry);
        assert_ne!(a, other);
    }

    #[test]
    fn compute_hash_covers_details() {
        let mut entry = AuditEntry {
            id: EntryId::new(),
            sequence: 3,
            recorded_at: Utc::now(),
            action: "document.status_changed".into(),
            entity_type: "document".into(),
            entity_id: None,
            actor: Actor::System,
            details: serde_json::json!({"from": "REVIEW"}),
            prev_hash: GENESIS_HASH.into(),
            hash: String::new(),
        };
        let original = compute_hash(GENESIS_HASH, &entry);
        entry.details = serde_json::json!({"from": "DESTROY"});
        assert_ne!(original, compute_hash(GENESIS_HASH, &entry));
    }
}
