use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use openarchive_core::Actor;

/// Unique identifier for an [`AuditEntry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(pub Uuid);

impl EntryId {
    /// Generate a fresh random identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EntryId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EntryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// A single entry in the tamper-evident audit chain.
///
/// Entries are immutable once written: the store trait exposes no update or
/// delete, and any out-of-band edit is caught by chain verification because
/// `hash` covers the canonicalized content and the previous entry's hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Unique identifier.
    pub id: EntryId,
    /// Position in the chain, starting at 1 and strictly increasing.
    pub sequence: u64,
    /// When the entry was appended.
    pub recorded_at: DateTime<Utc>,
    /// What happened (e.g. `document.status_changed`).
    pub action: String,
    /// The kind of entity affected (e.g. `document`, `processing_queue`).
    pub entity_type: String,
    /// The affected entity's id, if the action targets one entity.
    pub entity_id: Option<String>,
    /// Who performed the action.
    pub actor: Actor,
    /// Opaque structured detail payload.
    pub details: serde_json::Value,
    /// The previous entry's `hash` (the genesis constant for entry 1).
    pub prev_hash: String,
    /// `SHA-256(prev_hash ‖ canonical-JSON of the content fields)`, hex.
    pub hash: String,
}

/// Input for appending an audit entry; the chain fills in sequence,
/// timestamps and hashes.
#[derive(Debug, Clone)]
pub struct NewEntry {
    /// What happened.
    pub action: String,
    /// The kind of entity affected.
    pub entity_type: String,
    /// The affected entity's id.
    pub entity_id: Option<String>,
    /// Who performed the action.
    pub actor: Actor,
    /// Opaque structured detail payload.
    pub details: serde_json::Value,
}

impl NewEntry {
    /// Convenience constructor for the common case.
    pub fn new(
        action: impl Into<String>,
        entity_type: impl Into<String>,
        entity_id: Option<String>,
        actor: Actor,
        details: serde_json::Value,
    ) -> Self {
        Self {
            action: action.into(),
            entity_type: entity_type.into(),
            entity_id,
            actor,
            details,
        }
    }
}

/// Query parameters for searching audit entries.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct AuditQuery {
    /// Filter by action.
    pub action: Option<String>,
    /// Filter by entity type.
    pub entity_type: Option<String>,
    /// Filter by entity id.
    pub entity_id: Option<String>,
    /// Filter by actor label (email, or `"system"`).
    pub actor: Option<String>,
    /// Only entries recorded at or after this time.
    pub from: Option<DateTime<Utc>>,
    /// Only entries recorded at or before this time.
    pub to: Option<DateTime<Utc>>,
    /// Maximum number of entries to return (default 50, max 1000).
    pub limit: Option<u32>,
    /// Number of entries to skip for pagination.
    pub offset: Option<u32>,
}

impl AuditQuery {
    /// Return the effective limit, clamped to 1..=1000, defaulting to 50.
    pub fn effective_limit(&self) -> u32 {
        self.limit.unwrap_or(50).clamp(1, 1000)
    }

    /// Return the effective offset, defaulting to 0.
    pub fn effective_offset(&self) -> u32 {
        self.offset.unwrap_or(0)
    }
}

/// A paginated page of audit entries, newest first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditPage {
    /// The entries matching the query.
    pub entries: Vec<AuditEntry>,
    /// Total number of entries matching the query (before pagination).
    pub total: u64,
    /// The limit used for this page.
    pub limit: u32,
    /// The offset used for this page.
    pub offset: u32,
}
