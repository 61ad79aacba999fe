pub mod chain;
pub mod entry;
pub mod error;
pub mod store;

pub use chain::{AuditLog, Checkpoint, ChainFault, FaultReason, IntegrityReport, GENESIS_HASH};
pub use entry::{AuditEntry, AuditPage, AuditQuery, EntryId, NewEntry};
pub use error::AuditError;
pub use store::AuditStore;
