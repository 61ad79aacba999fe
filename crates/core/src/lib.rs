pub mod actor;
pub mod document;
pub mod error;
pub mod retention;
pub mod status;

pub use actor::Actor;
pub use document::{Document, DocumentFile, DocumentId, FileId, FileType, NewDocument};
pub use error::LifecycleError;
pub use retention::{classify, Disposition, RetentionCategory, RetentionSchedule};
pub use status::DocumentStatus;
