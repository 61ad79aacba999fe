//! Mapping from backend errors to [`LifecycleError`].
//!
//! The backend error enums live in their own trait crates, which do not
//! know about lifecycle semantics, so the mapping happens here rather
//! than as `From` impls on the backend side.

use openarchive_audit::AuditError;
use openarchive_blob::BlobError;
use openarchive_core::LifecycleError;
use openarchive_queue::QueueError;
use openarchive_store::StoreError;

pub(crate) fn store_err(e: StoreError) -> LifecycleError {
    match e {
        StoreError::NotFound(what) => LifecycleError::NotFound(what),
        StoreError::Duplicate(what) => LifecycleError::Conflict(format!("already exists: {what}")),
        other => LifecycleError::ExternalDependency(other.to_string()),
    }
}

pub(crate) fn audit_err(e: AuditError) -> LifecycleError {
    match e {
        AuditError::SequenceConflict(seq) => {
            LifecycleError::Conflict(format!("audit sequence {seq} already written"))
        }
        other => LifecycleError::ExternalDependency(other.to_string()),
    }
}

pub(crate) fn queue_err(e: QueueError) -> LifecycleError {
    match e {
        QueueError::NotFound(what) => LifecycleError::NotFound(what),
        other => LifecycleError::ExternalDependency(other.to_string()),
    }
}

pub(crate) fn blob_err(e: BlobError) -> LifecycleError {
    LifecycleError::ExternalDependency(e.to_string())
}
