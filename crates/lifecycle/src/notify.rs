use async_trait::async_trait;
use thiserror::Error;

use openarchive_core::{DocumentId, DocumentStatus};
use openarchive_email::SmtpMailer;

/// Errors from delivering a notification.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification delivery failed: {0}")]
    Delivery(String),
}

/// A status change worth telling the archivists about.
#[derive(Debug, Clone)]
pub struct TransitionNotice {
    pub document_id: DocumentId,
    pub from: DocumentStatus,
    pub to: DocumentStatus,
}

/// Receives lifecycle notifications after a transition has persisted.
///
/// Delivery is best effort: the state machine logs a failed notification
/// and moves on. A notifier must never be able to block or reverse a
/// transition.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notice: &TransitionNotice) -> Result<(), NotifyError>;
}

/// Notifier that drops every notice. The default when no mailer is wired.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullNotifier;

#[async_trait]
impl Notifier for NullNotifier {
    async fn notify(&self, _notice: &TransitionNotice) -> Result<(), NotifyError> {
        Ok(())
    }
}

/// Notifier that emails the archivist mailbox via SMTP.
#[derive(Debug)]
pub struct EmailNotifier {
    mailer: SmtpMailer,
}

impl EmailNotifier {
    pub fn new(mailer: SmtpMailer) -> Self {
        Self { mailer }
    }
}

#[async_trait]
impl Notifier for EmailNotifier {
    async fn notify(&self, notice: &TransitionNotice) -> Result<(), NotifyError> {
        let subject = format!(
            "Document {} moved to {}",
            notice.document_id, notice.to
        );
        let body = format!(
            "Document {} changed status from {} to {}.",
            notice.document_id, notice.from, notice.to
        );
        self.mailer
            .send(&subject, &body)
            .await
            .map_err(|e| NotifyError::Delivery(e.to_string()))
    }
}
