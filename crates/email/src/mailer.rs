use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use thiserror::Error;
use tracing::{debug, error, info, instrument};

use crate::config::EmailConfig;

/// Errors from building or sending notification emails.
#[derive(Debug, Error)]
pub enum EmailError {
    /// The mailer configuration is invalid (e.g. a bad sender address).
    #[error("email configuration error: {0}")]
    Configuration(String),

    /// The message could not be built or delivered.
    #[error("email send failed: {0}")]
    Send(String),
}

/// SMTP mailer for archivist notifications.
///
/// Sends plain-text messages to the configured notification mailbox via
/// `lettre`. Delivery errors are returned to the caller, who decides
/// whether a failed notification blocks anything (it never does for
/// lifecycle events).
pub struct SmtpMailer {
    config: EmailConfig,
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl std::fmt::Debug for SmtpMailer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpMailer")
            .field("config", &self.config)
            .field("transport", &"AsyncSmtpTransport { .. }")
            .finish()
    }
}

impl SmtpMailer {
    /// Construct a mailer, building the SMTP transport from `config`.
    pub fn new(config: EmailConfig) -> Result<Self, EmailError> {
        let transport = build_transport(&config)?;
        Ok(Self { config, transport })
    }

    /// Create a mailer with a pre-built transport. Useful for tests.
    pub fn with_transport(
        config: EmailConfig,
        transport: AsyncSmtpTransport<Tokio1Executor>,
    ) -> Self {
        Self { config, transport }
    }

    /// Send a plain-text message to the notification mailbox.
    #[instrument(skip(self, body))]
    pub async fn send(&self, subject: &str, body: &str) -> Result<(), EmailError> {
        debug!(to = %self.config.notify_address, "building notification message");
        let message = build_message(&self.config, subject, body)?;

        self.transport.send(message).await.map_err(|e| {
            error!(error = %e, "SMTP send failed");
            EmailError::Send(e.to_string())
        })?;

        info!(to = %self.config.notify_address, subject, "notification sent");
        Ok(())
    }

    /// Verify the SMTP connection can be established.
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> Result<(), EmailError> {
        self.transport
            .test_connection()
            .await
            .map_err(|e| EmailError::Send(format!("SMTP health check failed: {e}")))?;
        Ok(())
    }
}

/// Build a `lettre::Message` from the config and content.
///
/// A free function so it can be tested independently of the async SMTP
/// transport (which requires a Tokio runtime to construct).
fn build_message(config: &EmailConfig, subject: &str, body: &str) -> Result<Message, EmailError> {
    let from: Mailbox = config
        .from_address
        .parse()
        .map_err(|e| EmailError::Configuration(format!("invalid from address: {e}")))?;
    let to: Mailbox = config
        .notify_address
        .parse()
        .map_err(|e| EmailError::Configuration(format!("invalid notify address: {e}")))?;

    Message::builder()
        .from(from)
        .to(to)
        .subject(subject)
        .body(body.to_owned())
        .map_err(|e| EmailError::Send(format!("failed to build email: {e}")))
}

fn build_transport(config: &EmailConfig) -> Result<AsyncSmtpTransport<Tokio1Executor>, EmailError> {
    let mut builder = if config.tls {
        AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)
            .map_err(|e| EmailError::Configuration(format!("SMTP TLS relay error: {e}")))?
    } else {
        AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.smtp_host)
    }
    .port(config.smtp_port);

    if let (Some(user), Some(pass)) = (&config.username, &config.password) {
        builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
    }

    Ok(builder.build())
}
