use serde::{Deserialize, Serialize};

/// Settings for the SMTP mailer that delivers lifecycle notifications.
///
/// Defaults target the STARTTLS submission port with no authentication,
/// which matches a local relay; production deployments set credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    /// Hostname of the SMTP relay.
    pub smtp_host: String,
    /// Port of the SMTP relay. Defaults to 587.
    pub smtp_port: u16,
    /// Username for SMTP auth, if the relay requires it.
    pub username: Option<String>,
    /// Password for SMTP auth, if the relay requires it.
    pub password: Option<String>,
    /// Sender address on outgoing mail.
    pub from_address: String,
    /// Archivist mailbox that receives lifecycle notifications.
    pub notify_address: String,
    /// Negotiate STARTTLS. Defaults to on; turn off only for test relays.
    pub tls: bool,
}

impl EmailConfig {
    /// Build a config for `smtp_host` with the default port, TLS on and no
    /// credentials.
    pub fn new(
        smtp_host: impl Into<String>,
        from_address: impl Into<String>,
        notify_address: impl Into<String>,
    ) -> Self {
        Self {
            smtp_host: smtp_host.into(),
            from_address: from_address.into(),
            notify_address: notify_address.into(),
            ..Self::default()
        }
    }

    /// Attach SMTP credentials.
    #[must_use]
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Use a non-default relay port.
    #[must_use]
    pub fn with_port(mut self, smtp_port: u16) -> Self {
        self.smtp_port = smtp_port;
        self
    }

    /// Enable or disable STARTTLS.
    #[must_use]
    pub fn with_tls(mut self, tls: bool) -> Self {
        self.tls = tls;
        self
    }
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            smtp_host: "localhost".to_owned(),
            smtp_port: 587,
            username: None,
            password: None,
            from_address: "noreply@localhost".to_owned(),
            notify_address: "archivists@localhost".to_owned(),
            tls: true,
        }
    }
}
