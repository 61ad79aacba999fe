pub mod config;
pub mod mailer;

pub use config::EmailConfig;
pub use mailer::{EmailError, SmtpMailer};
