pub mod config;
mod migrations;
pub mod store;

pub use config::PostgresAuditConfig;
pub use store::PostgresAuditStore;
