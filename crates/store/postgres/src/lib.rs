pub mod config;
mod migrations;
pub mod store;

pub use config::PostgresConfig;
pub use store::PostgresDocumentStore;
