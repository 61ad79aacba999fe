pub mod config;
mod migrations;
pub mod queue;

pub use config::PostgresQueueConfig;
pub use queue::PostgresTaskQueue;
