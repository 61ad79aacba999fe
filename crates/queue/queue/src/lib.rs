pub mod error;
pub mod queue;
pub mod task;

pub use error::QueueError;
pub use queue::TaskQueue;
pub use task::{NewTask, QueueStatistics, QueueTask, TaskId, TaskResult, TaskStatus, TaskType};
