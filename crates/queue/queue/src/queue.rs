use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use crate::error::QueueError;
use crate::task::{NewTask, QueueStatistics, QueueTask, TaskId, TaskResult, TaskType};

/// Durable priority queue for background document work.
///
/// Leasing is the only way a task moves from pending to processing, and a
/// backend must guarantee that a task handed to one worker is never handed
/// to another while the lease is held. Implementations do this with a
/// per-task compare-and-set on the status column (or the equivalent lock
/// in memory), so two workers calling [`TaskQueue::lease`] concurrently
/// receive disjoint task sets.
///
/// The queue itself never enforces `max_attempts`; the worker reads
/// `attempts` off the leased task and decides whether to retry or give up.
#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Add a task to the queue in the pending state.
    async fn enqueue(&self, task: NewTask) -> Result<QueueTask, QueueError>;

    /// Fetch a task by id.
    async fn get(&self, id: &TaskId) -> Result<Option<QueueTask>, QueueError>;

    /// Atomically claim up to `limit` runnable tasks.
    ///
    /// A task is runnable when it is pending, its `scheduled_for` is not in
    /// the future, and its type is in `types` (no filter when `None`).
    /// Candidates are ordered by priority descending, then `scheduled_for`
    /// ascending, then insertion order. Each claimed task is flipped to
    /// processing with `attempts` incremented and `started_at` set before
    /// it is returned.
    async fn lease(
        &self,
        types: Option<&[TaskType]>,
        limit: usize,
    ) -> Result<Vec<QueueTask>, QueueError>;

    /// Settle a leased task with its outcome.
    ///
    /// On [`TaskResult::Success`] the task becomes completed. On
    /// [`TaskResult::Failure`] it becomes failed with `error_count`
    /// incremented and `last_error` recorded; re-running it is the worker's
    /// call via [`TaskQueue::retry`].
    async fn complete(&self, id: &TaskId, result: TaskResult) -> Result<QueueTask, QueueError>;

    /// Put a failed task back in the pending state, scheduled `delay` from
    /// now. Clears `last_error`; `attempts` and `error_count` are kept so
    /// the retry history stays visible. Rejects tasks that are not failed.
    async fn retry(&self, id: &TaskId, delay: Duration) -> Result<QueueTask, QueueError>;

    /// Counts of tasks per status and per type.
    async fn statistics(&self) -> Result<QueueStatistics, QueueError>;

    /// Delete completed and failed tasks finished before `older_than`.
    /// Returns the number removed.
    async fn cleanup_completed(&self, older_than: DateTime<Utc>) -> Result<u64, QueueError>;
}
