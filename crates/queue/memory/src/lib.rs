//! In-memory [`TaskQueue`]. Suitable for development and testing.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use openarchive_queue::error::QueueError;
use openarchive_queue::queue::TaskQueue;
use openarchive_queue::task::{
    NewTask, QueueStatistics, QueueTask, TaskId, TaskResult, TaskStatus, TaskType,
};

/// In-memory task queue.
///
/// Tasks live in a `Vec` in insertion order, guarded by a standard mutex.
/// Holding the lock for the whole of [`TaskQueue::lease`] makes the
/// select-and-claim step atomic without per-task bookkeeping. The lock is
/// never held across an await point.
#[derive(Debug, Default)]
pub struct MemoryTaskQueue {
    tasks: Mutex<Vec<QueueTask>>,
}

impl MemoryTaskQueue {
    /// Create a new empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TaskQueue for MemoryTaskQueue {
    async fn enqueue(&self, task: NewTask) -> Result<QueueTask, QueueError> {
        let task = task.into_task(Utc::now());
        let mut tasks = self.tasks.lock().expect("queue mutex poisoned");
        tasks.push(task.clone());
        Ok(task)
    }

    async fn get(&self, id: &TaskId) -> Result<Option<QueueTask>, QueueError> {
        let tasks = self.tasks.lock().expect("queue mutex poisoned");
        Ok(tasks.iter().find(|t| t.id == *id).cloned())
    }

    async fn lease(
        &self,
        types: Option<&[TaskType]>,
        limit: usize,
    ) -> Result<Vec<QueueTask>, QueueError> {
        let now = Utc::now();
        let mut tasks = self.tasks.lock().expect("queue mutex poisoned");

        let mut runnable: Vec<usize> = tasks
            .iter()
            .enumerate()
            .filter(|(_, t)| {
                t.status == TaskStatus::Pending
                    && t.scheduled_for <= now
                    && types.is_none_or(|wanted| wanted.contains(&t.task_type))
            })
            .map(|(i, _)| i)
            .collect();

        // Stable sort keeps insertion order for full ties.
        runnable.sort_by(|&a, &b| {
            let (a, b) = (&tasks[a], &tasks[b]);
            b.priority
                .cmp(&a.priority)
                .then(a.scheduled_for.cmp(&b.scheduled_for))
        });

        let mut leased = Vec::with_capacity(limit.min(runnable.len()));
        for index in runnable.into_iter().take(limit) {
            let task = &mut tasks[index];
            task.status = TaskStatus::Processing;
            task.attempts += 1;
            task.started_at = Some(now);
            leased.push(task.clone());
        }
        Ok(leased)
    }

    async fn complete(&self, id: &TaskId, result: TaskResult) -> Result<QueueTask, QueueError> {
        let mut tasks = self.tasks.lock().expect("queue mutex poisoned");
        let task = tasks
            .iter_mut()
            .find(|t| t.id == *id)
            .ok_or_else(|| QueueError::NotFound(id.to_string()))?;

        if task.status != TaskStatus::Processing {
            return Err(QueueError::InvalidStatus(format!(
                "task {id} is {}, not processing",
                task.status
            )));
        }

        match result {
            TaskResult::Success => {
                task.status = TaskStatus::Completed;
                task.completed_at = Some(Utc::now());
            }
            TaskResult::Failure { error } => {
                task.status = TaskStatus::Failed;
                task.error_count += 1;
                task.last_error = Some(error);
                task.completed_at = Some(Utc::now());
            }
        }
        Ok(task.clone())
    }

    async fn retry(&self, id: &TaskId, delay: Duration) -> Result<QueueTask, QueueError> {
        let mut tasks = self.tasks.lock().expect("queue mutex poisoned");
        let task = tasks
            .iter_mut()
            .find(|t| t.id == *id)
            .ok_or_else(|| QueueError::NotFound(id.to_string()))?;

        if task.status != TaskStatus::Failed {
            return Err(QueueError::InvalidStatus(format!(
                "task {id} is {}, not failed",
                task.status
            )));
        }

        task.status = TaskStatus::Pending;
        task.scheduled_for = Utc::now() + delay;
        task.last_error = None;
        task.started_at = None;
        task.completed_at = None;
        Ok(task.clone())
    }

    async fn statistics(&self) -> Result<QueueStatistics, QueueError> {
        let tasks = self.tasks.lock().expect("queue mutex poisoned");
        let mut stats = QueueStatistics::default();
        for task in tasks.iter() {
            match task.status {
                TaskStatus::Pending => stats.pending += 1,
                TaskStatus::Processing => stats.processing += 1,
                TaskStatus::Completed => stats.completed += 1,
                TaskStatus::Failed => stats.failed += 1,
            }
            *stats.by_type.entry(task.task_type).or_insert(0) += 1;
        }
        Ok(stats)
    }

    async fn cleanup_completed(&self, older_than: DateTime<Utc>) -> Result<u64, QueueError> {
        let mut tasks = self.tasks.lock().expect("queue mutex poisoned");
        let before = tasks.len();
        tasks.retain(|t| {
            !matches!(t.status, TaskStatus::Completed | TaskStatus::Failed)
                || t.completed_at.is_none_or(|done| done >= older_than)
        });
        Ok((before - tasks.len()) as u64)
    }
}
