use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::QueueError;

/// Default number of attempts before a task is considered exhausted.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Unique identifier for a queued task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub Uuid);

impl TaskId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// The kind of background work a task represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    /// Metadata extraction and enrichment for a newly ingested document.
    Enrichment,
    /// Text recognition over scanned source files.
    Ocr,
    /// Scheduled lifecycle evaluation for a single document.
    LifecycleCheck,
    /// Production of a redacted public rendition.
    Redaction,
    /// Packaging a permanent document for transfer to the national archive.
    TransferPrep,
}

impl TaskType {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Enrichment => "enrichment",
            Self::Ocr => "ocr",
            Self::LifecycleCheck => "lifecycle_check",
            Self::Redaction => "redaction",
            Self::TransferPrep => "transfer_prep",
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskType {
    type Err = QueueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "enrichment" => Ok(Self::Enrichment),
            "ocr" => Ok(Self::Ocr),
            "lifecycle_check" => Ok(Self::LifecycleCheck),
            "redaction" => Ok(Self::Redaction),
            "transfer_prep" => Ok(Self::TransferPrep),
            other => Err(QueueError::Serialization(format!(
                "unknown task type: {other}"
            ))),
        }
    }
}

/// Processing state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl TaskStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = QueueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(QueueError::Serialization(format!(
                "unknown task status: {other}"
            ))),
        }
    }
}

/// A task as stored in the queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueTask {
    pub id: TaskId,
    pub task_type: TaskType,
    pub status: TaskStatus,
    /// Higher values are leased first.
    pub priority: i32,
    /// Task-specific input, usually carrying the document id.
    pub payload: Value,
    /// Times the task has been leased, including the current lease.
    pub attempts: u32,
    pub max_attempts: u32,
    /// Times the task has failed so far.
    pub error_count: u32,
    pub last_error: Option<String>,
    /// Earliest instant the task may be leased.
    pub scheduled_for: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl QueueTask {
    /// Whether another retry is permitted after a failure.
    #[must_use]
    pub fn retries_remaining(&self) -> bool {
        self.attempts < self.max_attempts
    }
}

/// Parameters for enqueueing a new task.
#[derive(Debug, Clone)]
pub struct NewTask {
    pub task_type: TaskType,
    pub priority: i32,
    pub payload: Value,
    pub max_attempts: u32,
    /// Defaults to now when `None`.
    pub scheduled_for: Option<DateTime<Utc>>,
}

impl NewTask {
    #[must_use]
    pub fn new(task_type: TaskType, priority: i32, payload: Value) -> Self {
        Self {
            task_type,
            priority,
            payload,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            scheduled_for: None,
        }
    }

    #[must_use]
    pub fn scheduled_at(mut self, at: DateTime<Utc>) -> Self {
        self.scheduled_for = Some(at);
        self
    }

    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Materialize the task record a backend should persist.
    #[must_use]
    pub fn into_task(self, now: DateTime<Utc>) -> QueueTask {
        QueueTask {
            id: TaskId::new(),
            task_type: self.task_type,
            status: TaskStatus::Pending,
            priority: self.priority,
            payload: self.payload,
            attempts: 0,
            max_attempts: self.max_attempts,
            error_count: 0,
            last_error: None,
            scheduled_for: self.scheduled_for.unwrap_or(now),
            created_at: now,
            started_at: None,
            completed_at: None,
        }
    }
}

/// Outcome reported by a worker for a leased task.
#[derive(Debug, Clone)]
pub enum TaskResult {
    Success,
    Failure { error: String },
}

/// Aggregate counts across the queue.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStatistics {
    pub pending: u64,
    pub processing: u64,
    pub completed: u64,
    pub failed: u64,
    /// Task counts keyed by type, regardless of status.
    pub by_type: HashMap<TaskType, u64>,
}

impl QueueStatistics {
    #[must_use]
    pub fn total(&self) -> u64 {
        self.pending + self.processing + self.completed + self.failed
    }
}
