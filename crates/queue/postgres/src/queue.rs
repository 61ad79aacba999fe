use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use openarchive_queue::{
    NewTask, QueueError, QueueStatistics, QueueTask, TaskId, TaskQueue, TaskResult, TaskStatus,
    TaskType,
};

use crate::config::PostgresQueueConfig;
use crate::migrations;

/// `PostgreSQL`-backed implementation of [`TaskQueue`].
///
/// Leasing is a single `UPDATE ... FROM (SELECT ... FOR UPDATE SKIP
/// LOCKED)` statement, so concurrent workers claim disjoint task sets
/// without blocking on each other's row locks.
pub struct PostgresTaskQueue {
    pool: PgPool,
    config: PostgresQueueConfig,
}

impl PostgresTaskQueue {
    /// Connect, build the pool and run migrations.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Connection`] if the pool cannot be created, or
    /// [`QueueError::Backend`] if migrations fail.
    pub async fn new(config: PostgresQueueConfig) -> Result<Self, QueueError> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(config.pool_size)
            .connect(&config.url)
            .await
            .map_err(|e| QueueError::Connection(e.to_string()))?;

        Self::from_pool(pool, config).await
    }

    /// Create a queue from an existing pool. Runs migrations.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Backend`] if migrations fail.
    pub async fn from_pool(pool: PgPool, config: PostgresQueueConfig) -> Result<Self, QueueError> {
        migrations::run_migrations(&pool, &config)
            .await
            .map_err(|e| QueueError::Backend(e.to_string()))?;
        Ok(Self { pool, config })
    }

    async fn current_status(&self, id: &TaskId) -> Result<Option<TaskStatus>, QueueError> {
        let table = self.config.tasks_table();
        let query = format!("SELECT status FROM {table} WHERE id = $1");
        let found: Option<(String,)> = sqlx::query_as(&query)
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend_err)?;
        found.map(|(status,)| status.parse()).transpose()
    }
}

fn backend_err(e: sqlx::Error) -> QueueError {
    QueueError::Backend(e.to_string())
}

/// The lease claim statement.
///
/// Candidate selection orders by priority, schedule, then `insertion_seq`,
/// the serial assigned at insert; `created_at` is not a reliable last key
/// because concurrent enqueues can share a timestamp.
fn lease_sql(table: &str, typed: bool) -> String {
    let type_filter = if typed { " AND task_type = ANY($3)" } else { "" };
    format!(
        "UPDATE {table} t \
         SET status = 'processing', attempts = t.attempts + 1, started_at = $1 \
         FROM (SELECT id FROM {table} \
               WHERE status = 'pending' AND scheduled_for <= $1{type_filter} \
               ORDER BY priority DESC, scheduled_for ASC, insertion_seq ASC \
               LIMIT $2 \
               FOR UPDATE SKIP LOCKED) c \
         WHERE t.id = c.id \
         RETURNING t.*"
    )
}

fn counter_from(row: &PgRow, column: &str) -> Result<u32, QueueError> {
    let value: i32 = row.try_get(column).map_err(backend_err)?;
    Ok(u32::try_from(value).unwrap_or(0))
}

fn task_from_row(row: &PgRow) -> Result<QueueTask, QueueError> {
    let task_type: String = row.try_get("task_type").map_err(backend_err)?;
    let status: String = row.try_get("status").map_err(backend_err)?;

    Ok(QueueTask {
        id: TaskId(row.try_get::<Uuid, _>("id").map_err(backend_err)?),
        task_type: task_type.parse()?,
        status: status.parse()?,
        priority: row.try_get("priority").map_err(backend_err)?,
        payload: row.try_get("payload").map_err(backend_err)?,
        attempts: counter_from(row, "attempts")?,
        max_attempts: counter_from(row, "max_attempts")?,
        error_count: counter_from(row, "error_count")?,
        last_error: row.try_get("last_error").map_err(backend_err)?,
        scheduled_for: row.try_get("scheduled_for").map_err(backend_err)?,
        created_at: row.try_get("created_at").map_err(backend_err)?,
        started_at: row.try_get("started_at").map_err(backend_err)?,
        completed_at: row.try_get("completed_at").map_err(backend_err)?,
    })
}

#[async_trait]
impl TaskQueue for PostgresTaskQueue {
    async fn enqueue(&self, task: NewTask) -> Result<QueueTask, QueueError> {
        let task = task.into_task(Utc::now());
        let table = self.config.tasks_table();
        let query = format!(
            "INSERT INTO {table} (id, task_type, status, priority, payload, attempts, \
             max_attempts, error_count, last_error, scheduled_for, created_at, started_at, \
             completed_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)"
        );

        sqlx::query(&query)
            .bind(task.id.0)
            .bind(task.task_type.as_str())
            .bind(task.status.as_str())
            .bind(task.priority)
            .bind(&task.payload)
            .bind(i32::try_from(task.attempts).unwrap_or(i32::MAX))
            .bind(i32::try_from(task.max_attempts).unwrap_or(i32::MAX))
            .bind(i32::try_from(task.error_count).unwrap_or(i32::MAX))
            .bind(&task.last_error)
            .bind(task.scheduled_for)
            .bind(task.created_at)
            .bind(task.started_at)
            .bind(task.completed_at)
            .execute(&self.pool)
            .await
            .map_err(backend_err)?;

        Ok(task)
    }

    async fn get(&self, id: &TaskId) -> Result<Option<QueueTask>, QueueError> {
        let table = self.config.tasks_table();
        let query = format!("SELECT * FROM {table} WHERE id = $1");
        let row = sqlx::query(&query)
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend_err)?;
        row.as_ref().map(task_from_row).transpose()
    }

    async fn lease(
        &self,
        types: Option<&[TaskType]>,
        limit: usize,
    ) -> Result<Vec<QueueTask>, QueueError> {
        let now = Utc::now();
        let query = lease_sql(&self.config.tasks_table(), types.is_some());

        let mut builder = sqlx::query(&query)
            .bind(now)
            .bind(i64::try_from(limit).unwrap_or(i64::MAX));
        if let Some(types) = types {
            let names: Vec<String> = types.iter().map(|t| t.as_str().to_owned()).collect();
            builder = builder.bind(names);
        }

        let rows = builder.fetch_all(&self.pool).await.map_err(backend_err)?;

        let mut leased: Vec<(i64, QueueTask)> = rows
            .iter()
            .map(|row| {
                let seq: i64 = row.try_get("insertion_seq").map_err(backend_err)?;
                Ok((seq, task_from_row(row)?))
            })
            .collect::<Result<_, QueueError>>()?;

        // UPDATE ... FROM returns rows in storage order; restore the lease
        // ordering for callers.
        leased.sort_by(|(a_seq, a), (b_seq, b)| {
            b.priority
                .cmp(&a.priority)
                .then(a.scheduled_for.cmp(&b.scheduled_for))
                .then(a_seq.cmp(b_seq))
        });
        Ok(leased.into_iter().map(|(_, task)| task).collect())
    }

    async fn complete(&self, id: &TaskId, result: TaskResult) -> Result<QueueTask, QueueError> {
        let table = self.config.tasks_table();

        let row = match result {
            TaskResult::Success => {
                let query = format!(
                    "UPDATE {table} SET status = 'completed', completed_at = $2 \
                     WHERE id = $1 AND status = 'processing' \
                     RETURNING *"
                );
                sqlx::query(&query)
                    .bind(id.0)
                    .bind(Utc::now())
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(backend_err)?
            }
            TaskResult::Failure { error } => {
                let query = format!(
                    "UPDATE {table} SET status = 'failed', error_count = error_count + 1, \
                     last_error = $2, completed_at = $3 \
                     WHERE id = $1 AND status = 'processing' \
                     RETURNING *"
                );
                sqlx::query(&query)
                    .bind(id.0)
                    .bind(&error)
                    .bind(Utc::now())
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(backend_err)?
            }
        };

        if let Some(row) = row {
            return task_from_row(&row);
        }

        match self.current_status(id).await? {
            None => Err(QueueError::NotFound(id.to_string())),
            Some(status) => Err(QueueError::InvalidStatus(format!(
                "task {id} is {status}, not processing"
            ))),
        }
    }

    async fn retry(&self, id: &TaskId, delay: Duration) -> Result<QueueTask, QueueError> {
        let table = self.config.tasks_table();
        let query = format!(
            "UPDATE {table} SET status = 'pending', scheduled_for = $2, last_error = NULL, \
             started_at = NULL, completed_at = NULL \
             WHERE id = $1 AND status = 'failed' \
             RETURNING *"
        );

        let row = sqlx::query(&query)
            .bind(id.0)
            .bind(Utc::now() + delay)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend_err)?;

        if let Some(row) = row {
            return task_from_row(&row);
        }

        match self.current_status(id).await? {
            None => Err(QueueError::NotFound(id.to_string())),
            Some(status) => Err(QueueError::InvalidStatus(format!(
                "task {id} is {status}, not failed"
            ))),
        }
    }

    async fn statistics(&self) -> Result<QueueStatistics, QueueError> {
        let table = self.config.tasks_table();

        let by_status = format!("SELECT status, COUNT(*) FROM {table} GROUP BY status");
        let counts: Vec<(String, i64)> = sqlx::query_as(&by_status)
            .fetch_all(&self.pool)
            .await
            .map_err(backend_err)?;

        let mut stats = QueueStatistics::default();
        for (status, count) in counts {
            let count = u64::try_from(count).unwrap_or(0);
            match status.parse::<TaskStatus>()? {
                TaskStatus::Pending => stats.pending = count,
                TaskStatus::Processing => stats.processing = count,
                TaskStatus::Completed => stats.completed = count,
                TaskStatus::Failed => stats.failed = count,
            }
        }

        let by_type = format!("SELECT task_type, COUNT(*) FROM {table} GROUP BY task_type");
        let counts: Vec<(String, i64)> = sqlx::query_as(&by_type)
            .fetch_all(&self.pool)
            .await
            .map_err(backend_err)?;
        for (task_type, count) in counts {
            stats
                .by_type
                .insert(task_type.parse()?, u64::try_from(count).unwrap_or(0));
        }

        Ok(stats)
    }

    async fn cleanup_completed(&self, older_than: DateTime<Utc>) -> Result<u64, QueueError> {
        let table = self.config.tasks_table();
        let query = format!(
            "DELETE FROM {table} \
             WHERE status IN ('completed', 'failed') AND completed_at < $1"
        );
        let result = sqlx::query(&query)
            .bind(older_than)
            .execute(&self.pool)
            .await
            .map_err(backend_err)?;
        Ok(result.rows_affected())
    }
}
