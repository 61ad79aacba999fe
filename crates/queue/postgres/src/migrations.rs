use sqlx::PgPool;

use crate::config::PostgresQueueConfig;

/// Run database migrations, creating required tables if they do not exist.
///
/// # Errors
///
/// Returns a [`sqlx::Error`] if any DDL statement fails.
pub async fn run_migrations(
    pool: &PgPool,
    config: &PostgresQueueConfig,
) -> Result<(), sqlx::Error> {
    let tasks_table = config.tasks_table();

    let create_tasks = format!(
        "CREATE TABLE IF NOT EXISTS {tasks_table} (
            id UUID PRIMARY KEY,
            insertion_seq BIGSERIAL NOT NULL,
            task_type TEXT NOT NULL,
            status TEXT NOT NULL,
            priority INTEGER NOT NULL DEFAULT 0,
            payload JSONB NOT NULL DEFAULT '{{}}'::jsonb,
            attempts INTEGER NOT NULL DEFAULT 0,
            max_attempts INTEGER NOT NULL DEFAULT 3,
            error_count INTEGER NOT NULL DEFAULT 0,
            last_error TEXT,
            scheduled_for TIMESTAMPTZ NOT NULL,
            created_at TIMESTAMPTZ NOT NULL,
            started_at TIMESTAMPTZ,
            completed_at TIMESTAMPTZ
        )"
    );

    // Matches the lease ordering so candidate selection walks the index.
    // insertion_seq breaks ties exactly; created_at can collide at
    // timestamp resolution under concurrent enqueues.
    let create_lease_idx = format!(
        "CREATE INDEX IF NOT EXISTS {}processing_queue_lease_idx \
         ON {tasks_table} (status, priority DESC, scheduled_for ASC, insertion_seq ASC)",
        config.table_prefix
    );

    sqlx::query(&create_tasks).execute(pool).await?;
    sqlx::query(&create_lease_idx).execute(pool).await?;

    Ok(())
}
