use sqlx::PgPool;

use crate::config::PostgresAuditConfig;

/// Create the audit log table if it does not exist.
///
/// The `UNIQUE` constraint on `sequence` is load-bearing: it turns a forked
/// append (two writers computing from the same tip) into an insert error
/// instead of a corrupted chain.
///
/// # Errors
///
/// Returns a [`sqlx::Error`] if any DDL statement fails.
pub async fn run_migrations(
    pool: &PgPool,
    config: &PostgresAuditConfig,
) -> Result<(), sqlx::Error> {
    let audit_table = config.audit_table();

    let create_audit = format!(
        "CREATE TABLE IF NOT EXISTS {audit_table} (
            id UUID PRIMARY KEY,
            sequence BIGINT NOT NULL UNIQUE,
            recorded_at TIMESTAMPTZ NOT NULL,
            action TEXT NOT NULL,
            entity_type TEXT NOT NULL,
            entity_id TEXT,
            actor JSONB NOT NULL,
            details JSONB NOT NULL,
            prev_hash TEXT NOT NULL,
            hash TEXT NOT NULL
        )"
    );

    let create_entity_idx = format!(
        "CREATE INDEX IF NOT EXISTS {}audit_entity_idx ON {audit_table} (entity_type, entity_id)",
        config.table_prefix
    );

    let create_recorded_idx = format!(
        "CREATE INDEX IF NOT EXISTS {}audit_recorded_idx ON {audit_table} (recorded_at)",
        config.table_prefix
    );

    sqlx::query(&create_audit).execute(pool).await?;
    sqlx::query(&create_entity_idx).execute(pool).await?;
    sqlx::query(&create_recorded_idx).execute(pool).await?;

    Ok(())
}
