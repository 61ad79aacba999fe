use sqlx::PgPool;

use crate::config::PostgresConfig;

/// Run database migrations, creating required tables if they do not exist.
///
/// # Errors
///
/// Returns a [`sqlx::Error`] if any DDL statement fails.
pub async fn run_migrations(pool: &PgPool, config: &PostgresConfig) -> Result<(), sqlx::Error> {
    let documents_table = config.documents_table();
    let files_table = config.files_table();

    let create_documents = format!(
        "CREATE TABLE IF NOT EXISTS {documents_table} (
            id UUID PRIMARY KEY,
            status TEXT NOT NULL,
            title TEXT NOT NULL,
            description TEXT,
            retention_category TEXT NOT NULL,
            creation_date DATE NOT NULL,
            retention_end_date DATE NOT NULL,
            is_public BOOLEAN NOT NULL DEFAULT FALSE,
            release_date DATE,
            metadata JSONB NOT NULL DEFAULT '{{}}'::jsonb,
            tags TEXT[] NOT NULL DEFAULT '{{}}',
            created_at TIMESTAMPTZ NOT NULL,
            updated_at TIMESTAMPTZ NOT NULL
        )"
    );

    // The scanner loads by status; the list is small per sweep but the
    // filter should not scan the whole table.
    let create_status_idx = format!(
        "CREATE INDEX IF NOT EXISTS {}documents_status_idx ON {documents_table} (status)",
        config.table_prefix
    );

    let create_files = format!(
        "CREATE TABLE IF NOT EXISTS {files_table} (
            id UUID PRIMARY KEY,
            document_id UUID NOT NULL REFERENCES {documents_table} (id),
            file_type TEXT NOT NULL,
            file_name TEXT NOT NULL,
            storage_bucket TEXT NOT NULL,
            storage_key TEXT NOT NULL,
            content_type TEXT NOT NULL,
            checksum TEXT NOT NULL,
            size_bytes BIGINT NOT NULL,
            created_at TIMESTAMPTZ NOT NULL
        )"
    );

    let create_files_doc_idx = format!(
        "CREATE INDEX IF NOT EXISTS {}document_files_document_idx ON {files_table} (document_id)",
        config.table_prefix
    );

    sqlx::query(&create_documents).execute(pool).await?;
    sqlx::query(&create_status_idx).execute(pool).await?;
    sqlx::query(&create_files).execute(pool).await?;
    sqlx::query(&create_files_doc_idx).execute(pool).await?;

    Ok(())
}
