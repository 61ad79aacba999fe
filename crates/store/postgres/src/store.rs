use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use openarchive_core::{
    Document, DocumentFile, DocumentId, DocumentStatus, FileId, FileType, RetentionCategory,
};
use openarchive_store::{DocumentStore, StatusCas, StoreError};

use crate::config::PostgresConfig;
use crate::migrations;

/// `PostgreSQL`-backed implementation of [`DocumentStore`].
///
/// The status compare-and-set is a single conditional `UPDATE ... WHERE
/// status = $expected RETURNING *`, so the check and the write execute
/// atomically inside the database.
pub struct PostgresDocumentStore {
    pool: PgPool,
    config: PostgresConfig,
}

impl PostgresDocumentStore {
    /// Connect, build the pool and run migrations.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Connection`] if the pool cannot be created, or
    /// [`StoreError::Backend`] if migrations fail.
    pub async fn new(config: PostgresConfig) -> Result<Self, StoreError> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(config.pool_size)
            .connect(&config.url)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        Self::from_pool(pool, config).await
    }

    /// Create a store from an existing pool. Useful for sharing one pool
    /// across the document, audit and queue backends. Runs migrations.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] if migrations fail.
    pub async fn from_pool(pool: PgPool, config: PostgresConfig) -> Result<Self, StoreError> {
        migrations::run_migrations(&pool, &config)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(Self { pool, config })
    }
}

fn backend_err(e: sqlx::Error) -> StoreError {
    StoreError::Backend(e.to_string())
}

fn document_from_row(row: &PgRow) -> Result<Document, StoreError> {
    let status: String = row.try_get("status").map_err(backend_err)?;
    let status: DocumentStatus = status
        .parse()
        .map_err(|e: openarchive_core::LifecycleError| StoreError::Serialization(e.to_string()))?;
    let category: String = row.try_get("retention_category").map_err(backend_err)?;

    Ok(Document {
        id: DocumentId(row.try_get::<Uuid, _>("id").map_err(backend_err)?),
        status,
        title: row.try_get("title").map_err(backend_err)?,
        description: row.try_get("description").map_err(backend_err)?,
        retention_category: RetentionCategory::parse_or_default(&category),
        creation_date: row.try_get("creation_date").map_err(backend_err)?,
        retention_end_date: row.try_get("retention_end_date").map_err(backend_err)?,
        is_public: row.try_get("is_public").map_err(backend_err)?,
        release_date: row.try_get("release_date").map_err(backend_err)?,
        metadata: row.try_get("metadata").map_err(backend_err)?,
        tags: row.try_get("tags").map_err(backend_err)?,
        created_at: row.try_get("created_at").map_err(backend_err)?,
        updated_at: row.try_get("updated_at").map_err(backend_err)?,
    })
}

fn file_from_row(row: &PgRow) -> Result<DocumentFile, StoreError> {
    let file_type: String = row.try_get("file_type").map_err(backend_err)?;
    let file_type = match file_type.as_str() {
        "original" => FileType::Original,
        "redacted" => FileType::Redacted,
        "ocr_text" => FileType::OcrText,
        "transfer" => FileType::Transfer,
        other => {
            return Err(StoreError::Serialization(format!(
                "unknown file type: {other}"
            )));
        }
    };
    let size: i64 = row.try_get("size_bytes").map_err(backend_err)?;

    Ok(DocumentFile {
        id: FileId(row.try_get::<Uuid, _>("id").map_err(backend_err)?),
        document_id: DocumentId(row.try_get::<Uuid, _>("document_id").map_err(backend_err)?),
        file_type,
        file_name: row.try_get("file_name").map_err(backend_err)?,
        storage_bucket: row.try_get("storage_bucket").map_err(backend_err)?,
        storage_key: row.try_get("storage_key").map_err(backend_err)?,
        content_type: row.try_get("content_type").map_err(backend_err)?,
        checksum: row.try_get("checksum").map_err(backend_err)?,
        size_bytes: u64::try_from(size).unwrap_or(0),
        created_at: row.try_get("created_at").map_err(backend_err)?,
    })
}

#[async_trait]
impl DocumentStore for PostgresDocumentStore {
    async fn insert(&self, document: Document) -> Result<(), StoreError> {
        let table = self.config.documents_table();
        let query = format!(
            "INSERT INTO {table} (id, status, title, description, retention_category, \
             creation_date, retention_end_date, is_public, release_date, metadata, tags, \
             created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)"
        );

        let result = sqlx::query(&query)
            .bind(document.id.0)
            .bind(document.status.as_str())
            .bind(&document.title)
            .bind(&document.description)
            .bind(document.retention_category.as_str())
            .bind(document.creation_date)
            .bind(document.retention_end_date)
            .bind(document.is_public)
            .bind(document.release_date)
            .bind(&document.metadata)
            .bind(&document.tags)
            .bind(document.created_at)
            .bind(document.updated_at)
            .execute(&self.pool)
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(StoreError::Duplicate(document.id.to_string()))
            }
            Err(e) => Err(backend_err(e)),
        }
    }

    async fn get(&self, id: DocumentId) -> Result<Option<Document>, StoreError> {
        let table = self.config.documents_table();
        let query = format!("SELECT * FROM {table} WHERE id = $1");

        let row = sqlx::query(&query)
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend_err)?;

        row.as_ref().map(document_from_row).transpose()
    }

    async fn update(&self, document: &Document) -> Result<(), StoreError> {
        let table = self.config.documents_table();
        // Status is deliberately absent: only compare_and_set_status may
        // write it.
        let query = format!(
            "UPDATE {table} SET title = $2, description = $3, retention_category = $4, \
             creation_date = $5, retention_end_date = $6, is_public = $7, release_date = $8, \
             metadata = $9, tags = $10, updated_at = $11 \
             WHERE id = $1"
        );

        let result = sqlx::query(&query)
            .bind(document.id.0)
            .bind(&document.title)
            .bind(&document.description)
            .bind(document.retention_category.as_str())
            .bind(document.creation_date)
            .bind(document.retention_end_date)
            .bind(document.is_public)
            .bind(document.release_date)
            .bind(&document.metadata)
            .bind(&document.tags)
            .bind(document.updated_at)
            .execute(&self.pool)
            .await
            .map_err(backend_err)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(document.id.to_string()));
        }
        Ok(())
    }

    async fn compare_and_set_status(
        &self,
        id: DocumentId,
        expected: DocumentStatus,
        new: DocumentStatus,
        updated_at: DateTime<Utc>,
    ) -> Result<StatusCas, StoreError> {
        let table = self.config.documents_table();
        let query = format!(
            "UPDATE {table} SET status = $3, updated_at = $4 \
             WHERE id = $1 AND status = $2 \
             RETURNING *"
        );

        let row = sqlx::query(&query)
            .bind(id.0)
            .bind(expected.as_str())
            .bind(new.as_str())
            .bind(updated_at)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend_err)?;

        if let Some(row) = row {
            return Ok(StatusCas::Applied(document_from_row(&row)?));
        }

        // The conditional update matched nothing: either the document is
        // gone or another writer changed the status first.
        let current = format!("SELECT status FROM {table} WHERE id = $1");
        let found: Option<(String,)> = sqlx::query_as(&current)
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend_err)?;

        match found {
            None => Err(StoreError::NotFound(id.to_string())),
            Some((status,)) => {
                let current = status.parse().map_err(
                    |e: openarchive_core::LifecycleError| {
                        StoreError::Serialization(e.to_string())
                    },
                )?;
                Ok(StatusCas::Conflict { current })
            }
        }
    }

    async fn list_by_status(
        &self,
        statuses: &[DocumentStatus],
    ) -> Result<Vec<Document>, StoreError> {
        let table = self.config.documents_table();
        let names: Vec<String> = statuses.iter().map(|s| s.as_str().to_owned()).collect();
        let query = format!(
            "SELECT * FROM {table} WHERE status = ANY($1) ORDER BY created_at ASC"
        );

        let rows = sqlx::query(&query)
            .bind(&names)
            .fetch_all(&self.pool)
            .await
            .map_err(backend_err)?;

        rows.iter().map(document_from_row).collect()
    }

    async fn count(&self) -> Result<u64, StoreError> {
        let table = self.config.documents_table();
        let query = format!("SELECT COUNT(*) FROM {table}");
        let (count,): (i64,) = sqlx::query_as(&query)
            .fetch_one(&self.pool)
            .await
            .map_err(backend_err)?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    async fn delete(&self, id: DocumentId) -> Result<bool, StoreError> {
        let table = self.config.documents_table();
        let query = format!("DELETE FROM {table} WHERE id = $1");
        let result = sqlx::query(&query)
            .bind(id.0)
            .execute(&self.pool)
            .await
            .map_err(backend_err)?;
        Ok(result.rows_affected() > 0)
    }

    async fn insert_file(&self, file: DocumentFile) -> Result<(), StoreError> {
        let table = self.config.files_table();
        let query = format!(
            "INSERT INTO {table} (id, document_id, file_type, file_name, storage_bucket, \
             storage_key, content_type, checksum, size_bytes, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)"
        );

        let size = i64::try_from(file.size_bytes)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        sqlx::query(&query)
            .bind(file.id.0)
            .bind(file.document_id.0)
            .bind(file.file_type.as_str())
            .bind(&file.file_name)
            .bind(&file.storage_bucket)
            .bind(&file.storage_key)
            .bind(&file.content_type)
            .bind(&file.checksum)
            .bind(size)
            .bind(file.created_at)
            .execute(&self.pool)
            .await
            .map_err(backend_err)?;
        Ok(())
    }

    async fn files_for(&self, document_id: DocumentId) -> Result<Vec<DocumentFile>, StoreError> {
        let table = self.config.files_table();
        let query = format!(
            "SELECT * FROM {table} WHERE document_id = $1 ORDER BY created_at ASC"
        );

        let rows = sqlx::query(&query)
            .bind(document_id.0)
            .fetch_all(&self.pool)
            .await
            .map_err(backend_err)?;

        rows.iter().map(file_from_row).collect()
    }

    async fn file_count(&self) -> Result<u64, StoreError> {
        let table = self.config.files_table();
        let query = format!("SELECT COUNT(*) FROM {table}");
        let (count,): (i64,) = sqlx::query_as(&query)
            .fetch_one(&self.pool)
            .await
            .map_err(backend_err)?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    async fn delete_file(&self, id: FileId) -> Result<bool, StoreError> {
        let table = self.config.files_table();
        let query = format!("DELETE FROM {table} WHERE id = $1");
        let result = sqlx::query(&query)
            .bind(id.0)
            .execute(&self.pool)
            .await
            .map_err(backend_err)?;
        Ok(result.rows_affected() > 0)
    }
}
