use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use openarchive_audit::entry::{AuditEntry, AuditPage, AuditQuery, EntryId};
use openarchive_audit::error::AuditError;
use openarchive_audit::store::AuditStore;
use openarchive_core::Actor;

use crate::config::PostgresAuditConfig;
use crate::migrations;

/// `PostgreSQL`-backed implementation of [`AuditStore`].
///
/// Append-only by construction: this type issues only `INSERT` and `SELECT`
/// statements against the audit table.
pub struct PostgresAuditStore {
    pool: PgPool,
    config: PostgresAuditConfig,
}

impl PostgresAuditStore {
    /// Connect, build the pool and run migrations.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::Storage`] if the pool cannot be created or
    /// migrations fail.
    pub async fn new(config: PostgresAuditConfig) -> Result<Self, AuditError> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(config.pool_size)
            .connect(&config.url)
            .await
            .map_err(|e| AuditError::Storage(e.to_string()))?;

        Self::from_pool(pool, config).await
    }

    /// Create a store from an existing pool. Runs migrations.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::Storage`] if migrations fail.
    pub async fn from_pool(
        pool: PgPool,
        config: PostgresAuditConfig,
    ) -> Result<Self, AuditError> {
        migrations::run_migrations(&pool, &config)
            .await
            .map_err(|e| AuditError::Storage(e.to_string()))?;
        Ok(Self { pool, config })
    }
}

fn storage_err(e: sqlx::Error) -> AuditError {
    AuditError::Storage(e.to_string())
}

fn entry_from_row(row: &PgRow) -> Result<AuditEntry, AuditError> {
    let actor: serde_json::Value = row.try_get("actor").map_err(storage_err)?;
    let actor: Actor =
        serde_json::from_value(actor).map_err(|e| AuditError::Serialization(e.to_string()))?;
    let sequence: i64 = row.try_get("sequence").map_err(storage_err)?;

    Ok(AuditEntry {
        id: EntryId(row.try_get::<Uuid, _>("id").map_err(storage_err)?),
        sequence: u64::try_from(sequence).unwrap_or(0),
        recorded_at: row.try_get("recorded_at").map_err(storage_err)?,
        action: row.try_get("action").map_err(storage_err)?,
        entity_type: row.try_get("entity_type").map_err(storage_err)?,
        entity_id: row.try_get("entity_id").map_err(storage_err)?,
        actor,
        details: row.try_get("details").map_err(storage_err)?,
        prev_hash: row.try_get("prev_hash").map_err(storage_err)?,
        hash: row.try_get("hash").map_err(storage_err)?,
    })
}

#[async_trait]
impl AuditStore for PostgresAuditStore {
    async fn insert(&self, entry: AuditEntry) -> Result<(), AuditError> {
        let table = self.config.audit_table();
        let query = format!(
            "INSERT INTO {table} (id, sequence, recorded_at, action, entity_type, entity_id, \
             actor, details, prev_hash, hash) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)"
        );

        let sequence = i64::try_from(entry.sequence)
            .map_err(|e| AuditError::Serialization(e.to_string()))?;
        let actor = serde_json::to_value(&entry.actor)
            .map_err(|e| AuditError::Serialization(e.to_string()))?;

        let result = sqlx::query(&query)
            .bind(entry.id.0)
            .bind(sequence)
            .bind(entry.recorded_at)
            .bind(&entry.action)
            .bind(&entry.entity_type)
            .bind(&entry.entity_id)
            .bind(&actor)
            .bind(&entry.details)
            .bind(&entry.prev_hash)
            .bind(&entry.hash)
            .execute(&self.pool)
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(AuditError::SequenceConflict(entry.sequence))
            }
            Err(e) => Err(storage_err(e)),
        }
    }

    async fn latest(&self) -> Result<Option<AuditEntry>, AuditError> {
        let table = self.config.audit_table();
        let query = format!("SELECT * FROM {table} ORDER BY sequence DESC LIMIT 1");

        let row = sqlx::query(&query)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_err)?;

        row.as_ref().map(entry_from_row).transpose()
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<AuditEntry>, AuditError> {
        let uuid: Uuid = id
            .parse()
            .map_err(|e: uuid::Error| AuditError::Serialization(e.to_string()))?;
        let table = self.config.audit_table();
        let query = format!("SELECT * FROM {table} WHERE id = $1");

        let row = sqlx::query(&query)
            .bind(uuid)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_err)?;

        row.as_ref().map(entry_from_row).transpose()
    }

    async fn range(&self, from_sequence: u64, limit: u32) -> Result<Vec<AuditEntry>, AuditError> {
        let table = self.config.audit_table();
        let query = format!(
            "SELECT * FROM {table} WHERE sequence >= $1 ORDER BY sequence ASC LIMIT $2"
        );

        let from = i64::try_from(from_sequence)
            .map_err(|e| AuditError::Serialization(e.to_string()))?;

        let rows = sqlx::query(&query)
            .bind(from)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await
            .map_err(storage_err)?;

        rows.iter().map(entry_from_row).collect()
    }

    async fn count(&self) -> Result<u64, AuditError> {
        let table = self.config.audit_table();
        let query = format!("SELECT COUNT(*) FROM {table}");
        let (count,): (i64,) = sqlx::query_as(&query)
            .fetch_one(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    async fn query(&self, query: &AuditQuery) -> Result<AuditPage, AuditError> {
        let table = self.config.audit_table();
        let limit = query.effective_limit();
        let offset = query.effective_offset();

        // Build the WHERE clause from the optional filters. Bind positions
        // are assigned in filter declaration order.
        let mut conditions: Vec<String> = Vec::new();
        let mut position = 0usize;
        let mut next = |clause: &str| {
            position += 1;
            conditions.push(clause.replace("$n", &format!("${position}")));
        };

        if query.action.is_some() {
            next("action = $n");
        }
        if query.entity_type.is_some() {
            next("entity_type = $n");
        }
        if query.entity_id.is_some() {
            next("entity_id = $n");
        }
        if query.actor.is_some() {
            next("(actor->>'email' = $n OR (actor->>'kind' = 'system' AND $n = 'system'))");
        }
        if query.from.is_some() {
            next("recorded_at >= $n");
        }
        if query.to.is_some() {
            next("recorded_at <= $n");
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let select = format!(
            "SELECT * FROM {table} {where_clause} ORDER BY sequence DESC \
             LIMIT {limit} OFFSET {offset}"
        );
        let count = format!("SELECT COUNT(*) FROM {table} {where_clause}");

        fn bind_all<'q>(
            query: &AuditQuery,
            mut q: sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments>,
        ) -> sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments> {
            if let Some(ref action) = query.action {
                q = q.bind(action.clone());
            }
            if let Some(ref entity_type) = query.entity_type {
                q = q.bind(entity_type.clone());
            }
            if let Some(ref entity_id) = query.entity_id {
                q = q.bind(entity_id.clone());
            }
            if let Some(ref actor) = query.actor {
                q = q.bind(actor.clone());
            }
            if let Some(from) = query.from {
                q = q.bind(from);
            }
            if let Some(to) = query.to {
                q = q.bind(to);
            }
            q
        }

        let rows = bind_all(query, sqlx::query(&select))
            .fetch_all(&self.pool)
            .await
            .map_err(storage_err)?;
        let entries: Result<Vec<AuditEntry>, AuditError> =
            rows.iter().map(entry_from_row).collect();

        let mut count_query = sqlx::query_scalar::<_, i64>(&count);
        if let Some(ref action) = query.action {
            count_query = count_query.bind(action.clone());
        }
        if let Some(ref entity_type) = query.entity_type {
            count_query = count_query.bind(entity_type.clone());
        }
        if let Some(ref entity_id) = query.entity_id {
            count_query = count_query.bind(entity_id.clone());
        }
        if let Some(ref actor) = query.actor {
            count_query = count_query.bind(actor.clone());
        }
        if let Some(from) = query.from {
            count_query = count_query.bind(from);
        }
        if let Some(to) = query.to {
            count_query = count_query.bind(to);
        }
        let total = count_query
            .fetch_one(&self.pool)
            .await
            .map_err(storage_err)?;

        Ok(AuditPage {
            entries: entries?,
            total: u64::try_from(total).unwrap_or(0),
            limit,
            offset,
        })
    }
}
