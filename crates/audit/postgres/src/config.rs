/// Configuration for the `PostgreSQL` audit store backend.
#[derive(Debug, Clone)]
pub struct PostgresAuditConfig {
    /// `PostgreSQL` connection URL.
    pub url: String,

    /// Maximum number of connections in the `sqlx` connection pool.
    pub pool_size: u32,

    /// Database schema to use (e.g. `"public"`).
    pub schema: String,

    /// Prefix applied to table names (e.g. `"archive_"`).
    pub table_prefix: String,
}

impl Default for PostgresAuditConfig {
    fn default() -> Self {
        Self {
            url: String::from("postgres://localhost:5432/openarchive"),
            pool_size: 5,
            schema: String::from("public"),
            table_prefix: String::from("archive_"),
        }
    }
}

impl PostgresAuditConfig {
    /// Return the fully-qualified audit log table name.
    pub(crate) fn audit_table(&self) -> String {
        format!("{}.{}audit_log", self.schema, self.table_prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_name() {
        let cfg = PostgresAuditConfig::default();
        assert_eq!(cfg.audit_table(), "public.archive_audit_log");
    }
}
