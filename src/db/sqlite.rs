//! SQLite dialect.
//!
//! SQLite has no INFORMATION_SCHEMA; the catalog is read through the
//! `pragma_*` table-valued functions. Attached databases are the schemas
//! (`main`, `temp`, ...). There are no stored routines.
//!
//! Batches run in autocommit mode by default: a failing statement leaves
//! the statements before it applied.

use crate::db::catalog::CatalogQueries;
use crate::db::connector::DialectConnector;
use crate::db::driver::{Driver, NativeSession};
use crate::dsn::NativeConnectionString;
use crate::error::ConnectorResult;
use crate::models::{BatchMode, DefaultSchema, DialectConfig, DialectId, Placeholder};
use async_trait::async_trait;

static CONFIG: DialectConfig = DialectConfig {
    default_schema: DefaultSchema::Named("main"),
    identifier_quote: '"',
    placeholder: Placeholder::QuestionMark,
    probe_query: "SELECT 1",
    version_query: Some("SELECT sqlite_version() AS version"),
    batch_mode: BatchMode::Autocommit,
};

static CATALOG: CatalogQueries = CatalogQueries {
    schemas: "SELECT name AS schema_name FROM pragma_database_list",
    tables: r#"
        SELECT name AS table_name
        FROM pragma_table_list
        WHERE schema = :schema
          AND type IN ('table', 'view')
          AND name NOT LIKE 'sqlite_%'
    "#,
    table_exists: r#"
        SELECT name
        FROM pragma_table_list
        WHERE schema = :schema
          AND name = :table
          AND type IN ('table', 'view')
          AND name NOT LIKE 'sqlite_%'
    "#,
    columns: r#"
        SELECT
            name AS column_name,
            type AS data_type,
            CASE WHEN "notnull" = 0 THEN 'YES' ELSE 'NO' END AS is_nullable,
            dflt_value AS column_default,
            cid + 1 AS ordinal_position
        FROM pragma_table_info(:table, :schema)
        ORDER BY cid
    "#,
    indexes: r#"
        SELECT
            il.name AS index_name,
            COALESCE(ii.name, '<expression>') AS column_name,
            il."unique" AS is_unique,
            CASE WHEN il.origin = 'pk' THEN 1 ELSE 0 END AS is_primary,
            ii.seqno + 1 AS ordinal_position
        FROM pragma_index_list(:table, :schema) AS il,
             pragma_index_info(il.name, :schema) AS ii
        ORDER BY il.seq, ii.seqno
    "#,
    routines: None,
    routine_detail: None,
};

crate::impl_sqlx_session!(SqliteSession, sqlx::SqliteConnection, begin = "BEGIN");

#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDriver;

#[async_trait]
impl Driver for SqliteDriver {
    fn dialect(&self) -> DialectId {
        DialectId::Sqlite
    }

    fn config(&self) -> &'static DialectConfig {
        &CONFIG
    }

    fn catalog(&self) -> &'static CatalogQueries {
        &CATALOG
    }

    async fn open(
        &self,
        native: &NativeConnectionString,
    ) -> ConnectorResult<Box<dyn NativeSession>> {
        let session = SqliteSession::connect(native.expose()).await?;
        Ok(Box::new(session))
    }
}

/// Unconnected SQLite connector.
pub fn connector() -> DialectConnector {
    DialectConnector::new(Box::new(SqliteDriver))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::catalog::render;

    #[test]
    fn test_catalog_renders_positional_placeholders() {
        let (sql, values) = render(
            CATALOG.indexes,
            CONFIG.placeholder,
            &[("schema", "main"), ("table", "users")],
        );
        assert!(sql.contains("pragma_index_list(?, ?)"));
        assert!(sql.contains("pragma_index_info(il.name, ?)"));
        assert_eq!(values, vec!["users", "main", "main"]);
    }

    #[test]
    fn test_config() {
        assert_eq!(CONFIG.qualified_name("main", "users"), r#""main"."users""#);
        assert!(CATALOG.routines.is_none());
    }

    #[tokio::test]
    async fn test_session_runs_unprepared_statements_and_transactions() {
        use crate::db::driver::NativeSession;

        let mut session = SqliteSession::connect("sqlite::memory:").await.unwrap();
        session
            .run("CREATE TABLE t (id INTEGER PRIMARY KEY)")
            .await
            .unwrap();

        session.begin().await.unwrap();
        session.run("INSERT INTO t VALUES (1)").await.unwrap();
        session.rollback().await.unwrap();

        session.begin().await.unwrap();
        session.run("INSERT INTO t VALUES (2)").await.unwrap();
        session.commit().await.unwrap();

        let rows = session.run("SELECT id FROM t").await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].try_i64("id").unwrap(), 2);

        let rows = session
            .fetch("SELECT id FROM t WHERE id = ?", &["2"])
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        Box::new(session).close().await.unwrap();
    }
}
