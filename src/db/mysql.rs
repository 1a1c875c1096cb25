//! MySQL / MariaDB dialect.
//!
//! A MySQL schema is a database, so the default schema is the database
//! named in the DSN path. Catalog columns are converted to utf8 because
//! `information_schema` reports some of them as binary strings.

use crate::db::catalog::CatalogQueries;
use crate::db::connector::DialectConnector;
use crate::db::driver::{Driver, NativeSession};
use crate::dsn::NativeConnectionString;
use crate::error::ConnectorResult;
use crate::models::{BatchMode, DefaultSchema, DialectConfig, DialectId, Placeholder};
use async_trait::async_trait;

static CONFIG: DialectConfig = DialectConfig {
    default_schema: DefaultSchema::ConnectedDatabase,
    identifier_quote: '`',
    placeholder: Placeholder::QuestionMark,
    probe_query: "SELECT 1",
    version_query: Some("SELECT VERSION() AS version"),
    batch_mode: BatchMode::Autocommit,
};

static CATALOG: CatalogQueries = CatalogQueries {
    schemas: "SELECT CONVERT(SCHEMA_NAME USING utf8) AS schema_name FROM information_schema.SCHEMATA",
    tables: r#"
        SELECT CONVERT(TABLE_NAME USING utf8) AS table_name
        FROM information_schema.TABLES
        WHERE TABLE_SCHEMA = :schema
          AND TABLE_TYPE IN ('BASE TABLE', 'VIEW')
    "#,
    table_exists: r#"
        SELECT CONVERT(TABLE_NAME USING utf8) AS table_name
        FROM information_schema.TABLES
        WHERE TABLE_SCHEMA = :schema
          AND TABLE_NAME = :table
          AND TABLE_TYPE IN ('BASE TABLE', 'VIEW')
    "#,
    columns: r#"
        SELECT
            CONVERT(COLUMN_NAME USING utf8) AS column_name,
            CONVERT(COLUMN_TYPE USING utf8) AS data_type,
            CONVERT(IS_NULLABLE USING utf8) AS is_nullable,
            CONVERT(COLUMN_DEFAULT USING utf8) AS column_default,
            ORDINAL_POSITION AS ordinal_position
        FROM information_schema.COLUMNS
        WHERE TABLE_SCHEMA = :schema
          AND TABLE_NAME = :table
        ORDER BY ORDINAL_POSITION
    "#,
    indexes: r#"
        SELECT
            CONVERT(INDEX_NAME USING utf8) AS index_name,
            CONVERT(COLUMN_NAME USING utf8) AS column_name,
            CASE WHEN NON_UNIQUE = 0 THEN 1 ELSE 0 END AS is_unique,
            CASE WHEN INDEX_NAME = 'PRIMARY' THEN 1 ELSE 0 END AS is_primary,
            SEQ_IN_INDEX AS ordinal_position
        FROM information_schema.STATISTICS
        WHERE TABLE_SCHEMA = :schema
          AND TABLE_NAME = :table
          AND COLUMN_NAME IS NOT NULL
        ORDER BY INDEX_NAME, SEQ_IN_INDEX
    "#,
    routines: Some(
        r#"
        SELECT CONVERT(ROUTINE_NAME USING utf8) AS routine_name
        FROM information_schema.ROUTINES
        WHERE ROUTINE_SCHEMA = :schema
    "#,
    ),
    routine_detail: Some(
        r#"
        SELECT
            CONVERT(r.SPECIFIC_NAME USING utf8) AS specific_name,
            CONVERT(r.ROUTINE_NAME USING utf8) AS routine_name,
            CONVERT(r.ROUTINE_TYPE USING utf8) AS routine_type,
            CONVERT(r.ROUTINE_BODY USING utf8) AS language,
            CONVERT(r.DTD_IDENTIFIER USING utf8) AS return_type,
            CONVERT(r.ROUTINE_DEFINITION USING utf8) AS definition,
            CONVERT(p.PARAMETER_NAME USING utf8) AS parameter_name,
            CONVERT(p.PARAMETER_MODE USING utf8) AS parameter_mode,
            CONVERT(p.DTD_IDENTIFIER USING utf8) AS parameter_type,
            p.ORDINAL_POSITION AS ordinal_position
        FROM information_schema.ROUTINES r
        LEFT JOIN information_schema.PARAMETERS p
            ON p.SPECIFIC_SCHEMA = r.ROUTINE_SCHEMA
           AND p.SPECIFIC_NAME = r.SPECIFIC_NAME
           AND p.ORDINAL_POSITION > 0
        WHERE r.ROUTINE_SCHEMA = :schema
          AND r.ROUTINE_NAME = :routine
        ORDER BY r.SPECIFIC_NAME, p.ORDINAL_POSITION
    "#,
    ),
};

crate::impl_sqlx_session!(MySqlSession, sqlx::MySqlConnection, begin = "START TRANSACTION");

#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlDriver;

#[async_trait]
impl Driver for MySqlDriver {
    fn dialect(&self) -> DialectId {
        DialectId::MySql
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
        let session = MySqlSession::connect(native.expose()).await?;
        Ok(Box::new(session))
    }
}

/// Unconnected MySQL connector.
pub fn connector() -> DialectConnector {
    DialectConnector::new(Box::new(MySqlDriver))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::catalog::render;

    #[test]
    fn test_backtick_quoting() {
        assert_eq!(CONFIG.qualified_name("shop", "or`ders"), "`shop`.`or``ders`");
    }

    #[test]
    fn test_routine_detail_binds_in_order() {
        let (sql, values) = render(
            CATALOG.routine_detail.unwrap_or_default(),
            CONFIG.placeholder,
            &[("routine", "add_user"), ("schema", "shop")],
        );
        assert!(sql.contains("r.ROUTINE_SCHEMA = ?"));
        assert_eq!(values, vec!["shop", "add_user"]);
    }
}
