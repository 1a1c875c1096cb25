//! PostgreSQL dialect.
//!
//! Catalog names are `sql_identifier`/`name` typed; they are cast to `text`
//! on both sides of every comparison so bound text parameters compare and
//! decode cleanly.

use crate::db::catalog::CatalogQueries;
use crate::db::connector::DialectConnector;
use crate::db::driver::{Driver, NativeSession};
use crate::dsn::NativeConnectionString;
use crate::error::ConnectorResult;
use crate::models::{BatchMode, DefaultSchema, DialectConfig, DialectId, Placeholder};
use async_trait::async_trait;

static CONFIG: DialectConfig = DialectConfig {
    default_schema: DefaultSchema::Named("public"),
    identifier_quote: '"',
    placeholder: Placeholder::Dollar,
    probe_query: "SELECT 1",
    version_query: Some("SELECT version() AS version"),
    batch_mode: BatchMode::Autocommit,
};

static CATALOG: CatalogQueries = CatalogQueries {
    schemas: "SELECT schema_name::text AS schema_name FROM information_schema.schemata",
    tables: r#"
        SELECT table_name::text AS table_name
        FROM information_schema.tables
        WHERE table_schema::text = :schema
          AND table_type IN ('BASE TABLE', 'VIEW')
    "#,
    table_exists: r#"
        SELECT table_name::text AS table_name
        FROM information_schema.tables
        WHERE table_schema::text = :schema
          AND table_name::text = :table
          AND table_type IN ('BASE TABLE', 'VIEW')
    "#,
    columns: r#"
        SELECT
            column_name::text AS column_name,
            data_type::text AS data_type,
            is_nullable::text AS is_nullable,
            column_default::text AS column_default,
            ordinal_position::int8 AS ordinal_position
        FROM information_schema.columns
        WHERE table_schema::text = :schema
          AND table_name::text = :table
        ORDER BY 5
    "#,
    indexes: r#"
        SELECT
            i.relname::text AS index_name,
            a.attname::text AS column_name,
            ix.indisunique AS is_unique,
            ix.indisprimary AS is_primary,
            k.ord::int8 AS ordinal_position
        FROM pg_catalog.pg_index ix
        JOIN pg_catalog.pg_class t ON t.oid = ix.indrelid
        JOIN pg_catalog.pg_class i ON i.oid = ix.indexrelid
        JOIN pg_catalog.pg_namespace n ON n.oid = t.relnamespace
        CROSS JOIN LATERAL unnest(ix.indkey::int2[]) WITH ORDINALITY AS k(attnum, ord)
        JOIN pg_catalog.pg_attribute a ON a.attrelid = t.oid AND a.attnum = k.attnum
        WHERE n.nspname::text = :schema
          AND t.relname::text = :table
        ORDER BY i.relname, k.ord
    "#,
    routines: Some(
        r#"
        SELECT DISTINCT routine_name::text AS routine_name
        FROM information_schema.routines
        WHERE routine_schema::text = :schema
    "#,
    ),
    routine_detail: Some(
        r#"
        SELECT
            r.specific_name::text AS specific_name,
            r.routine_name::text AS routine_name,
            r.routine_type::text AS routine_type,
            r.external_language::text AS language,
            r.data_type::text AS return_type,
            r.routine_definition::text AS definition,
            p.parameter_name::text AS parameter_name,
            p.parameter_mode::text AS parameter_mode,
            p.data_type::text AS parameter_type,
            p.ordinal_position::int8 AS ordinal_position
        FROM information_schema.routines r
        LEFT JOIN information_schema.parameters p
            ON p.specific_schema = r.specific_schema
           AND p.specific_name = r.specific_name
        WHERE r.routine_schema::text = :schema
          AND r.routine_name::text = :routine
        ORDER BY r.specific_name, p.ordinal_position
    "#,
    ),
};

crate::impl_sqlx_session!(PgSession, sqlx::PgConnection, begin = "BEGIN");

#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresDriver;

#[async_trait]
impl Driver for PostgresDriver {
    fn dialect(&self) -> DialectId {
        DialectId::Postgres
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
        let session = PgSession::connect(native.expose()).await?;
        Ok(Box::new(session))
    }
}

/// Unconnected PostgreSQL connector.
pub fn connector() -> DialectConnector {
    DialectConnector::new(Box::new(PostgresDriver))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::catalog::render;

    #[test]
    fn test_casts_survive_rendering() {
        let (sql, values) = render(
            CATALOG.routine_detail.unwrap_or_default(),
            CONFIG.placeholder,
            &[("schema", "public"), ("routine", "add_user")],
        );
        assert!(sql.contains("r.routine_schema::text = $1"));
        assert!(sql.contains("r.routine_name::text = $2"));
        assert!(sql.contains("p.ordinal_position::int8"));
        assert_eq!(values, vec!["public", "add_user"]);
    }

    #[test]
    fn test_index_query_keeps_array_cast() {
        let (sql, values) = render(
            CATALOG.indexes,
            CONFIG.placeholder,
            &[("schema", "public"), ("table", "users")],
        );
        assert!(sql.contains("ix.indkey::int2[]"));
        assert_eq!(values.len(), 2);
    }
}
