//! The uniform connector contract and its dialect-agnostic implementation.
//!
//! A [`DialectConnector`] owns at most one native session. Every operation
//! takes the connector's internal lock for its whole duration, so a
//! connector shared behind `Arc` never runs two native calls at once.

use crate::db::batch::{execute_statements, split_statements, with_timeout};
use crate::db::catalog;
use crate::db::driver::{Driver, NativeSession, connection_suggestion};
use crate::dsn::{DsnParser, obfuscate_dsn};
use crate::error::{ConnectionFailure, ConnectorError, ConnectorResult};
use crate::models::{
    ConnectOptions, ConnectionInfo, DefaultSchema, DialectConfig, DialectId, SqlResult, SqlRow,
    StoredProcedure, TableColumn, TableIndex,
};
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Connection, introspection and execution over one backend.
///
/// Every method except the identity accessors fails with
/// [`ConnectorError::NotConnected`] while the connector is unconnected; the
/// check happens before anything is sent to the native driver.
#[async_trait]
pub trait Connector: Send + Sync + std::fmt::Debug {
    fn dialect(&self) -> DialectId;

    fn display_name(&self) -> &'static str {
        self.dialect().display_name()
    }

    fn dsn_parser(&self) -> &'static dyn DsnParser;

    fn dialect_config(&self) -> &'static DialectConfig;

    /// Connect with default options.
    async fn connect(&self, dsn: &str) -> ConnectorResult<ConnectionInfo> {
        self.connect_with(dsn, ConnectOptions::default()).await
    }

    /// Parse the DSN, open one native session and probe it.
    ///
    /// Fails with [`ConnectorError::AlreadyConnected`] when a session is
    /// already open. On any failure the connector stays unconnected.
    async fn connect_with(&self, dsn: &str, options: ConnectOptions)
    -> ConnectorResult<ConnectionInfo>;

    /// Close the native session. A no-op when unconnected.
    async fn disconnect(&self);

    async fn is_connected(&self) -> bool;

    async fn connection_info(&self) -> Option<ConnectionInfo>;

    /// Schema names, ascending.
    async fn get_schemas(&self) -> ConnectorResult<Vec<String>>;

    /// Table names in `schema` (or the default schema), ascending.
    async fn get_tables(&self, schema: Option<&str>) -> ConnectorResult<Vec<String>>;

    /// True iff exactly one catalog row matches the table.
    async fn table_exists(&self, table: &str, schema: Option<&str>) -> ConnectorResult<bool>;

    async fn get_table_indexes(
        &self,
        table: &str,
        schema: Option<&str>,
    ) -> ConnectorResult<Vec<TableIndex>>;

    /// Columns ordered by ordinal position. Fails with
    /// [`ConnectorError::NotFound`] when the table has no columns.
    async fn get_table_schema(
        &self,
        table: &str,
        schema: Option<&str>,
    ) -> ConnectorResult<Vec<TableColumn>>;

    /// Routine names, ascending.
    async fn get_stored_procedures(&self, schema: Option<&str>) -> ConnectorResult<Vec<String>>;

    async fn get_stored_procedure_detail(
        &self,
        name: &str,
        schema: Option<&str>,
    ) -> ConnectorResult<StoredProcedure>;

    /// Run `;`-separated statements in order and concatenate their rows.
    async fn execute_sql(&self, sql: &str) -> ConnectorResult<SqlResult>;
}

struct ActiveConnection {
    session: Box<dyn NativeSession>,
    options: ConnectOptions,
    info: ConnectionInfo,
}

/// Connector for any dialect with a [`Driver`].
pub struct DialectConnector {
    driver: Box<dyn Driver>,
    state: Mutex<Option<ActiveConnection>>,
}

impl std::fmt::Debug for DialectConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DialectConnector")
            .field("driver", &self.driver)
            .finish_non_exhaustive()
    }
}

impl DialectConnector {
    pub fn new(driver: Box<dyn Driver>) -> Self {
        Self {
            driver,
            state: Mutex::new(None),
        }
    }

    /// Unconnected connector for a dialect compiled into this build.
    pub fn for_dialect(dialect: DialectId) -> ConnectorResult<Self> {
        crate::db::builtin_connectors()
            .into_iter()
            .find(|c| c.dialect() == dialect)
            .ok_or_else(|| ConnectorError::UnknownDialect {
                dialect: format!("{dialect} (not compiled into this build)"),
            })
    }

    fn config(&self) -> &'static DialectConfig {
        self.driver.config()
    }

    fn not_connected(&self) -> ConnectorError {
        ConnectorError::not_connected(self.driver.dialect())
    }

    fn unreachable(&self, err: ConnectorError) -> ConnectorError {
        match err {
            ConnectorError::Connection {
                message,
                suggestion,
                ..
            } => ConnectorError::connection(ConnectionFailure::Unreachable, message, suggestion),
            other => {
                let message = other.to_string();
                let suggestion = connection_suggestion(self.driver.dialect(), &message);
                ConnectorError::connection(ConnectionFailure::Unreachable, message, suggestion)
            }
        }
    }

    /// Resolve the schema a call targets. Checks the connection first.
    fn resolve_schema(
        &self,
        state: &Option<ActiveConnection>,
        schema: Option<&str>,
    ) -> ConnectorResult<String> {
        let active = state.as_ref().ok_or_else(|| self.not_connected())?;
        match schema.map(str::trim).filter(|s| !s.is_empty()) {
            Some(schema) => Ok(schema.to_string()),
            None => active.info.default_schema.clone().ok_or_else(|| {
                ConnectorError::invalid_input(
                    "no schema given and the DSN names no database to default to",
                )
            }),
        }
    }

    /// Run one catalog query. A timeout or lost session leaves the
    /// connector unconnected.
    async fn catalog_query(
        &self,
        state: &mut Option<ActiveConnection>,
        sql: &str,
        args: &[(&str, &str)],
        context: &str,
    ) -> ConnectorResult<Vec<SqlRow>> {
        let active = state.as_mut().ok_or_else(|| self.not_connected())?;
        let (sql, values) = catalog::render(sql, self.config().placeholder, args);
        let params: Vec<&str> = values.iter().map(String::as_str).collect();
        debug!(dialect = %self.driver.dialect(), context = %context, "Running catalog query");

        let timeout = active.options.query_timeout;
        match with_timeout("catalog query", timeout, active.session.fetch(&sql, &params)).await {
            Ok(rows) => Ok(rows),
            Err(e) => {
                self.drop_if_broken(state, &e);
                Err(e.with_context(context))
            }
        }
    }

    fn drop_if_broken(&self, state: &mut Option<ActiveConnection>, err: &ConnectorError) {
        if !breaks_session(err) {
            return;
        }
        if state.take().is_some() {
            warn!(
                dialect = %self.driver.dialect(),
                error = %err,
                "Native session unusable, connector is now unconnected"
            );
        }
    }

    async fn server_version(
        &self,
        session: &mut dyn NativeSession,
        timeout: Duration,
    ) -> Option<String> {
        let query = self.config().version_query?;
        match with_timeout("version query", timeout, session.run(query)).await {
            Ok(rows) => rows.first().and_then(first_value),
            Err(e) => {
                warn!(dialect = %self.driver.dialect(), error = %e, "Could not read server version");
                None
            }
        }
    }
}

/// Errors after which the session cannot be trusted.
fn breaks_session(err: &ConnectorError) -> bool {
    match err {
        ConnectorError::Statement { source, .. } => breaks_session(source),
        ConnectorError::Timeout { .. } => true,
        other => other.is_connection_lost(),
    }
}

fn first_value(row: &SqlRow) -> Option<String> {
    let column = row.columns().next()?;
    match row.get(column)? {
        JsonValue::Null => None,
        JsonValue::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

#[async_trait]
impl Connector for DialectConnector {
    fn dialect(&self) -> DialectId {
        self.driver.dialect()
    }

    fn dsn_parser(&self) -> &'static dyn DsnParser {
        self.driver.dsn_parser()
    }

    fn dialect_config(&self) -> &'static DialectConfig {
        self.config()
    }

    async fn connect_with(
        &self,
        dsn: &str,
        options: ConnectOptions,
    ) -> ConnectorResult<ConnectionInfo> {
        let dialect = self.driver.dialect();
        let mut state = self.state.lock().await;
        if state.is_some() {
            return Err(ConnectorError::AlreadyConnected { dialect });
        }

        let native = self.driver.dsn_parser().parse(dsn)?;
        let masked = obfuscate_dsn(dsn);
        info!(dialect = %dialect, dsn = %masked, "Connecting");

        let mut session =
            match tokio::time::timeout(options.connect_timeout, self.driver.open(&native)).await {
                Ok(Ok(session)) => session,
                Ok(Err(e)) => {
                    warn!(dialect = %dialect, dsn = %masked, error = %e, "Connect failed");
                    return Err(self.unreachable(e));
                }
                Err(_) => {
                    warn!(dialect = %dialect, dsn = %masked, "Connect timed out");
                    return Err(ConnectorError::timeout(
                        "connect",
                        options.connect_timeout.as_secs(),
                    ));
                }
            };

        let config = self.config();
        let probe = with_timeout(
            "probe query",
            options.query_timeout,
            session.run(config.probe_query),
        )
        .await;
        if let Err(e) = probe {
            warn!(dialect = %dialect, dsn = %masked, error = %e, "Probe query failed");
            if !breaks_session(&e) {
                if let Err(close_err) = session.close().await {
                    debug!(error = %close_err, "Closing after failed probe");
                }
            }
            let message = e.to_string();
            let suggestion = connection_suggestion(dialect, &message);
            return Err(ConnectorError::connection(
                ConnectionFailure::ProbeFailed,
                message,
                suggestion,
            ));
        }

        let server_version = self
            .server_version(session.as_mut(), options.query_timeout)
            .await;
        let default_schema = match config.default_schema {
            DefaultSchema::Named(name) => Some(name.to_string()),
            DefaultSchema::ConnectedDatabase => native.database().map(str::to_string),
        };
        let info = ConnectionInfo {
            dialect,
            dsn: masked,
            server_version,
            database: native.database().map(str::to_string),
            default_schema,
            batch_mode: options.batch_mode.unwrap_or(config.batch_mode),
        };

        info!(
            dialect = %dialect,
            dsn = %info.dsn,
            server_version = ?info.server_version,
            batch_mode = %info.batch_mode,
            "Connected"
        );

        *state = Some(ActiveConnection {
            session,
            options,
            info: info.clone(),
        });
        Ok(info)
    }

    async fn disconnect(&self) {
        let active = self.state.lock().await.take();
        let Some(active) = active else {
            debug!(dialect = %self.dialect(), "Disconnect on unconnected connector");
            return;
        };
        let limit = active.options.connect_timeout;
        match with_timeout("disconnect", limit, active.session.close()).await {
            Ok(()) => info!(dialect = %self.dialect(), dsn = %active.info.dsn, "Disconnected"),
            Err(e) => warn!(
                dialect = %self.dialect(),
                dsn = %active.info.dsn,
                error = %e,
                "Error while closing connection"
            ),
        }
    }

    async fn is_connected(&self) -> bool {
        self.state.lock().await.is_some()
    }

    async fn connection_info(&self) -> Option<ConnectionInfo> {
        self.state
            .lock()
            .await
            .as_ref()
            .map(|active| active.info.clone())
    }

    async fn get_schemas(&self) -> ConnectorResult<Vec<String>> {
        let mut state = self.state.lock().await;
        let queries = self.driver.catalog();
        let rows = self
            .catalog_query(&mut state, queries.schemas, &[], "schemas")
            .await?;
        catalog::sorted_names(&rows, "schema_name")
    }

    async fn get_tables(&self, schema: Option<&str>) -> ConnectorResult<Vec<String>> {
        let mut state = self.state.lock().await;
        let schema = self.resolve_schema(&state, schema)?;
        let context = self.config().quote_identifier(&schema);
        let rows = self
            .catalog_query(
                &mut state,
                self.driver.catalog().tables,
                &[("schema", &schema)],
                &context,
            )
            .await?;
        catalog::sorted_names(&rows, "table_name")
    }

    async fn table_exists(&self, table: &str, schema: Option<&str>) -> ConnectorResult<bool> {
        let mut state = self.state.lock().await;
        let schema = self.resolve_schema(&state, schema)?;
        let context = self.config().qualified_name(&schema, table);
        let rows = self
            .catalog_query(
                &mut state,
                self.driver.catalog().table_exists,
                &[("schema", &schema), ("table", table)],
                &context,
            )
            .await?;
        Ok(rows.len() == 1)
    }

    async fn get_table_indexes(
        &self,
        table: &str,
        schema: Option<&str>,
    ) -> ConnectorResult<Vec<TableIndex>> {
        let mut state = self.state.lock().await;
        let schema = self.resolve_schema(&state, schema)?;
        let context = self.config().qualified_name(&schema, table);
        let rows = self
            .catalog_query(
                &mut state,
                self.driver.catalog().indexes,
                &[("schema", &schema), ("table", table)],
                &context,
            )
            .await?;
        catalog::indexes_from_rows(&rows)
    }

    async fn get_table_schema(
        &self,
        table: &str,
        schema: Option<&str>,
    ) -> ConnectorResult<Vec<TableColumn>> {
        let mut state = self.state.lock().await;
        let schema = self.resolve_schema(&state, schema)?;
        let context = self.config().qualified_name(&schema, table);
        let rows = self
            .catalog_query(
                &mut state,
                self.driver.catalog().columns,
                &[("schema", &schema), ("table", table)],
                &context,
            )
            .await?;
        if rows.is_empty() {
            return Err(ConnectorError::not_found("table", context));
        }
        catalog::columns_from_rows(&rows)
    }

    async fn get_stored_procedures(&self, schema: Option<&str>) -> ConnectorResult<Vec<String>> {
        let mut state = self.state.lock().await;
        let schema = self.resolve_schema(&state, schema)?;
        let Some(sql) = self.driver.catalog().routines else {
            return Ok(Vec::new());
        };
        let context = self.config().quote_identifier(&schema);
        let rows = self
            .catalog_query(&mut state, sql, &[("schema", &schema)], &context)
            .await?;
        catalog::sorted_names(&rows, "routine_name")
    }

    async fn get_stored_procedure_detail(
        &self,
        name: &str,
        schema: Option<&str>,
    ) -> ConnectorResult<StoredProcedure> {
        let mut state = self.state.lock().await;
        let schema = self.resolve_schema(&state, schema)?;
        let context = self.config().qualified_name(&schema, name);
        let Some(sql) = self.driver.catalog().routine_detail else {
            return Err(ConnectorError::not_found("stored procedure", context));
        };
        let rows = self
            .catalog_query(
                &mut state,
                sql,
                &[("schema", &schema), ("routine", name)],
                &context,
            )
            .await?;
        if rows.is_empty() {
            return Err(ConnectorError::not_found("stored procedure", context));
        }
        catalog::routine_from_rows(&rows, &context)
    }

    async fn execute_sql(&self, sql: &str) -> ConnectorResult<SqlResult> {
        let mut state = self.state.lock().await;
        let active = state.as_mut().ok_or_else(|| self.not_connected())?;
        let dialect = self.driver.dialect();
        let statements = split_statements(sql, dialect);
        let mode = active.info.batch_mode;
        debug!(
            dialect = %dialect,
            statements = statements.len(),
            batch_mode = %mode,
            "Executing SQL"
        );

        let timeout = active.options.query_timeout;
        let result =
            execute_statements(active.session.as_mut(), &statements, mode, timeout).await;
        if let Err(e) = &result {
            self.drop_if_broken(&mut state, e);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_breaks_session() {
        assert!(breaks_session(&ConnectorError::timeout("statement", 30)));
        assert!(breaks_session(&ConnectorError::statement(
            2,
            ConnectorError::connection(ConnectionFailure::Lost, "reset", "reconnect"),
        )));
        assert!(!breaks_session(&ConnectorError::statement(
            1,
            ConnectorError::query("syntax error", Some("42601".to_string())),
        )));
    }

    #[test]
    fn test_first_value() {
        let mut row = SqlRow::new();
        row.insert("version", json!("3.45.1"));
        assert_eq!(first_value(&row), Some("3.45.1".to_string()));

        let mut numeric = SqlRow::new();
        numeric.insert("v", json!(8));
        assert_eq!(first_value(&numeric), Some("8".to_string()));

        assert_eq!(first_value(&SqlRow::new()), None);
    }

    #[cfg(not(feature = "odbc"))]
    #[test]
    fn test_for_dialect_without_odbc() {
        let err = DialectConnector::for_dialect(DialectId::Hadb).unwrap_err();
        assert!(matches!(err, ConnectorError::UnknownDialect { .. }));
    }

    #[test]
    fn test_for_dialect() {
        let connector = DialectConnector::for_dialect(DialectId::Sqlite).unwrap();
        assert_eq!(connector.dialect(), DialectId::Sqlite);
        assert_eq!(connector.display_name(), "SQLite");
    }
}
