//! HADB dialect over ODBC.
//!
//! ODBC calls block, and a connection handle must not be used from two
//! threads at once. Each session therefore owns a dedicated worker thread
//! that holds the `odbc_api::Connection` and serves commands sent over a
//! channel. Dropping the session's sender ends the worker, which closes
//! the connection.
//!
//! Every value is fetched as text, so rows carry strings (or NULL).

use crate::db::catalog::CatalogQueries;
use crate::db::connector::DialectConnector;
use crate::db::driver::{Driver, NativeSession, connection_suggestion};
use crate::dsn::NativeConnectionString;
use crate::error::{ConnectionFailure, ConnectorError, ConnectorResult};
use crate::models::{BatchMode, DefaultSchema, DialectConfig, DialectId, Placeholder, SqlRow};
use async_trait::async_trait;
use odbc_api::buffers::TextRowSet;
use odbc_api::{
    Connection, ConnectionOptions, Cursor, Environment, IntoParameter, ResultSetMetadata,
};
use once_cell::sync::OnceCell;
use serde_json::Value as JsonValue;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

/// Rows fetched per round trip.
const BATCH_SIZE: usize = 256;

/// Upper bound for a single text value, in bytes.
const MAX_TEXT_LEN: usize = 16 * 1024;

const COMMAND_QUEUE: usize = 8;

static CONFIG: DialectConfig = DialectConfig {
    default_schema: DefaultSchema::Named("PUBLIC"),
    identifier_quote: '"',
    placeholder: Placeholder::QuestionMark,
    probe_query: "SELECT 1 FROM DUMMY",
    version_query: Some("SELECT VERSION AS version FROM SYS.M_DATABASE"),
    batch_mode: BatchMode::Autocommit,
};

static CATALOG: CatalogQueries = CatalogQueries {
    schemas: "SELECT SCHEMA_NAME AS schema_name FROM SYS.SCHEMAS",
    tables: r#"
        SELECT TABLE_NAME AS table_name FROM SYS.TABLES WHERE SCHEMA_NAME = :schema
        UNION ALL
        SELECT VIEW_NAME FROM SYS.VIEWS WHERE SCHEMA_NAME = :schema
    "#,
    table_exists: r#"
        SELECT TABLE_NAME AS table_name FROM SYS.TABLES
        WHERE SCHEMA_NAME = :schema AND TABLE_NAME = :table
        UNION ALL
        SELECT VIEW_NAME FROM SYS.VIEWS
        WHERE SCHEMA_NAME = :schema AND VIEW_NAME = :table
    "#,
    columns: r#"
        SELECT
            COLUMN_NAME AS column_name,
            DATA_TYPE_NAME AS data_type,
            IS_NULLABLE AS is_nullable,
            DEFAULT_VALUE AS column_default,
            POSITION AS ordinal_position
        FROM SYS.TABLE_COLUMNS
        WHERE SCHEMA_NAME = :schema AND TABLE_NAME = :table
        ORDER BY POSITION
    "#,
    indexes: r#"
        SELECT
            INDEX_NAME AS index_name,
            COLUMN_NAME AS column_name,
            CASE WHEN "CONSTRAINT" = 'PRIMARY KEY' OR "CONSTRAINT" LIKE '%UNIQUE%'
                THEN 1 ELSE 0 END AS is_unique,
            CASE WHEN "CONSTRAINT" = 'PRIMARY KEY' THEN 1 ELSE 0 END AS is_primary,
            POSITION AS ordinal_position
        FROM SYS.INDEX_COLUMNS
        WHERE SCHEMA_NAME = :schema AND TABLE_NAME = :table
        ORDER BY INDEX_NAME, POSITION
    "#,
    routines: Some(
        r#"
        SELECT PROCEDURE_NAME AS routine_name FROM SYS.PROCEDURES WHERE SCHEMA_NAME = :schema
        UNION ALL
        SELECT FUNCTION_NAME FROM SYS.FUNCTIONS WHERE SCHEMA_NAME = :schema
    "#,
    ),
    routine_detail: Some(
        r#"
        SELECT
            p.PROCEDURE_OID AS specific_name,
            p.PROCEDURE_NAME AS routine_name,
            'PROCEDURE' AS routine_type,
            'SQLSCRIPT' AS language,
            CAST(NULL AS NVARCHAR(256)) AS return_type,
            p.DEFINITION AS definition,
            pp.PARAMETER_NAME AS parameter_name,
            pp.PARAMETER_TYPE AS parameter_mode,
            pp.DATA_TYPE_NAME AS parameter_type,
            pp.POSITION AS ordinal_position
        FROM SYS.PROCEDURES p
        LEFT JOIN SYS.PROCEDURE_PARAMETERS pp ON pp.PROCEDURE_OID = p.PROCEDURE_OID
        WHERE p.SCHEMA_NAME = :schema AND p.PROCEDURE_NAME = :routine
        UNION ALL
        SELECT
            f.FUNCTION_OID,
            f.FUNCTION_NAME,
            'FUNCTION',
            'SQLSCRIPT',
            (SELECT MAX(r.DATA_TYPE_NAME) FROM SYS.FUNCTION_PARAMETERS r
             WHERE r.FUNCTION_OID = f.FUNCTION_OID AND r.PARAMETER_TYPE = 'RETURN'),
            f.DEFINITION,
            fp.PARAMETER_NAME,
            fp.PARAMETER_TYPE,
            fp.DATA_TYPE_NAME,
            fp.POSITION
        FROM SYS.FUNCTIONS f
        LEFT JOIN SYS.FUNCTION_PARAMETERS fp
            ON fp.FUNCTION_OID = f.FUNCTION_OID AND fp.PARAMETER_TYPE <> 'RETURN'
        WHERE f.SCHEMA_NAME = :schema AND f.FUNCTION_NAME = :routine
        ORDER BY 1, 10
    "#,
    ),
};

static ENVIRONMENT: OnceCell<Environment> = OnceCell::new();

/// Process-wide ODBC environment, created on first use.
fn environment() -> ConnectorResult<&'static Environment> {
    ENVIRONMENT.get_or_try_init(Environment::new).map_err(|e| {
        ConnectorError::connection(
            ConnectionFailure::Unreachable,
            format!("Failed to create ODBC environment: {e}"),
            "Check that an ODBC driver manager (unixODBC or iODBC) is installed",
        )
    })
}

/// SQLSTATE class 08 means the connection itself failed.
fn is_lost_state(state: &str) -> bool {
    state.starts_with("08")
}

fn odbc_error(err: odbc_api::Error) -> ConnectorError {
    let state = match &err {
        odbc_api::Error::Diagnostics { record, .. } => Some(record.state.as_str().to_string()),
        _ => None,
    };
    match state {
        Some(state) if is_lost_state(&state) => ConnectorError::connection(
            ConnectionFailure::Lost,
            err.to_string(),
            "Reconnect to the database",
        ),
        state => ConnectorError::query(err.to_string(), state),
    }
}

fn worker_gone() -> ConnectorError {
    ConnectorError::connection(
        ConnectionFailure::Lost,
        "ODBC session worker stopped",
        "Reconnect to the database",
    )
}

type Reply<T> = oneshot::Sender<ConnectorResult<T>>;

enum Command {
    Fetch {
        sql: String,
        params: Vec<String>,
        reply: Reply<Vec<SqlRow>>,
    },
    Begin {
        reply: Reply<()>,
    },
    Commit {
        reply: Reply<()>,
    },
    Rollback {
        reply: Reply<()>,
    },
}

fn fetch_rows(conn: &Connection<'static>, sql: &str, params: &[String]) -> ConnectorResult<Vec<SqlRow>> {
    let mut prepared = conn.prepare(sql).map_err(odbc_error)?;
    let params: Vec<_> = params.iter().map(|p| p.as_str().into_parameter()).collect();
    let Some(mut cursor) = prepared.execute(&params[..]).map_err(odbc_error)? else {
        return Ok(Vec::new());
    };

    let names = cursor
        .column_names()
        .map_err(odbc_error)?
        .collect::<Result<Vec<String>, _>>()
        .map_err(odbc_error)?;
    let mut buffers =
        TextRowSet::for_cursor(BATCH_SIZE, &mut cursor, Some(MAX_TEXT_LEN)).map_err(odbc_error)?;
    let mut row_cursor = cursor.bind_buffer(&mut buffers).map_err(odbc_error)?;

    let mut rows = Vec::new();
    while let Some(batch) = row_cursor.fetch().map_err(odbc_error)? {
        for row_idx in 0..batch.num_rows() {
            let row: SqlRow = names
                .iter()
                .enumerate()
                .map(|(col_idx, name)| {
                    let value = batch
                        .at(col_idx, row_idx)
                        .map(|bytes| JsonValue::String(String::from_utf8_lossy(bytes).into_owned()))
                        .unwrap_or(JsonValue::Null);
                    (name.clone(), value)
                })
                .collect();
            rows.push(row);
        }
    }
    Ok(rows)
}

/// End a manual transaction and return to autocommit.
fn finish_transaction(conn: &Connection<'static>, commit: bool) -> ConnectorResult<()> {
    let outcome = if commit { conn.commit() } else { conn.rollback() };
    outcome.map_err(odbc_error)?;
    conn.set_autocommit(true).map_err(odbc_error)
}

fn run_worker(
    connection_string: String,
    ready: oneshot::Sender<ConnectorResult<()>>,
    mut commands: mpsc::Receiver<Command>,
) {
    let opened = environment().and_then(|env| {
        env.connect_with_connection_string(&connection_string, ConnectionOptions::default())
            .map_err(|e| {
                let message = e.to_string();
                let suggestion = connection_suggestion(DialectId::Hadb, &message);
                ConnectorError::connection(ConnectionFailure::Unreachable, message, suggestion)
            })
    });
    let conn = match opened {
        Ok(conn) => conn,
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };
    if ready.send(Ok(())).is_err() {
        // Caller gave up (connect timeout) before the handshake finished.
        return;
    }

    let mut in_transaction = false;
    while let Some(command) = commands.blocking_recv() {
        match command {
            Command::Fetch { sql, params, reply } => {
                let _ = reply.send(fetch_rows(&conn, &sql, &params));
            }
            Command::Begin { reply } => {
                let result = conn.set_autocommit(false).map_err(odbc_error);
                in_transaction = result.is_ok();
                let _ = reply.send(result);
            }
            Command::Commit { reply } => {
                in_transaction = false;
                let _ = reply.send(finish_transaction(&conn, true));
            }
            Command::Rollback { reply } => {
                in_transaction = false;
                let _ = reply.send(finish_transaction(&conn, false));
            }
        }
    }

    // Disconnecting with an open transaction fails.
    if in_transaction {
        if let Err(e) = finish_transaction(&conn, false) {
            warn!(error = %e, "Rollback before disconnect failed");
        }
    }
    debug!("ODBC session worker exiting");
}

/// Handle to a worker-owned ODBC connection.
pub struct OdbcSession {
    commands: mpsc::Sender<Command>,
}

impl OdbcSession {
    async fn request<T: Send>(
        &self,
        build: impl FnOnce(Reply<T>) -> Command + Send,
    ) -> ConnectorResult<T> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(build(reply))
            .await
            .map_err(|_| worker_gone())?;
        response.await.map_err(|_| worker_gone())?
    }
}

#[async_trait]
impl NativeSession for OdbcSession {
    async fn fetch(&mut self, sql: &str, params: &[&str]) -> ConnectorResult<Vec<SqlRow>> {
        let sql = sql.to_string();
        let params = params.iter().map(|p| p.to_string()).collect();
        self.request(|reply| Command::Fetch { sql, params, reply })
            .await
    }

    async fn run(&mut self, sql: &str) -> ConnectorResult<Vec<SqlRow>> {
        self.fetch(sql, &[]).await
    }

    async fn begin(&mut self) -> ConnectorResult<()> {
        self.request(|reply| Command::Begin { reply }).await
    }

    async fn commit(&mut self) -> ConnectorResult<()> {
        self.request(|reply| Command::Commit { reply }).await
    }

    async fn rollback(&mut self) -> ConnectorResult<()> {
        self.request(|reply| Command::Rollback { reply }).await
    }

    async fn close(self: Box<Self>) -> ConnectorResult<()> {
        drop(self.commands);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct HadbDriver;

#[async_trait]
impl Driver for HadbDriver {
    fn dialect(&self) -> DialectId {
        DialectId::Hadb
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
        let (commands, receiver) = mpsc::channel(COMMAND_QUEUE);
        let (ready, opened) = oneshot::channel();
        let connection_string = native.expose().to_string();

        std::thread::Builder::new()
            .name("odbc-session".to_string())
            .spawn(move || run_worker(connection_string, ready, receiver))
            .map_err(|e| ConnectorError::internal(format!("Failed to start ODBC worker: {e}")))?;

        opened.await.map_err(|_| worker_gone())??;
        Ok(Box::new(OdbcSession { commands }))
    }
}

/// Unconnected HADB connector.
pub fn connector() -> DialectConnector {
    DialectConnector::new(Box::new(HadbDriver))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::catalog::render;

    #[test]
    fn test_lost_states() {
        assert!(is_lost_state("08S01"));
        assert!(is_lost_state("08003"));
        assert!(!is_lost_state("23000"));
        assert!(!is_lost_state("42S02"));
    }

    #[test]
    fn test_routine_detail_binds_both_branches() {
        let (sql, values) = render(
            CATALOG.routine_detail.unwrap_or_default(),
            CONFIG.placeholder,
            &[("schema", "PUBLIC"), ("routine", "ADD_USER")],
        );
        assert!(!sql.contains(":routine"));
        assert_eq!(values, vec!["PUBLIC", "ADD_USER", "PUBLIC", "ADD_USER"]);
    }

    #[test]
    fn test_quoted_constraint_column_is_not_a_marker() {
        let (sql, values) = render(
            CATALOG.indexes,
            CONFIG.placeholder,
            &[("schema", "PUBLIC"), ("table", "USERS")],
        );
        assert!(sql.contains(r#""CONSTRAINT" = 'PRIMARY KEY'"#));
        assert_eq!(values.len(), 2);
    }

    #[test]
    fn test_every_unique_constraint_kind_counts_as_unique() {
        let (sql, _) = render(
            CATALOG.indexes,
            CONFIG.placeholder,
            &[("schema", "PUBLIC"), ("table", "USERS")],
        );
        // Covers both 'UNIQUE' and 'NOT NULL UNIQUE'
        assert!(sql.contains(r#""CONSTRAINT" LIKE '%UNIQUE%'"#));
        assert!(!sql.contains("IN ('PRIMARY KEY', 'UNIQUE')"));
    }
}
