//! Connection-related data models.
//!
//! This module defines the dialect identity, per-dialect configuration and
//! the options a connector is opened with.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default connect timeout in seconds.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default per-statement timeout in seconds.
pub const DEFAULT_QUERY_TIMEOUT_SECS: u64 = 30;

/// Supported database dialects.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum DialectId {
    /// Generic ODBC-backed dialect
    Hadb,
    /// Includes MariaDB
    MySql,
    Postgres,
    Sqlite,
}

impl DialectId {
    /// All known dialects, in registry order.
    pub const ALL: [DialectId; 4] = [Self::Hadb, Self::MySql, Self::Postgres, Self::Sqlite];

    /// Resolve a dialect from a DSN scheme (case-insensitive).
    pub fn from_scheme(scheme: &str) -> Option<Self> {
        match scheme.to_ascii_lowercase().as_str() {
            "hadb" => Some(Self::Hadb),
            "mysql" | "mariadb" => Some(Self::MySql),
            "postgres" | "postgresql" => Some(Self::Postgres),
            "sqlite" => Some(Self::Sqlite),
            _ => None,
        }
    }

    /// Resolve the dialect of a DSN from its scheme prefix.
    pub fn from_dsn(dsn: &str) -> Option<Self> {
        let (scheme, _) = dsn.trim().split_once("://")?;
        Self::from_scheme(scheme)
    }

    /// Canonical identifier used on the command line and in serialized output.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hadb => "hadb",
            Self::MySql => "mysql",
            Self::Postgres => "postgres",
            Self::Sqlite => "sqlite",
        }
    }

    /// Get the display name for this dialect.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Hadb => "HADB (ODBC)",
            Self::MySql => "MySQL",
            Self::Postgres => "PostgreSQL",
            Self::Sqlite => "SQLite",
        }
    }
}

impl std::fmt::Display for DialectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for DialectId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_scheme(s.trim()).ok_or_else(|| format!("Unknown dialect: {s}"))
    }
}

/// How a dialect resolves the schema used when a caller omits it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefaultSchema {
    /// A fixed name such as `PUBLIC` or `main`.
    Named(&'static str),
    /// The database named in the DSN path (MySQL treats databases as schemas).
    ConnectedDatabase,
}

/// Parameter placeholder syntax of the native driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placeholder {
    /// `?`
    QuestionMark,
    /// `$1`, `$2`, ...
    Dollar,
}

impl Placeholder {
    /// Render the placeholder for the 1-based parameter position.
    pub fn render(&self, position: usize) -> String {
        match self {
            Self::QuestionMark => "?".to_string(),
            Self::Dollar => format!("${position}"),
        }
    }
}

/// Multi-statement execution semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchMode {
    /// Every statement commits on its own; a mid-batch failure leaves
    /// earlier statements applied.
    #[default]
    Autocommit,
    /// The batch runs inside one transaction and is rolled back on the
    /// first failure.
    Transactional,
}

impl std::fmt::Display for BatchMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Autocommit => write!(f, "autocommit"),
            Self::Transactional => write!(f, "transactional"),
        }
    }
}

/// Flat per-dialect configuration.
#[derive(Debug)]
pub struct DialectConfig {
    pub default_schema: DefaultSchema,
    /// Opening identifier quote; the closing quote is derived from it.
    pub identifier_quote: char,
    pub placeholder: Placeholder,
    /// Cheap query run right after connecting.
    pub probe_query: &'static str,
    /// Query returning the server version as its first column.
    pub version_query: Option<&'static str>,
    pub batch_mode: BatchMode,
}

impl DialectConfig {
    /// Quote an identifier using the dialect's quoting style.
    pub fn quote_identifier(&self, name: &str) -> String {
        let close = match self.identifier_quote {
            '[' => ']',
            c => c,
        };
        let escaped = name.replace(close, &format!("{close}{close}"));
        format!("{}{}{}", self.identifier_quote, escaped, close)
    }

    /// Render `schema.table` with both parts quoted.
    pub fn qualified_name(&self, schema: &str, table: &str) -> String {
        format!(
            "{}.{}",
            self.quote_identifier(schema),
            self.quote_identifier(table)
        )
    }
}

/// Options a connector is opened with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectOptions {
    pub connect_timeout: Duration,
    /// Applied to every native call after the connection is open.
    pub query_timeout: Duration,
    /// Overrides the dialect's batch mode when set.
    pub batch_mode: Option<BatchMode>,
}

impl ConnectOptions {
    /// Set the connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the per-statement timeout.
    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = timeout;
        self
    }

    /// Override the dialect's batch mode.
    pub fn with_batch_mode(mut self, mode: BatchMode) -> Self {
        self.batch_mode = Some(mode);
        self
    }
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            query_timeout: Duration::from_secs(DEFAULT_QUERY_TIMEOUT_SECS),
            batch_mode: None,
        }
    }
}

/// Information about a live connection (no secrets exposed).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionInfo {
    pub dialect: DialectId,
    /// Password-obfuscated DSN the connection was opened with
    pub dsn: String,
    pub server_version: Option<String>,
    /// Database name from the DSN path
    pub database: Option<String>,
    /// Schema used when a caller omits one. None when it cannot be resolved.
    pub default_schema: Option<String>,
    pub batch_mode: BatchMode,
}
