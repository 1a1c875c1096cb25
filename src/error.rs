//! Error types for the connector layer.
//!
//! This module defines all error types using `thiserror`. Callers match on the
//! variant to tell expected absence (`NotFound`) apart from infrastructure
//! failure (`Connection`) without inspecting messages.

use crate::models::DialectId;
use thiserror::Error;

/// Why a connection attempt failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionFailure {
    /// The native driver could not open a session.
    Unreachable,
    /// A session was opened but the probe query failed.
    ProbeFailed,
    /// An established session broke while in use.
    Lost,
}

impl std::fmt::Display for ConnectionFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unreachable => write!(f, "could not reach backend"),
            Self::ProbeFailed => write!(f, "probe query failed"),
            Self::Lost => write!(f, "connection lost"),
        }
    }
}

#[derive(Error, Debug)]
pub enum ConnectorError {
    #[error("Invalid DSN '{dsn}': {message}. Expected format: {sample}")]
    DsnFormat {
        message: String,
        /// Offending DSN with its password obfuscated
        dsn: String,
        sample: String,
    },

    #[error("Connection failed ({failure}): {message}")]
    Connection {
        failure: ConnectionFailure,
        message: String,
        suggestion: String,
    },

    #[error("Connector for '{dialect}' is already connected; disconnect first")]
    AlreadyConnected { dialect: DialectId },

    #[error("Connector for '{dialect}' is not connected; call connect first")]
    NotConnected { dialect: DialectId },

    #[error("{kind} not found: {name}")]
    NotFound { kind: String, name: String },

    #[error("Statement {index} failed: {source}")]
    Statement {
        /// 1-based position of the failing statement in the batch
        index: usize,
        #[source]
        source: Box<ConnectorError>,
    },

    #[error("Query error: {message}{}", context_suffix(.context))]
    Query {
        message: String,
        /// e.g., "23505" for unique violation
        sql_state: Option<String>,
        /// Schema/table the query was about
        context: Option<String>,
    },

    #[error("Timeout: {operation} exceeded {elapsed_secs}s")]
    Timeout {
        operation: String,
        elapsed_secs: u64,
    },

    #[error("Column '{column}' missing from result row")]
    MissingColumn { column: String },

    #[error("Column '{column}' has an unexpected value; expected {expected}")]
    InvalidValue { column: String, expected: String },

    #[error("Unknown dialect: {dialect}")]
    UnknownDialect { dialect: String },

    #[error("Dialect '{dialect}' is already registered")]
    DuplicateDialect { dialect: DialectId },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

fn context_suffix(context: &Option<String>) -> String {
    match context {
        Some(ctx) => format!(" (on {ctx})"),
        None => String::new(),
    }
}

impl ConnectorError {
    /// Create a DSN format error. `dsn` must already be obfuscated.
    pub fn dsn_format(
        message: impl Into<String>,
        dsn: impl Into<String>,
        sample: impl Into<String>,
    ) -> Self {
        Self::DsnFormat {
            message: message.into(),
            dsn: dsn.into(),
            sample: sample.into(),
        }
    }

    /// Create a connection error with a helpful suggestion.
    pub fn connection(
        failure: ConnectionFailure,
        message: impl Into<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self::Connection {
            failure,
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create a not-connected error.
    pub fn not_connected(dialect: DialectId) -> Self {
        Self::NotConnected { dialect }
    }

    /// Create a not-found error for an introspection target.
    pub fn not_found(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind: kind.into(),
            name: name.into(),
        }
    }

    /// Wrap an error with the 1-based index of the failing statement.
    pub fn statement(index: usize, source: ConnectorError) -> Self {
        Self::Statement {
            index,
            source: Box::new(source),
        }
    }

    /// Create a query error with optional SQL state.
    pub fn query(message: impl Into<String>, sql_state: Option<String>) -> Self {
        Self::Query {
            message: message.into(),
            sql_state,
            context: None,
        }
    }

    /// Create a timeout error.
    pub fn timeout(operation: impl Into<String>, elapsed_secs: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            elapsed_secs,
        }
    }

    /// Create a missing column error.
    pub fn missing_column(column: impl Into<String>) -> Self {
        Self::MissingColumn {
            column: column.into(),
        }
    }

    /// Create an invalid value error.
    pub fn invalid_value(column: impl Into<String>, expected: impl Into<String>) -> Self {
        Self::InvalidValue {
            column: column.into(),
            expected: expected.into(),
        }
    }

    /// Create an invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Attach schema/table context to query errors. Other variants pass through.
    pub fn with_context(self, ctx: impl Into<String>) -> Self {
        match self {
            Self::Query {
                message,
                sql_state,
                context: None,
            } => Self::Query {
                message,
                sql_state,
                context: Some(ctx.into()),
            },
            other => other,
        }
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Connection { suggestion, .. } => Some(suggestion),
            Self::DsnFormat { sample, .. } => Some(sample),
            Self::Statement { source, .. } => source.suggestion(),
            _ => None,
        }
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout { .. } => true,
            Self::Connection { failure, .. } => *failure == ConnectionFailure::Lost,
            Self::Statement { source, .. } => source.is_retryable(),
            _ => false,
        }
    }

    /// True when the native session is no longer usable.
    pub fn is_connection_lost(&self) -> bool {
        match self {
            Self::Connection { failure, .. } => *failure == ConnectionFailure::Lost,
            Self::Statement { source, .. } => source.is_connection_lost(),
            _ => false,
        }
    }

    /// SQLSTATE reported by the backend, if any.
    pub fn sql_state(&self) -> Option<&str> {
        match self {
            Self::Query { sql_state, .. } => sql_state.as_deref(),
            Self::Statement { source, .. } => source.sql_state(),
            _ => None,
        }
    }
}

/// Convert sqlx errors to ConnectorError.
impl From<sqlx::Error> for ConnectorError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(msg) => ConnectorError::connection(
                ConnectionFailure::Unreachable,
                msg.to_string(),
                "Check the connection string format and credentials",
            ),
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().map(|c| c.to_string());
                ConnectorError::query(db_err.message(), code)
            }
            sqlx::Error::RowNotFound => ConnectorError::query("No rows returned", None),
            sqlx::Error::Io(io_err) => ConnectorError::connection(
                ConnectionFailure::Lost,
                format!("I/O error: {}", io_err),
                "Check network connectivity and database server status",
            ),
            sqlx::Error::Tls(tls_err) => ConnectorError::connection(
                ConnectionFailure::Lost,
                format!("TLS error: {}", tls_err),
                "Verify TLS configuration and certificates",
            ),
            sqlx::Error::Protocol(msg) => ConnectorError::connection(
                ConnectionFailure::Lost,
                format!("Protocol error: {}", msg),
                "Check database server compatibility",
            ),
            sqlx::Error::WorkerCrashed => ConnectorError::connection(
                ConnectionFailure::Lost,
                "Database worker crashed",
                "Reconnect to the database",
            ),
            sqlx::Error::ColumnNotFound(col) => ConnectorError::missing_column(col),
            sqlx::Error::ColumnIndexOutOfBounds { index, len } => ConnectorError::internal(
                format!("Column index {} out of bounds (len: {})", index, len),
            ),
            sqlx::Error::ColumnDecode { index, source } => {
                ConnectorError::internal(format!("Failed to decode column {}: {}", index, source))
            }
            sqlx::Error::Decode(source) => {
                ConnectorError::internal(format!("Decode error: {}", source))
            }
            sqlx::Error::TypeNotFound { type_name } => {
                ConnectorError::internal(format!("Type not found: {}", type_name))
            }
            _ => ConnectorError::internal(format!("Unknown database error: {}", err)),
        }
    }
}

/// Result type alias for connector operations.
pub type ConnectorResult<T> = Result<T, ConnectorError>;
