//! Data models for the connector layer.
//!
//! This module re-exports all model types shared by every dialect.

pub mod connection;
pub mod query;
pub mod schema;

// Re-export commonly used types
pub use connection::{
    BatchMode, ConnectOptions, ConnectionInfo, DEFAULT_CONNECT_TIMEOUT_SECS,
    DEFAULT_QUERY_TIMEOUT_SECS, DefaultSchema, DialectConfig, DialectId, Placeholder,
};
pub use query::{SqlResult, SqlRow};
pub use schema::{RoutineParameter, StoredProcedure, TableColumn, TableIndex};
