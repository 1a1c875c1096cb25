//! SQL Connector Library
//!
//! A pluggable connectivity layer over SQL backends (HADB via ODBC,
//! PostgreSQL, MySQL, SQLite). Callers hand a dialect-prefixed DSN to a
//! [`Connector`] taken from the [`ConnectorRegistry`] and get uniform schema
//! introspection and multi-statement execution back.

pub mod config;
pub mod db;
pub mod dsn;
pub mod error;
pub mod models;

pub use config::Config;
pub use db::{Connector, ConnectorRegistry, DialectConnector};
pub use dsn::DsnParser;
pub use error::{ConnectorError, ConnectorResult};
pub use models::{DialectId, SqlResult, SqlRow};
