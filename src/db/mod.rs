//! Native database access.
//!
//! This module provides:
//! - The [`Connector`] contract and its dialect-agnostic implementation
//! - The per-dialect drivers (SQLite, PostgreSQL, MySQL, and HADB over ODBC)
//! - Catalog SQL and its mapping into schema models
//! - Multi-statement splitting and execution
//! - The connector registry
//! - Type mappings from native rows to JSON values

#[macro_use]
pub mod macros;
pub mod batch;
pub mod catalog;
pub mod connector;
pub mod driver;
pub mod mysql;
#[cfg(feature = "odbc")]
pub mod odbc;
pub mod postgres;
pub mod registry;
pub mod sqlite;
pub mod types;

pub use batch::split_statements;
pub use connector::{Connector, DialectConnector};
pub use driver::{Driver, NativeSession};
pub use registry::ConnectorRegistry;

/// One unconnected connector per dialect compiled into this build.
pub fn builtin_connectors() -> Vec<DialectConnector> {
    vec![
        #[cfg(feature = "odbc")]
        odbc::connector(),
        mysql::connector(),
        postgres::connector(),
        sqlite::connector(),
    ]
}
