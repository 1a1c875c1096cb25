//! Registry of available connectors.
//!
//! The registry is an ordinary value: build it once at startup, then share
//! it read-only (typically behind `Arc`). It maps a dialect to the single
//! connector registered for it and never owns connection lifetimes.

use crate::db::connector::Connector;
use crate::error::{ConnectorError, ConnectorResult};
use crate::models::DialectId;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Default, Clone)]
pub struct ConnectorRegistry {
    connectors: BTreeMap<DialectId, Arc<dyn Connector>>,
}

impl ConnectorRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding one connector for every dialect compiled in.
    pub fn with_builtin_dialects() -> ConnectorResult<Self> {
        let mut registry = Self::new();
        for connector in crate::db::builtin_connectors() {
            registry.register(Arc::new(connector))?;
        }
        Ok(registry)
    }

    /// Register a connector under its dialect.
    ///
    /// A second connector for the same dialect is rejected and the first
    /// one stays registered.
    pub fn register(&mut self, connector: Arc<dyn Connector>) -> ConnectorResult<()> {
        let dialect = connector.dialect();
        if self.connectors.contains_key(&dialect) {
            return Err(ConnectorError::DuplicateDialect { dialect });
        }
        debug!(dialect = %dialect, "Registered connector");
        self.connectors.insert(dialect, connector);
        Ok(())
    }

    pub fn get(&self, dialect: DialectId) -> Option<Arc<dyn Connector>> {
        self.connectors.get(&dialect).cloned()
    }

    /// Connector for the dialect named by a DSN's scheme.
    pub fn get_for_dsn(&self, dsn: &str) -> ConnectorResult<Arc<dyn Connector>> {
        let scheme = dsn.split_once("://").map_or(dsn, |(scheme, _)| scheme);
        DialectId::from_dsn(dsn)
            .and_then(|dialect| self.get(dialect))
            .ok_or_else(|| ConnectorError::UnknownDialect {
                dialect: scheme.to_string(),
            })
    }

    /// Registered dialects, ascending.
    pub fn list(&self) -> Vec<DialectId> {
        self.connectors.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.connectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connectors.is_empty()
    }
}
