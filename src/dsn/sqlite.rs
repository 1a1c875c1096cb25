//! DSN parser for SQLite.
//!
//! Everything between `sqlite://` and `?` is the database path, so
//! `sqlite:///var/data/app.db?mode=rwc` opens `/var/data/app.db` and
//! `sqlite://:memory:` opens an in-memory database.

use super::{DRIVER_PARAM, DsnParser, NativeConnectionString};
use crate::error::ConnectorResult;
use crate::models::DialectId;

#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDsnParser;

impl DsnParser for SqliteDsnParser {
    fn dialect(&self) -> DialectId {
        DialectId::Sqlite
    }

    fn schemes(&self) -> &'static [&'static str] {
        &["sqlite"]
    }

    fn sample_dsn(&self) -> &'static str {
        "sqlite:///path/to/database.db?mode=rwc"
    }

    fn parse(&self, dsn: &str) -> ConnectorResult<NativeConnectionString> {
        if !self.is_valid_dsn(dsn) {
            return Err(self.format_error(dsn, "unrecognized scheme".to_string()));
        }
        let dsn = dsn.trim();
        let rest = dsn.split_once("://").map(|(_, rest)| rest).unwrap_or("");
        let (path, query) = match rest.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (rest, None),
        };
        if path.is_empty() {
            return Err(self.format_error(dsn, "missing database path".to_string()));
        }

        let query = query
            .map(|q| {
                url::form_urlencoded::parse(q.as_bytes())
                    .filter(|(k, _)| !k.eq_ignore_ascii_case(DRIVER_PARAM))
                    .fold(
                        url::form_urlencoded::Serializer::new(String::new()),
                        |mut serializer, (k, v)| {
                            serializer.append_pair(&k, &v);
                            serializer
                        },
                    )
                    .finish()
            })
            .unwrap_or_default();

        let native = if query.is_empty() {
            format!("sqlite://{path}")
        } else {
            format!("sqlite://{path}?{query}")
        };
        Ok(NativeConnectionString::new(native, Some(path.to_string())))
    }
}
