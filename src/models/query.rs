//! Query result models.
//!
//! Native rows are decoded into [`SqlRow`], an ordered column-to-value map
//! with typed accessors that fail with a named error when a column is absent.

use crate::error::{ConnectorError, ConnectorResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

/// One result row: column name to driver-native value, in column order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SqlRow(Map<String, JsonValue>);

impl SqlRow {
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Append a column. A repeated column name keeps the last value.
    pub fn insert(&mut self, column: impl Into<String>, value: JsonValue) {
        self.0.insert(column.into(), value);
    }

    /// Look up a column by exact name, then ASCII case-insensitively.
    pub fn get(&self, column: &str) -> Option<&JsonValue> {
        self.0.get(column).or_else(|| {
            self.0
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case(column))
                .map(|(_, value)| value)
        })
    }

    /// Like [`get`](Self::get) but a missing column is an error.
    pub fn try_value(&self, column: &str) -> ConnectorResult<&JsonValue> {
        self.get(column)
            .ok_or_else(|| ConnectorError::missing_column(column))
    }

    /// Required non-null text column. Numbers and booleans are rendered.
    pub fn try_str(&self, column: &str) -> ConnectorResult<String> {
        self.try_opt_str(column)?
            .ok_or_else(|| ConnectorError::invalid_value(column, "non-null text"))
    }

    /// Nullable text column.
    pub fn try_opt_str(&self, column: &str) -> ConnectorResult<Option<String>> {
        match self.try_value(column)? {
            JsonValue::Null => Ok(None),
            JsonValue::String(s) => Ok(Some(s.clone())),
            JsonValue::Number(n) => Ok(Some(n.to_string())),
            JsonValue::Bool(b) => Ok(Some(b.to_string())),
            _ => Err(ConnectorError::invalid_value(column, "text")),
        }
    }

    /// Integer column. Numeric strings are accepted since some drivers
    /// return every value as text.
    pub fn try_i64(&self, column: &str) -> ConnectorResult<i64> {
        let value = self.try_value(column)?;
        match value {
            JsonValue::Number(n) => n
                .as_i64()
                .ok_or_else(|| ConnectorError::invalid_value(column, "integer")),
            JsonValue::String(s) => s
                .trim()
                .parse()
                .map_err(|_| ConnectorError::invalid_value(column, "integer")),
            JsonValue::Bool(b) => Ok(i64::from(*b)),
            _ => Err(ConnectorError::invalid_value(column, "integer")),
        }
    }

    /// Flag column. Accepts booleans, numbers and the usual catalog spellings
    /// (`YES`/`NO`, `TRUE`/`FALSE`, `T`/`F`, `Y`/`N`, `1`/`0`). NULL is false.
    pub fn try_bool(&self, column: &str) -> ConnectorResult<bool> {
        match self.try_value(column)? {
            JsonValue::Null => Ok(false),
            JsonValue::Bool(b) => Ok(*b),
            JsonValue::Number(n) => Ok(n.as_f64().is_some_and(|v| v != 0.0)),
            JsonValue::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "yes" | "true" | "t" | "y" | "1" => Ok(true),
                "no" | "false" | "f" | "n" | "0" | "" => Ok(false),
                _ => Err(ConnectorError::invalid_value(column, "boolean flag")),
            },
            _ => Err(ConnectorError::invalid_value(column, "boolean flag")),
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Column names in result order.
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn into_inner(self) -> Map<String, JsonValue> {
        self.0
    }
}

impl From<Map<String, JsonValue>> for SqlRow {
    fn from(map: Map<String, JsonValue>) -> Self {
        Self(map)
    }
}

impl FromIterator<(String, JsonValue)> for SqlRow {
    fn from_iter<I: IntoIterator<Item = (String, JsonValue)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Result of one `execute_sql` call.
///
/// Rows from every row-producing statement are concatenated in statement
/// order. Serializes as the bare row list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SqlResult {
    pub rows: Vec<SqlRow>,
    pub statements_executed: usize,
}

impl Serialize for SqlResult {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.rows.serialize(serializer)
    }
}

impl SqlResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the rows of one executed statement.
    pub fn push_statement(&mut self, rows: Vec<SqlRow>) {
        self.rows.extend(rows);
        self.statements_executed += 1;
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn first(&self) -> Option<&SqlRow> {
        self.rows.first()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: JsonValue) -> SqlRow {
        match value {
            JsonValue::Object(map) => SqlRow::from(map),
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_get_is_case_insensitive_fallback() {
        let r = row(json!({"TABLE_NAME": "users", "table_name": "exact"}));
        assert_eq!(r.get("table_name"), Some(&json!("exact")));
        let r = row(json!({"TABLE_NAME": "users"}));
        assert_eq!(r.get("table_name"), Some(&json!("users")));
        assert_eq!(r.get("missing"), None);
    }

    #[test]
    fn test_missing_column_is_named() {
        let r = row(json!({"a": 1}));
        let err = r.try_str("column_name").unwrap_err();
        assert!(matches!(
            err,
            ConnectorError::MissingColumn { ref column } if column == "column_name"
        ));
    }

    #[test]
    fn test_try_str_variants() {
        let r = row(json!({"s": "x", "n": 5, "null": null, "arr": [1]}));
        assert_eq!(r.try_str("s").unwrap(), "x");
        assert_eq!(r.try_str("n").unwrap(), "5");
        assert_eq!(r.try_opt_str("null").unwrap(), None);
        assert!(r.try_str("null").is_err());
        assert!(r.try_opt_str("arr").is_err());
    }

    #[test]
    fn test_try_i64_accepts_numeric_text() {
        let r = row(json!({"n": 3, "s": " 7 ", "bad": "x"}));
        assert_eq!(r.try_i64("n").unwrap(), 3);
        assert_eq!(r.try_i64("s").unwrap(), 7);
        assert!(r.try_i64("bad").is_err());
    }

    #[test]
    fn test_try_bool_catalog_spellings() {
        let r = row(json!({
            "yes": "YES", "no": "NO", "t": "t", "one": 1, "zero": 0,
            "b": true, "null": null, "odd": "maybe"
        }));
        assert!(r.try_bool("yes").unwrap());
        assert!(!r.try_bool("no").unwrap());
        assert!(r.try_bool("t").unwrap());
        assert!(r.try_bool("one").unwrap());
        assert!(!r.try_bool("zero").unwrap());
        assert!(r.try_bool("b").unwrap());
        assert!(!r.try_bool("null").unwrap());
        assert!(r.try_bool("odd").is_err());
    }

    #[test]
    fn test_column_order_preserved() {
        let mut r = SqlRow::new();
        r.insert("z", json!(1));
        r.insert("a", json!(2));
        assert_eq!(r.columns().collect::<Vec<_>>(), vec!["z", "a"]);
        assert_eq!(serde_json::to_string(&r).unwrap(), r#"{"z":1,"a":2}"#);
    }

    #[test]
    fn test_result_concatenates_statements() {
        let mut result = SqlResult::new();
        result.push_statement(vec![]);
        result.push_statement(vec![row(json!({"total": 2}))]);
        assert_eq!(result.statements_executed, 2);
        assert_eq!(result.len(), 1);
        assert_eq!(
            serde_json::to_value(&result).unwrap(),
            json!([{"total": 2}])
        );
    }
}
