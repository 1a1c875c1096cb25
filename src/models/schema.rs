//! Schema-related data models.
//!
//! This module defines the read-only snapshots returned by introspection.
//! Nothing here is cached across calls.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableColumn {
    pub name: String,
    /// Driver-native type name (e.g., `NVARCHAR`, `character varying`)
    pub data_type: String,
    pub nullable: bool,
    /// Default expression as the catalog reports it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,
}

impl TableColumn {
    /// Create a new column.
    pub fn new(name: impl Into<String>, data_type: impl Into<String>, nullable: bool) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            nullable,
            default_value: None,
        }
    }

    /// Set the default value.
    pub fn with_default(mut self, default_value: impl Into<String>) -> Self {
        self.default_value = Some(default_value.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableIndex {
    pub name: String,
    /// Participating columns in index order
    pub columns: Vec<String>,
    pub is_unique: bool,
    /// False when the catalog cannot tell primary keys apart
    pub is_primary: bool,
}

impl TableIndex {
    /// Create a new index.
    pub fn new(name: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            name: name.into(),
            columns,
            is_unique: false,
            is_primary: false,
        }
    }

    /// Set whether this is a unique index.
    pub fn with_unique(mut self, is_unique: bool) -> Self {
        self.is_unique = is_unique;
        self
    }

    /// Set whether this is the primary key index.
    pub fn with_primary(mut self, is_primary: bool) -> Self {
        self.is_primary = is_primary;
        if is_primary {
            self.is_unique = true;
        }
        self
    }
}

/// One declared routine parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutineParameter {
    pub name: Option<String>,
    /// IN, OUT, INOUT
    pub mode: Option<String>,
    pub data_type: Option<String>,
}

impl RoutineParameter {
    /// Render as `"<name> <mode> <type>"`, skipping absent parts.
    pub fn render(&self) -> String {
        [&self.name, &self.mode, &self.data_type]
            .into_iter()
            .filter_map(|part| part.as_deref().map(str::trim))
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredProcedure {
    pub name: String,
    /// `procedure` or `function`
    pub kind: String,
    pub language: String,
    /// Comma-joined `name mode type` descriptors in ordinal order
    pub parameters: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub return_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub definition: Option<String>,
}

impl StoredProcedure {
    /// Create a routine record. `kind` is lower-cased.
    pub fn new(name: impl Into<String>, kind: &str, language: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: kind.trim().to_lowercase(),
            language: language.into(),
            parameters: String::new(),
            return_type: None,
            definition: None,
        }
    }

    /// Set the parameter list from ordered parameters.
    pub fn with_parameters<'a>(
        mut self,
        parameters: impl IntoIterator<Item = &'a RoutineParameter>,
    ) -> Self {
        self.parameters = parameters
            .into_iter()
            .map(RoutineParameter::render)
            .filter(|p| !p.is_empty())
            .collect::<Vec<_>>()
            .join(", ");
        self
    }

    /// Set the return type.
    pub fn with_return_type(mut self, return_type: Option<String>) -> Self {
        self.return_type = return_type.filter(|t| !t.trim().is_empty());
        self
    }

    /// Set the source definition.
    pub fn with_definition(mut self, definition: Option<String>) -> Self {
        self.definition = definition;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn param(name: &str, mode: &str, data_type: &str) -> RoutineParameter {
        let opt = |s: &str| (!s.is_empty()).then(|| s.to_string());
        RoutineParameter {
            name: opt(name),
            mode: opt(mode),
            data_type: opt(data_type),
        }
    }

    #[test]
    fn test_index_builder() {
        let index = TableIndex::new("users_pkey", vec!["id".to_string()]).with_primary(true);
        assert!(index.is_primary);
        assert!(index.is_unique); // Primary implies unique
    }

    #[test]
    fn test_column_serialization_skips_missing_default() {
        let col = TableColumn::new("id", "INTEGER", false);
        let json = serde_json::to_string(&col).unwrap();
        assert!(!json.contains("default_value"));

        let col = TableColumn::new("name", "TEXT", true).with_default("'anon'");
        assert_eq!(col.default_value.as_deref(), Some("'anon'"));
    }

    #[test]
    fn test_parameter_render() {
        assert_eq!(param("p_id", "IN", "INTEGER").render(), "p_id IN INTEGER");
        assert_eq!(param("", "OUT", "INTEGER").render(), "OUT INTEGER");
        assert_eq!(param("", "", "").render(), "");
    }

    #[test]
    fn test_stored_procedure_joins_parameters() {
        let params = [
            param("p_id", "IN", "INTEGER"),
            param("p_name", "OUT", "NVARCHAR"),
        ];
        let proc = StoredProcedure::new("GET_USER", "PROCEDURE", "SQLSCRIPT")
            .with_parameters(&params)
            .with_return_type(Some(" ".into()));
        assert_eq!(proc.kind, "procedure");
        assert_eq!(proc.parameters, "p_id IN INTEGER, p_name OUT NVARCHAR");
        assert_eq!(proc.return_type, None);
    }
}
