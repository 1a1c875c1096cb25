//! Catalog queries and their mapping into schema models.
//!
//! Each dialect supplies its introspection SQL as a [`CatalogQueries`]
//! table. Queries name their inputs with `:schema`, `:table` and `:routine`
//! markers, which [`render`] turns into the dialect's positional
//! placeholders. Every query aliases its output columns to the lowercase
//! names used below, so the mapping code is shared by all dialects.

use crate::error::{ConnectorError, ConnectorResult};
use crate::models::{
    Placeholder, RoutineParameter, SqlRow, StoredProcedure, TableColumn, TableIndex,
};

/// Introspection SQL for one dialect.
#[derive(Debug)]
pub struct CatalogQueries {
    /// Yields `schema_name`.
    pub schemas: &'static str,
    /// `:schema`. Yields `table_name`.
    pub tables: &'static str,
    /// `:schema`, `:table`. Yields one row per matching table.
    pub table_exists: &'static str,
    /// `:schema`, `:table`. Yields `column_name`, `data_type`, `is_nullable`,
    /// `column_default`, `ordinal_position`.
    pub columns: &'static str,
    /// `:schema`, `:table`. Yields `index_name`, `column_name`, `is_unique`,
    /// `is_primary` (optional), `ordinal_position`.
    pub indexes: &'static str,
    /// `:schema`. Yields `routine_name`. None when the engine has no routines.
    pub routines: Option<&'static str>,
    /// `:schema`, `:routine`. One row per parameter (or one row with NULL
    /// parameter columns) with `specific_name`, `routine_name`,
    /// `routine_type`, `language`, `return_type`, `definition`,
    /// `parameter_name`, `parameter_mode`, `parameter_type`,
    /// `ordinal_position`.
    pub routine_detail: Option<&'static str>,
}

/// Replace `:name` markers with positional placeholders.
///
/// Every occurrence gets its own placeholder and its own copy of the value,
/// so a marker may appear more than once. `::` casts are left alone.
pub fn render(
    sql: &str,
    placeholder: Placeholder,
    args: &[(&str, &str)],
) -> (String, Vec<String>) {
    let mut out = String::with_capacity(sql.len());
    let mut values = Vec::new();
    let bytes = sql.as_bytes();
    let mut i = 0;
    let mut copied = 0;

    while i < bytes.len() {
        let is_marker_start = bytes[i] == b':'
            && (i == 0 || bytes[i - 1] != b':')
            && bytes.get(i + 1).is_some_and(|b| b.is_ascii_alphabetic());
        if !is_marker_start {
            i += 1;
            continue;
        }
        let start = i + 1;
        let mut end = start;
        while end < bytes.len() && (bytes[end].is_ascii_alphanumeric() || bytes[end] == b'_') {
            end += 1;
        }
        let name = &sql[start..end];
        if let Some((_, value)) = args.iter().find(|(key, _)| *key == name) {
            out.push_str(&sql[copied..i]);
            values.push(value.to_string());
            out.push_str(&placeholder.render(values.len()));
            copied = end;
        }
        i = end;
    }
    out.push_str(&sql[copied..]);
    (out, values)
}

/// Collect one text column from every row, sorted ascending and deduplicated.
pub fn sorted_names(rows: &[SqlRow], column: &str) -> ConnectorResult<Vec<String>> {
    let mut names = rows
        .iter()
        .map(|row| row.try_str(column))
        .collect::<ConnectorResult<Vec<_>>>()?;
    names.sort();
    names.dedup();
    Ok(names)
}

/// Map column rows, ordered by ordinal position.
pub fn columns_from_rows(rows: &[SqlRow]) -> ConnectorResult<Vec<TableColumn>> {
    let mut columns = rows
        .iter()
        .map(|row| {
            let position = row.try_i64("ordinal_position")?;
            let mut column = TableColumn::new(
                row.try_str("column_name")?,
                row.try_opt_str("data_type")?.unwrap_or_default(),
                row.try_bool("is_nullable")?,
            );
            if let Some(default) = row.try_opt_str("column_default")? {
                column = column.with_default(default);
            }
            Ok((position, column))
        })
        .collect::<ConnectorResult<Vec<_>>>()?;
    columns.sort_by_key(|(position, _)| *position);
    Ok(columns.into_iter().map(|(_, column)| column).collect())
}

/// Group index-column rows by index name.
///
/// Indexes keep the order in which they first appear; columns within an
/// index are ordered by ordinal position. A missing `is_primary` column
/// means the catalog cannot tell and the flag stays false.
pub fn indexes_from_rows(rows: &[SqlRow]) -> ConnectorResult<Vec<TableIndex>> {
    let mut grouped: Vec<(TableIndex, Vec<(i64, String)>)> = Vec::new();

    for row in rows {
        let name = row.try_str("index_name")?;
        let column = row.try_str("column_name")?;
        let position = row.try_i64("ordinal_position")?;
        let is_unique = row.try_bool("is_unique")?;
        let is_primary = match row.get("is_primary") {
            Some(_) => row.try_bool("is_primary")?,
            None => false,
        };

        match grouped.iter_mut().find(|(index, _)| index.name == name) {
            Some((_, columns)) => columns.push((position, column)),
            None => {
                let index = TableIndex::new(name, Vec::new())
                    .with_unique(is_unique)
                    .with_primary(is_primary);
                grouped.push((index, vec![(position, column)]));
            }
        }
    }

    Ok(grouped
        .into_iter()
        .map(|(mut index, mut columns)| {
            columns.sort_by_key(|(position, _)| *position);
            index.columns = columns.into_iter().map(|(_, name)| name).collect();
            index
        })
        .collect())
}

/// Build a routine from detail rows.
///
/// Overloads share a name; only the first `specific_name` returned is used.
pub fn routine_from_rows(rows: &[SqlRow], name: &str) -> ConnectorResult<StoredProcedure> {
    let first = rows
        .first()
        .ok_or_else(|| ConnectorError::not_found("stored procedure", name))?;
    let specific = first.try_opt_str("specific_name")?;

    let mut parameters = Vec::new();
    for row in rows {
        if row.try_opt_str("specific_name")? != specific {
            continue;
        }
        let parameter = RoutineParameter {
            name: row.try_opt_str("parameter_name")?,
            mode: row.try_opt_str("parameter_mode")?,
            data_type: row.try_opt_str("parameter_type")?,
        };
        if parameter.name.is_none() && parameter.data_type.is_none() {
            continue;
        }
        let position = match row.try_opt_str("ordinal_position")? {
            Some(_) => row.try_i64("ordinal_position")?,
            None => i64::MAX,
        };
        parameters.push((position, parameter));
    }
    parameters.sort_by_key(|(position, _)| *position);

    let routine = StoredProcedure::new(
        first.try_str("routine_name")?,
        &first.try_opt_str("routine_type")?.unwrap_or_default(),
        first.try_opt_str("language")?.unwrap_or_default(),
    )
    .with_parameters(parameters.iter().map(|(_, p)| p))
    .with_return_type(first.try_opt_str("return_type")?)
    .with_definition(first.try_opt_str("definition")?);
    Ok(routine)
}
