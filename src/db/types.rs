//! Native row decoding.
//!
//! Type conversion uses a two-phase approach:
//! 1. `TypeCategory` classifies a column type into a logical category
//! 2. Backend-specific decoders extract the value as JSON
//!
//! Values are passed through as the driver reports them. DECIMAL stays a
//! string to keep its exact representation and binary data is base64.

use crate::models::{DialectId, SqlRow};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde_json::Value as JsonValue;
use sqlx::mysql::{MySqlRow, MySqlTypeInfo, MySqlValueRef};
use sqlx::postgres::{PgRow, PgTypeInfo, PgValueRef};
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Decode, Row, Type, TypeInfo, ValueRef};

/// Logical category for database column types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCategory {
    Integer,
    Float,
    Decimal,
    Boolean,
    Text,
    Binary,
    Json,
    Temporal,
    Unknown,
}

/// Classify a database type name into a logical category.
pub fn categorize_type(type_name: &str, dialect: DialectId) -> TypeCategory {
    let lower = type_name.to_lowercase();

    // Checked before floats since "numeric" overlaps
    if lower.contains("decimal") || lower.contains("numeric") {
        if dialect == DialectId::Sqlite {
            return TypeCategory::Float;
        }
        return TypeCategory::Decimal;
    }

    if lower.contains("interval") {
        return TypeCategory::Unknown;
    }

    if lower.contains("int") || lower.contains("serial") || lower == "tiny" {
        return TypeCategory::Integer;
    }

    if lower == "bool" || lower == "boolean" {
        return TypeCategory::Boolean;
    }

    if lower.contains("float") || lower.contains("double") || lower == "real" {
        return TypeCategory::Float;
    }

    if lower == "json" || lower == "jsonb" {
        return TypeCategory::Json;
    }

    if lower.contains("blob") || lower.contains("binary") || lower == "bytea" {
        return TypeCategory::Binary;
    }

    if lower.starts_with("timestamp")
        || lower == "datetime"
        || lower == "date"
        || lower == "time"
        || lower == "timetz"
    {
        return TypeCategory::Temporal;
    }

    if lower.contains("char") || lower.contains("text") || lower == "name" {
        return TypeCategory::Text;
    }

    TypeCategory::Unknown
}

/// Wrapper type for raw DECIMAL/NUMERIC values as strings.
#[derive(Debug)]
pub struct RawDecimal(pub String);

impl Type<sqlx::MySql> for RawDecimal {
    fn type_info() -> MySqlTypeInfo {
        <String as Type<sqlx::MySql>>::type_info()
    }

    fn compatible(ty: &MySqlTypeInfo) -> bool {
        let name = ty.name().to_lowercase();
        name.contains("decimal") || name.contains("numeric")
    }
}

impl<'r> Decode<'r, sqlx::MySql> for RawDecimal {
    fn decode(value: MySqlValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as Decode<sqlx::MySql>>::decode(value)?;
        Ok(RawDecimal(s.to_string()))
    }
}

impl Type<sqlx::Postgres> for RawDecimal {
    fn type_info() -> PgTypeInfo {
        <String as Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &PgTypeInfo) -> bool {
        let name = ty.name().to_lowercase();
        name.contains("numeric") || name.contains("decimal")
    }
}

impl<'r> Decode<'r, sqlx::Postgres> for RawDecimal {
    fn decode(value: PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as Decode<sqlx::Postgres>>::decode(value)?;
        Ok(RawDecimal(s.to_string()))
    }
}

/// Encode binary data as a base64 JSON string.
pub fn decode_binary_value(bytes: &[u8]) -> JsonValue {
    JsonValue::String(STANDARD.encode(bytes))
}

/// Finite floats become numbers, NaN and infinities become strings.
pub fn float_value(v: f64) -> JsonValue {
    serde_json::Number::from_f64(v)
        .map(JsonValue::Number)
        .unwrap_or_else(|| JsonValue::String(v.to_string()))
}

/// Conversion of a native row into a [`SqlRow`].
pub trait RowDecode {
    fn to_sql_row(&self) -> SqlRow;
}

/// Try each Rust type in order and return the first that decodes.
macro_rules! first_decoded {
    ($row:expr, $idx:expr, $($ty:ty => $map:expr),+ $(,)?) => {
        $(
            if let Ok(value) = $row.try_get::<Option<$ty>, _>($idx) {
                return value.map($map).unwrap_or(JsonValue::Null);
            }
        )+
    };
}

fn decode_row<R>(
    row: &R,
    dialect: DialectId,
    decode: fn(&R, usize, TypeCategory) -> JsonValue,
) -> SqlRow
where
    R: Row,
{
    row.columns()
        .iter()
        .enumerate()
        .map(|(idx, col)| {
            let category = categorize_type(col.type_info().name(), dialect);
            (col.name().to_string(), decode(row, idx, category))
        })
        .collect()
}

impl RowDecode for PgRow {
    fn to_sql_row(&self) -> SqlRow {
        decode_row(self, DialectId::Postgres, postgres::decode_column)
    }
}

impl RowDecode for MySqlRow {
    fn to_sql_row(&self) -> SqlRow {
        decode_row(self, DialectId::MySql, mysql::decode_column)
    }
}

impl RowDecode for SqliteRow {
    fn to_sql_row(&self) -> SqlRow {
        decode_row(self, DialectId::Sqlite, sqlite::decode_column)
    }
}

mod postgres {
    use super::*;
    use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};

    pub fn decode_column(row: &PgRow, idx: usize, category: TypeCategory) -> JsonValue {
        match category {
            TypeCategory::Decimal => {
                first_decoded!(row, idx, RawDecimal => |v: RawDecimal| JsonValue::String(v.0));
            }
            TypeCategory::Integer => {
                first_decoded!(row, idx,
                    i64 => JsonValue::from,
                    i32 => JsonValue::from,
                    i16 => JsonValue::from,
                );
            }
            TypeCategory::Float => {
                first_decoded!(row, idx,
                    f64 => float_value,
                    f32 => |v: f32| float_value(f64::from(v)),
                );
            }
            TypeCategory::Boolean => {
                first_decoded!(row, idx, bool => JsonValue::Bool);
            }
            TypeCategory::Binary => {
                first_decoded!(row, idx, Vec<u8> => |v: Vec<u8>| decode_binary_value(&v));
            }
            TypeCategory::Json => {
                first_decoded!(row, idx, JsonValue => |v: JsonValue| v);
            }
            TypeCategory::Temporal => {
                first_decoded!(row, idx,
                    DateTime<Utc> => |v: DateTime<Utc>| JsonValue::String(v.to_rfc3339()),
                    NaiveDateTime => |v: NaiveDateTime| JsonValue::String(v.to_string()),
                    NaiveDate => |v: NaiveDate| JsonValue::String(v.to_string()),
                    NaiveTime => |v: NaiveTime| JsonValue::String(v.to_string()),
                );
            }
            TypeCategory::Text | TypeCategory::Unknown => {}
        }
        first_decoded!(row, idx, String => JsonValue::String);
        JsonValue::Null
    }
}

mod mysql {
    use super::*;
    use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};

    pub fn decode_column(row: &MySqlRow, idx: usize, category: TypeCategory) -> JsonValue {
        match category {
            TypeCategory::Decimal => {
                first_decoded!(row, idx, RawDecimal => |v: RawDecimal| JsonValue::String(v.0));
            }
            TypeCategory::Integer => {
                first_decoded!(row, idx,
                    i64 => JsonValue::from,
                    i32 => JsonValue::from,
                    i16 => JsonValue::from,
                    i8 => JsonValue::from,
                    u64 => JsonValue::from,
                    u32 => JsonValue::from,
                    u16 => JsonValue::from,
                    u8 => JsonValue::from,
                );
            }
            TypeCategory::Float => {
                first_decoded!(row, idx,
                    f64 => float_value,
                    f32 => |v: f32| float_value(f64::from(v)),
                );
            }
            TypeCategory::Boolean => {
                first_decoded!(row, idx, bool => JsonValue::Bool);
            }
            TypeCategory::Binary => {
                first_decoded!(row, idx, Vec<u8> => |v: Vec<u8>| decode_binary_value(&v));
            }
            TypeCategory::Json => {
                first_decoded!(row, idx, JsonValue => |v: JsonValue| v);
            }
            TypeCategory::Temporal => {
                first_decoded!(row, idx,
                    DateTime<Utc> => |v: DateTime<Utc>| JsonValue::String(v.to_rfc3339()),
                    NaiveDateTime => |v: NaiveDateTime| JsonValue::String(v.to_string()),
                    NaiveDate => |v: NaiveDate| JsonValue::String(v.to_string()),
                    NaiveTime => |v: NaiveTime| JsonValue::String(v.to_string()),
                );
            }
            TypeCategory::Text | TypeCategory::Unknown => {}
        }
        first_decoded!(row, idx,
            String => JsonValue::String,
            Vec<u8> => |v: Vec<u8>| match String::from_utf8(v) {
                Ok(s) => JsonValue::String(s),
                Err(e) => decode_binary_value(e.as_bytes()),
            },
        );
        JsonValue::Null
    }
}

mod sqlite {
    use super::*;

    /// SQLite is dynamically typed: the stored value's type wins over the
    /// declared column type, except for declared booleans.
    pub fn decode_column(row: &SqliteRow, idx: usize, category: TypeCategory) -> JsonValue {
        let storage = match row.try_get_raw(idx) {
            Ok(raw) if raw.is_null() => return JsonValue::Null,
            Ok(raw) => raw.type_info().name().to_uppercase(),
            Err(e) => {
                tracing::debug!(column = idx, error = %e, "Failed to read SQLite value");
                return JsonValue::Null;
            }
        };

        match storage.as_str() {
            "INTEGER" if category == TypeCategory::Boolean => {
                first_decoded!(row, idx, bool => JsonValue::Bool);
            }
            "INTEGER" => {
                first_decoded!(row, idx, i64 => JsonValue::from);
            }
            "REAL" => {
                first_decoded!(row, idx, f64 => float_value);
            }
            "BLOB" => {
                first_decoded!(row, idx, Vec<u8> => |v: Vec<u8>| decode_binary_value(&v));
            }
            _ => {}
        }

        if let Ok(Some(text)) = row.try_get::<Option<String>, _>(idx) {
            if category == TypeCategory::Json {
                if let Ok(json) = serde_json::from_str::<JsonValue>(&text) {
                    return json;
                }
            }
            return JsonValue::String(text);
        }
        JsonValue::Null
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categorize_type_integer() {
        assert_eq!(
            categorize_type("INT", DialectId::MySql),
            TypeCategory::Integer
        );
        assert_eq!(
            categorize_type("INT8", DialectId::Postgres),
            TypeCategory::Integer
        );
        assert_eq!(
            categorize_type("TINYINT UNSIGNED", DialectId::MySql),
            TypeCategory::Integer
        );
    }

    #[test]
    fn test_categorize_type_decimal() {
        assert_eq!(
            categorize_type("NUMERIC", DialectId::Postgres),
            TypeCategory::Decimal
        );
        // SQLite NUMERIC is a float
        assert_eq!(
            categorize_type("numeric", DialectId::Sqlite),
            TypeCategory::Float
        );
    }

    #[test]
    fn test_categorize_type_temporal_and_text() {
        assert_eq!(
            categorize_type("TIMESTAMPTZ", DialectId::Postgres),
            TypeCategory::Temporal
        );
        assert_eq!(
            categorize_type("DATETIME", DialectId::MySql),
            TypeCategory::Temporal
        );
        assert_eq!(
            categorize_type("INTERVAL", DialectId::Postgres),
            TypeCategory::Unknown
        );
        assert_eq!(
            categorize_type("VARCHAR", DialectId::MySql),
            TypeCategory::Text
        );
        assert_eq!(
            categorize_type("NAME", DialectId::Postgres),
            TypeCategory::Text
        );
    }

    #[test]
    fn test_decode_binary_value() {
        assert_eq!(
            decode_binary_value(b"hello world"),
            JsonValue::String("aGVsbG8gd29ybGQ=".to_string())
        );
        assert_eq!(
            decode_binary_value(&[0xFF, 0xFE, 0x00, 0x01]),
            JsonValue::String("//4AAQ==".to_string())
        );
        assert_eq!(decode_binary_value(&[]), JsonValue::String(String::new()));
    }

    #[test]
    fn test_float_value_non_finite() {
        assert_eq!(float_value(1.5), serde_json::json!(1.5));
        assert_eq!(float_value(f64::NAN), JsonValue::String("NaN".to_string()));
    }
}
