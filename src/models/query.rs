//! Query-related data models.
//!
//! This module defines bind values, parameterized statements and query results.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// One result row: column name to decoded value, in the driver's column order.
pub type Row = serde_json::Map<String, JsonValue>;

/// A parameter value for parameterized queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QueryParam {
    /// NULL value
    Null,
    /// Boolean value
    Bool(bool),
    /// Integer value (stored as i64 for maximum range)
    Int(i64),
    /// Floating point value
    Float(f64),
    /// String value
    String(String),
    /// Binary data (base64 encoded in JSON)
    #[serde(with = "base64_bytes")]
    Bytes(Vec<u8>),
}

impl QueryParam {
    /// Check if this parameter is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Get the type name of this parameter for debugging.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::Bytes(_) => "bytes",
        }
    }

    /// Convert a JSON scalar into a parameter. Arrays and objects are passed as JSON text.
    pub fn from_json(value: &JsonValue) -> Self {
        match value {
            JsonValue::Null => Self::Null,
            JsonValue::Bool(b) => Self::Bool(*b),
            JsonValue::Number(n) => match n.as_i64() {
                Some(i) => Self::Int(i),
                None => Self::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            JsonValue::String(s) => Self::String(s.clone()),
            other => Self::String(other.to_string()),
        }
    }
}

impl From<&str> for QueryParam {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for QueryParam {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<i64> for QueryParam {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for QueryParam {
    fn from(v: i32) -> Self {
        Self::Int(v.into())
    }
}

impl From<f64> for QueryParam {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<bool> for QueryParam {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<Vec<u8>> for QueryParam {
    fn from(v: Vec<u8>) -> Self {
        Self::Bytes(v)
    }
}

impl<T: Into<QueryParam>> From<Option<T>> for QueryParam {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Self::Null)
    }
}

/// Custom serialization for binary data as base64.
mod base64_bytes {
    use base64::{Engine as _, engine::general_purpose::STANDARD};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(bytes: &Vec<u8>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        STANDARD.encode(bytes).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        STANDARD.decode(&s).map_err(serde::de::Error::custom)
    }
}

/// A statement template plus its ordered bind values.
///
/// The statement uses the target dialect's native placeholder syntax
/// (`$1` for PostgreSQL, `?` for MySQL and SQLite, `@P1` for SQL Server).
/// The number and order of placeholders must match `params`; a mismatch is a
/// caller bug and surfaces as a driver error at execution time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterizedQuery {
    pub statement: String,
    #[serde(default)]
    pub params: Vec<QueryParam>,
}

impl ParameterizedQuery {
    /// Create a query with no parameters yet.
    pub fn new(statement: impl Into<String>) -> Self {
        Self {
            statement: statement.into(),
            params: Vec::new(),
        }
    }

    /// Append a bind value.
    pub fn bind(mut self, param: impl Into<QueryParam>) -> Self {
        self.params.push(param.into());
        self
    }
}

/// Tabular result of `execute_query`.
///
/// Every row has exactly `columns.len()` cells in column order and
/// `row_count == rows.len()`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<JsonValue>>,
    pub row_count: usize,
    pub execution_time_ms: u64,
}

impl QueryResult {
    /// Build a tabular result from row maps.
    ///
    /// Column names come from the first row. Cells missing from a later row
    /// are filled with `null`, so every row has one cell per column.
    pub fn from_rows(rows: Vec<Row>, execution_time_ms: u64) -> Self {
        let columns: Vec<String> = rows
            .first()
            .map(|r| r.keys().cloned().collect())
            .unwrap_or_default();

        let rows: Vec<Vec<JsonValue>> = rows
            .into_iter()
            .map(|mut row| {
                columns
                    .iter()
                    .map(|c| row.remove(c).unwrap_or(JsonValue::Null))
                    .collect()
            })
            .collect();

        Self {
            columns,
            row_count: rows.len(),
            rows,
            execution_time_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(pairs: &[(&str, JsonValue)]) -> Row {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_query_param_type_names() {
        assert_eq!(QueryParam::Null.type_name(), "null");
        assert_eq!(QueryParam::from(1).type_name(), "int");
        assert_eq!(QueryParam::from("x").type_name(), "string");
        assert_eq!(QueryParam::from(None::<i64>), QueryParam::Null);
        assert!(QueryParam::Null.is_null());
    }

    #[test]
    fn test_query_param_from_json() {
        assert_eq!(QueryParam::from_json(&json!(42)), QueryParam::Int(42));
        assert_eq!(QueryParam::from_json(&json!(1.5)), QueryParam::Float(1.5));
        assert_eq!(QueryParam::from_json(&json!(true)), QueryParam::Bool(true));
        assert_eq!(QueryParam::from_json(&json!(null)), QueryParam::Null);
        assert_eq!(
            QueryParam::from_json(&json!({"a": 1})),
            QueryParam::String(r#"{"a":1}"#.to_string())
        );
    }

    #[test]
    fn test_bytes_param_serializes_as_base64() {
        let json = serde_json::to_string(&QueryParam::Bytes(b"hi".to_vec())).unwrap();
        assert_eq!(json, r#""aGk=""#);
    }

    #[test]
    fn test_parameterized_query_keeps_param_order() {
        let query = ParameterizedQuery::new("SELECT * FROM t WHERE a = ? AND b = ?")
            .bind("first")
            .bind(2);
        assert_eq!(
            query.params,
            vec![QueryParam::String("first".into()), QueryParam::Int(2)]
        );
    }

    #[test]
    fn test_query_result_from_rows_preserves_column_order() {
        let rows = vec![
            row(&[("id", json!(1)), ("name", json!("a")), ("created_at", json!(null))]),
            row(&[("id", json!(2)), ("name", json!("b")), ("created_at", json!("2024"))]),
        ];
        let result = QueryResult::from_rows(rows, 7);
        assert_eq!(result.columns, vec!["id", "name", "created_at"]);
        assert_eq!(result.row_count, 2);
        assert_eq!(result.rows[1], vec![json!(2), json!("b"), json!("2024")]);
        assert_eq!(result.execution_time_ms, 7);
    }

    #[test]
    fn test_query_result_from_empty_rows() {
        let result = QueryResult::from_rows(Vec::new(), 0);
        assert!(result.columns.is_empty());
        assert_eq!(result.row_count, 0);
    }

    #[test]
    fn test_query_result_fills_missing_cells() {
        let rows = vec![
            row(&[("a", json!(1)), ("b", json!(2))]),
            row(&[("a", json!(3))]),
        ];
        let result = QueryResult::from_rows(rows, 0);
        assert_eq!(result.rows[1], vec![json!(3), JsonValue::Null]);
    }
}
