// File: src/query/rows.rs

use rusqlite::types::Value;
use serde::ser::{Serialize, Serializer};
use serde_json::json;

/// Result set of a routed query
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Rows {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl Rows {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of a result column (case-insensitive, first match)
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.eq_ignore_ascii_case(name))
    }

    /// Values of one column, in row order
    pub fn column(&self, name: &str) -> Option<Vec<&Value>> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().filter_map(|r| r.get(idx)).collect())
    }

    /// Integer values of one column; non-integers are skipped
    pub fn column_i64(&self, name: &str) -> Vec<i64> {
        self.column(name)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|v| match v {
                Value::Integer(i) => Some(*i),
                _ => None,
            })
            .collect()
    }

    /// JSON rendering: `{"columns": [...], "rows": [[...], ...]}`
    pub fn to_json(&self) -> serde_json::Value {
        let rows: Vec<serde_json::Value> = self
            .rows
            .iter()
            .map(|row| serde_json::Value::Array(row.iter().map(value_to_json).collect()))
            .collect();
        json!({ "columns": self.columns, "rows": rows })
    }
}

impl Serialize for Rows {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

/// Blobs become arrays of byte values; non-finite reals become null
pub fn value_to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Integer(i) => json!(i),
        Value::Real(f) => serde_json::Number::from_f64(*f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Value::Text(s) => json!(s),
        Value::Blob(b) => json!(b),
    }
}
