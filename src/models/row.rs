//! A materialized result row.
//!
//! Rows keep the column order produced by the store. Values are held as
//! JSON values; binary columns are base64-encoded by the driver adapter.

use crate::error::{DbError, DbResult};
use serde_json::Value as JsonValue;
use std::sync::Arc;

/// One row of a result set: ordered column names shared across the
/// result set, plus the values for this row in the same order.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Arc<[String]>,
    values: Vec<JsonValue>,
}

impl Row {
    /// Create a row. `values` must be in `columns` order.
    pub fn new(columns: Arc<[String]>, values: Vec<JsonValue>) -> Self {
        Self { columns, values }
    }

    /// Column names, in result order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Value of the named column, if present.
    pub fn get(&self, name: &str) -> Option<&JsonValue> {
        self.columns
            .iter()
            .position(|c| c == name)
            .and_then(|i| self.values.get(i))
    }

    /// Value at the given column index, if in range.
    pub fn index(&self, i: usize) -> Option<&JsonValue> {
        self.values.get(i)
    }

    /// The named column as an integer.
    pub fn get_i64(&self, name: &str) -> DbResult<i64> {
        self.get(name)
            .and_then(JsonValue::as_i64)
            .ok_or_else(|| Self::column_error(name, "integer"))
    }

    /// The named column as a float.
    pub fn get_f64(&self, name: &str) -> DbResult<f64> {
        self.get(name)
            .and_then(JsonValue::as_f64)
            .ok_or_else(|| Self::column_error(name, "float"))
    }

    /// The named column as a boolean (accepts SQL-style 0/1).
    pub fn get_bool(&self, name: &str) -> DbResult<bool> {
        match self.get(name) {
            Some(JsonValue::Bool(b)) => Ok(*b),
            Some(JsonValue::Number(n)) if n.as_i64() == Some(0) => Ok(false),
            Some(JsonValue::Number(n)) if n.as_i64() == Some(1) => Ok(true),
            _ => Err(Self::column_error(name, "boolean")),
        }
    }

    /// The named column as a string slice.
    pub fn get_str(&self, name: &str) -> DbResult<&str> {
        self.get(name)
            .and_then(JsonValue::as_str)
            .ok_or_else(|| Self::column_error(name, "string"))
    }

    /// Render the row as a name-keyed JSON map, in column order.
    pub fn to_json_map(&self) -> serde_json::Map<String, JsonValue> {
        self.columns
            .iter()
            .cloned()
            .zip(self.values.iter().cloned())
            .collect()
    }

    /// Consume the row, keeping only the ordered values.
    pub fn into_values(self) -> Vec<JsonValue> {
        self.values
    }

    fn column_error(name: &str, wanted: &str) -> DbError {
        DbError::mapping(format!("column `{name}' missing or not a {wanted}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Row {
        let columns: Arc<[String]> = vec!["id".to_string(), "name".to_string()].into();
        Row::new(columns, vec![json!(1), json!("a1")])
    }

    #[test]
    fn test_get_by_name_and_index() {
        let row = sample();
        assert_eq!(row.get("id"), Some(&json!(1)));
        assert_eq!(row.index(1), Some(&json!("a1")));
        assert_eq!(row.get("missing"), None);
    }

    #[test]
    fn test_typed_getters() {
        let row = sample();
        assert_eq!(row.get_i64("id").unwrap(), 1);
        assert_eq!(row.get_str("name").unwrap(), "a1");
        assert!(matches!(
            row.get_i64("name"),
            Err(DbError::Mapping { .. })
        ));
    }

    #[test]
    fn test_float_and_bool_getters() {
        let columns: Arc<[String]> =
            vec!["price".to_string(), "active".to_string(), "flag".to_string()].into();
        let row = Row::new(columns, vec![json!(1.5), json!(1), json!(true)]);
        assert_eq!(row.get_f64("price").unwrap(), 1.5);
        // SQL stores booleans as 0/1; both forms are accepted.
        assert!(row.get_bool("active").unwrap());
        assert!(row.get_bool("flag").unwrap());
        assert!(matches!(
            row.get_bool("price"),
            Err(DbError::Mapping { .. })
        ));
    }

    #[test]
    fn test_to_json_map_preserves_order() {
        let map = sample().to_json_map();
        let keys: Vec<_> = map.keys().cloned().collect();
        assert_eq!(keys, vec!["id", "name"]);
    }

    #[test]
    fn test_into_values() {
        assert_eq!(sample().into_values(), vec![json!(1), json!("a1")]);
    }
}
