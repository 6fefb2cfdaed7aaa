//! Statement execution against the active connection.
//!
//! A `Storage` is handed to units of work by the coordinator. It borrows
//! the connection bound to the current unit of work and the engine, and
//! never outlives either. All statement text goes through the engine's
//! template substitution; failures surface as `DbError::Query` carrying
//! the rendered query.

use crate::db::connection::SharedConnection;
use crate::db::engine::Engine;
use crate::error::{DbError, DbResult};
use crate::models::{Param, Row};
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use tracing::{debug, error};

/// Executes templated statements on the connection of the current unit
/// of work.
pub struct Storage<'a> {
    conn: &'a SharedConnection,
    engine: &'a dyn Engine,
}

impl<'a> Storage<'a> {
    pub(crate) fn new(conn: &'a SharedConnection, engine: &'a dyn Engine) -> Self {
        Self { conn, engine }
    }

    /// Execute a modifying statement, returning the affected row count.
    pub fn update(&self, template: &str, params: &[(&str, Param)]) -> DbResult<u64> {
        let query = self.engine.build_query(template, params)?;
        debug!(conn_id = self.conn.id(), query = %query, "update");
        let result = self.conn.raw().execute_update(&query);
        self.checked(query, result)
    }

    /// Execute an insert, returning generated keys in insertion order.
    /// Empty when the statement generated none.
    pub fn insert(&self, template: &str, params: &[(&str, Param)]) -> DbResult<Vec<JsonValue>> {
        let query = self.engine.build_query(template, params)?;
        debug!(conn_id = self.conn.id(), query = %query, "insert");
        let result = self.conn.raw().execute_insert(&query);
        self.checked(query, result)
    }

    /// Execute a query, materializing all rows in result order.
    pub fn select_rows(&self, template: &str, params: &[(&str, Param)]) -> DbResult<Vec<Row>> {
        let query = self.engine.build_query(template, params)?;
        debug!(conn_id = self.conn.id(), query = %query, "select");
        let result = self.conn.raw().execute_query(&query);
        self.checked(query, result)
    }

    /// Execute a query and map each row. Rows are mapped in result
    /// order; the first mapper failure aborts. Rows are materialized
    /// before mapping, so mappers may run nested statements.
    pub fn select_with<T>(
        &self,
        mut mapper: impl FnMut(&Row) -> DbResult<T>,
        template: &str,
        params: &[(&str, Param)],
    ) -> DbResult<Vec<T>> {
        let rows = self.select_rows(template, params)?;
        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            out.push(mapper(row)?);
        }
        Ok(out)
    }

    /// Execute a query and deserialize each row by column name.
    pub fn select_as<T: DeserializeOwned>(
        &self,
        template: &str,
        params: &[(&str, Param)],
    ) -> DbResult<Vec<T>> {
        self.select_with(
            |row| {
                serde_json::from_value(JsonValue::Object(row.to_json_map()))
                    .map_err(|e| DbError::mapping(e.to_string()))
            },
            template,
            params,
        )
    }

    /// Execute a query, returning each row as its ordered value list.
    pub fn select(
        &self,
        template: &str,
        params: &[(&str, Param)],
    ) -> DbResult<Vec<Vec<JsonValue>>> {
        let rows = self.select_rows(template, params)?;
        Ok(rows.into_iter().map(Row::into_values).collect())
    }

    /// Escape a value for interpolation as a string literal, per the
    /// engine's dialect.
    pub fn escape(&self, value: &str) -> String {
        self.engine.escape(value)
    }

    fn checked<T>(&self, query: String, result: DbResult<T>) -> DbResult<T> {
        result.map_err(|e| {
            error!(conn_id = self.conn.id(), query = %query, error = %e, "statement failed");
            DbError::query(query, e.to_string())
        })
    }
}

/// Assert an affected-row count is at least one.
pub fn expect_many(count: u64) -> DbResult<u64> {
    if count == 0 {
        return Err(DbError::cardinality("at least one row", 0));
    }
    Ok(count)
}

/// Assert an affected-row count is exactly one.
pub fn expect_one(count: u64) -> DbResult<()> {
    if count != 1 {
        return Err(DbError::cardinality("exactly one row", count as usize));
    }
    Ok(())
}

/// Assert an affected-row count is zero or one.
pub fn expect_at_most_one(count: u64) -> DbResult<u64> {
    if count > 1 {
        return Err(DbError::cardinality("at most one row", count as usize));
    }
    Ok(count)
}

/// Assert a result set is non-empty and return it.
pub fn take_many<T>(items: Vec<T>) -> DbResult<Vec<T>> {
    if items.is_empty() {
        return Err(DbError::cardinality("at least one row", 0));
    }
    Ok(items)
}

/// Assert a result set holds exactly one item and return it.
pub fn take_one<T>(items: Vec<T>) -> DbResult<T> {
    let len = items.len();
    let mut items = items;
    match items.pop() {
        Some(item) if len == 1 => Ok(item),
        _ => Err(DbError::cardinality("exactly one row", len)),
    }
}

/// Assert a result set holds at most one item and return it, if any.
pub fn take_at_most_one<T>(items: Vec<T>) -> DbResult<Option<T>> {
    let len = items.len();
    let mut items = items;
    match len {
        0 => Ok(None),
        1 => Ok(items.pop()),
        _ => Err(DbError::cardinality("at most one row", len)),
    }
}

/// Keep only the first column of each row.
pub fn take_first_column(rows: Vec<Vec<JsonValue>>) -> Vec<JsonValue> {
    rows.into_iter()
        .map(|mut row| {
            if row.is_empty() {
                JsonValue::Null
            } else {
                row.swap_remove(0)
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::connection::ConnectionHandle;
    use crate::db::engine::GenericEngine;
    use crate::db::testing::MockFactory;
    use crate::params;
    use serde_json::json;

    #[test]
    fn test_update_renders_template_through_engine() {
        let factory = MockFactory::new();
        let conn = ConnectionHandle::new(
            crate::db::connection::ConnectionFactory::create(&factory).unwrap(),
        );
        let engine = GenericEngine;
        let storage = Storage::new(&conn, &engine);
        storage
            .update("delete from A where id=:id", params!["id" => 3])
            .unwrap();
        assert_eq!(
            *factory.probe(0).statements.lock().unwrap(),
            vec!["delete from A where id=3".to_string()]
        );
    }

    #[test]
    fn test_template_error_is_not_a_query_error() {
        let factory = MockFactory::new();
        let conn = ConnectionHandle::new(
            crate::db::connection::ConnectionFactory::create(&factory).unwrap(),
        );
        let engine = GenericEngine;
        let storage = Storage::new(&conn, &engine);
        let err = storage
            .update("delete from A where id=:id", params![])
            .unwrap_err();
        assert!(matches!(err, DbError::Template { .. }));
        assert!(factory.probe(0).statements.lock().unwrap().is_empty());
    }

    #[test]
    fn test_expect_helpers() {
        assert_eq!(expect_many(3).unwrap(), 3);
        assert!(matches!(
            expect_many(0),
            Err(DbError::Cardinality { .. })
        ));
        expect_one(1).unwrap();
        assert!(matches!(expect_one(2), Err(DbError::Cardinality { .. })));
        assert_eq!(expect_at_most_one(0).unwrap(), 0);
        assert_eq!(expect_at_most_one(1).unwrap(), 1);
        assert!(matches!(
            expect_at_most_one(2),
            Err(DbError::Cardinality { .. })
        ));
    }

    #[test]
    fn test_take_helpers() {
        assert_eq!(take_many(vec![1, 2]).unwrap(), vec![1, 2]);
        assert!(matches!(
            take_many(Vec::<i32>::new()),
            Err(DbError::Cardinality { .. })
        ));

        assert_eq!(take_one(vec![5]).unwrap(), 5);
        assert!(matches!(
            take_one(Vec::<i32>::new()),
            Err(DbError::Cardinality { .. })
        ));
        assert!(matches!(
            take_one(vec![1, 2]),
            Err(DbError::Cardinality { .. })
        ));

        assert_eq!(take_at_most_one(Vec::<i32>::new()).unwrap(), None);
        assert_eq!(take_at_most_one(vec![7]).unwrap(), Some(7));
        assert!(matches!(
            take_at_most_one(vec![1, 2]),
            Err(DbError::Cardinality { .. })
        ));
    }

    #[test]
    fn test_take_first_column() {
        let rows = vec![vec![json!(1), json!("a1")], vec![json!(2), json!("a2")]];
        assert_eq!(take_first_column(rows), vec![json!(1), json!(2)]);
    }
}
