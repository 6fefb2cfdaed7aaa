//! SQLite driver adapter over rusqlite.
//!
//! `begin` takes the writer lock up front with `BEGIN IMMEDIATE`; SQLite
//! transactions are serializable, so concurrent writers queue on the
//! busy timeout instead of failing mid-transaction.

use crate::db::connection::{ConnectionFactory, RawConnection};
use crate::error::{DbError, DbResult};
use crate::models::Row;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use rusqlite::types::ValueRef;
use serde_json::Value as JsonValue;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

impl From<rusqlite::Error> for DbError {
    fn from(e: rusqlite::Error) -> Self {
        let code = match &e {
            rusqlite::Error::SqliteFailure(err, _) => Some(format!("{:?}", err.code)),
            _ => None,
        };
        DbError::Database {
            message: e.to_string(),
            code,
        }
    }
}

/// Opens connections to one SQLite database file.
pub struct SqliteFactory {
    path: PathBuf,
    busy_timeout: Duration,
}

impl SqliteFactory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            busy_timeout: Duration::from_secs(5),
        }
    }

    /// How long a connection waits on a locked database before its
    /// statement fails. Default five seconds.
    pub fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }
}

impl ConnectionFactory for SqliteFactory {
    fn create(&self) -> DbResult<Box<dyn RawConnection>> {
        let conn = rusqlite::Connection::open(&self.path)?;
        conn.busy_timeout(self.busy_timeout)?;
        debug!(path = %self.path.display(), "opened sqlite connection");
        Ok(Box::new(SqliteConnection { conn: Some(conn) }))
    }
}

/// One physical SQLite connection. `None` after close.
pub struct SqliteConnection {
    conn: Option<rusqlite::Connection>,
}

impl SqliteConnection {
    fn conn(&self) -> DbResult<&rusqlite::Connection> {
        self.conn
            .as_ref()
            .ok_or_else(|| DbError::internal("sqlite connection used after close"))
    }
}

impl RawConnection for SqliteConnection {
    fn begin(&mut self) -> DbResult<()> {
        self.conn()?.execute_batch("BEGIN IMMEDIATE")?;
        Ok(())
    }

    fn commit(&mut self) -> DbResult<()> {
        self.conn()?.execute_batch("COMMIT")?;
        Ok(())
    }

    fn rollback(&mut self) -> DbResult<()> {
        self.conn()?.execute_batch("ROLLBACK")?;
        Ok(())
    }

    fn execute_update(&mut self, sql: &str) -> DbResult<u64> {
        Ok(self.conn()?.execute(sql, [])? as u64)
    }

    fn execute_insert(&mut self, sql: &str) -> DbResult<Vec<JsonValue>> {
        let conn = self.conn()?;
        let before = conn.last_insert_rowid();
        let changes = conn.execute(sql, [])?;
        let after = conn.last_insert_rowid();
        // Rowids within a single INSERT are allocated sequentially, so
        // the generated keys are the last `changes` rowids ending at
        // `after`. No new rowid means no generated keys.
        if changes == 0 || after == before {
            return Ok(Vec::new());
        }
        let start = after - changes as i64 + 1;
        Ok((start..=after).map(JsonValue::from).collect())
    }

    fn execute_query(&mut self, sql: &str) -> DbResult<Vec<Row>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(sql)?;
        let columns: Arc<[String]> = stmt
            .column_names()
            .into_iter()
            .map(str::to_string)
            .collect::<Vec<_>>()
            .into();
        let width = columns.len();

        let mut rows = stmt.query([])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let mut values = Vec::with_capacity(width);
            for i in 0..width {
                values.push(value_to_json(row.get_ref(i)?));
            }
            out.push(Row::new(Arc::clone(&columns), values));
        }
        Ok(out)
    }

    fn execute_raw(&mut self, sql: &str) -> DbResult<()> {
        self.conn()?.execute_batch(sql)?;
        Ok(())
    }

    fn close(&mut self) -> DbResult<()> {
        match self.conn.take() {
            Some(conn) => conn.close().map_err(|(_, e)| e.into()),
            None => Err(DbError::internal("sqlite connection closed twice")),
        }
    }
}

fn value_to_json(value: ValueRef<'_>) -> JsonValue {
    match value {
        ValueRef::Null => JsonValue::Null,
        ValueRef::Integer(v) => JsonValue::from(v),
        ValueRef::Real(v) => serde_json::Number::from_f64(v)
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null),
        ValueRef::Text(t) => JsonValue::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => JsonValue::String(BASE64.encode(b)),
    }
}
