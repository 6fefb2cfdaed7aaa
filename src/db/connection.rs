//! Raw connection seam.
//!
//! The session and coordinator treat the underlying store through two
//! narrow traits: `RawConnection` (one live link, one statement at a
//! time) and `ConnectionFactory` (creates new links; the session is the
//! pool). Connections are passed around as `SharedConnection` handles;
//! handle identity (`Arc::ptr_eq`) is what the session's ownership
//! checks compare.

use crate::error::DbResult;
use crate::models::Row;
use serde_json::Value as JsonValue;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

/// A single physical connection to the backing store.
///
/// Implementations are driven by exactly one thread at a time; the
/// session guarantees exclusive ownership, so no interior locking is
/// required here.
pub trait RawConnection: Send {
    /// Open a transaction. Called once per top-level unit of work, before
    /// any statement runs on the connection.
    fn begin(&mut self) -> DbResult<()>;

    /// Commit the open transaction.
    fn commit(&mut self) -> DbResult<()>;

    /// Roll back the open transaction.
    fn rollback(&mut self) -> DbResult<()>;

    /// Execute a statement and return the affected row count.
    fn execute_update(&mut self, sql: &str) -> DbResult<u64>;

    /// Execute an insert and return the generated identifiers, in
    /// insertion order. Empty when the statement generated none.
    fn execute_insert(&mut self, sql: &str) -> DbResult<Vec<JsonValue>>;

    /// Execute a query and materialize all rows, in result order.
    /// Statement and cursor resources are released before returning,
    /// on success and on failure alike.
    fn execute_query(&mut self, sql: &str) -> DbResult<Vec<Row>>;

    /// Execute a dialect setup statement with no interesting result
    /// (used by engines to prepare a connection).
    fn execute_raw(&mut self, sql: &str) -> DbResult<()>;

    /// Close the physical connection. Further use is an error.
    fn close(&mut self) -> DbResult<()>;
}

/// Creates new raw connections. No pooling or retry on this side; the
/// session decides when to reuse and when to create.
pub trait ConnectionFactory: Send + Sync {
    fn create(&self) -> DbResult<Box<dyn RawConnection>>;
}

/// Identity-bearing wrapper around a raw connection.
///
/// The mutex is not for cross-thread sharing of live use (the session
/// binds a connection to one thread at a time); it makes the handle
/// `Sync` so sessions can hold it in shared state, and it serializes the
/// rare close-from-release path.
pub struct ConnectionHandle {
    id: String,
    inner: Mutex<Box<dyn RawConnection>>,
}

/// A shared, identity-comparable connection handle.
pub type SharedConnection = Arc<ConnectionHandle>;

impl ConnectionHandle {
    /// Wrap a raw connection into a shared handle with a fresh
    /// diagnostic id.
    pub fn new(raw: Box<dyn RawConnection>) -> SharedConnection {
        Arc::new(Self {
            id: format!("conn_{}", Uuid::new_v4().simple()),
            inner: Mutex::new(raw),
        })
    }

    /// Diagnostic id used in log output.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Lock the raw connection for a statement or lifecycle call.
    /// A poisoned lock still yields the connection so cleanup can run.
    pub fn raw(&self) -> MutexGuard<'_, Box<dyn RawConnection>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testing::MockFactory;

    #[test]
    fn test_handle_ids_are_unique() {
        let factory = MockFactory::new();
        let a = ConnectionHandle::new(factory.create().unwrap());
        let b = ConnectionHandle::new(factory.create().unwrap());
        assert_ne!(a.id(), b.id());
        assert!(a.id().starts_with("conn_"));
    }

    #[test]
    fn test_handle_identity_is_pointer_identity() {
        let factory = MockFactory::new();
        let a = ConnectionHandle::new(factory.create().unwrap());
        let same = Arc::clone(&a);
        let b = ConnectionHandle::new(factory.create().unwrap());
        assert!(Arc::ptr_eq(&a, &same));
        assert!(!Arc::ptr_eq(&a, &b));
    }
}
