//! Transaction coordination.
//!
//! A `Transaction` runs units of work. The outermost call on a thread
//! acquires a connection from the session, opens a raw transaction,
//! prepares the connection through the engine, and hands a `Storage` to
//! the work closure. Nested calls on the same thread reuse the bound
//! connection and perform no lifecycle operations, so commit and
//! rollback happen exactly once per thread, at the outermost frame.
//!
//! Success commits and releases the connection back to the session.
//! Any failure, including a failed commit, rolls back and invalidates
//! the connection so a possibly broken link never returns to the pool.

use crate::db::connection::SharedConnection;
use crate::db::engine::Engine;
use crate::db::session::Session;
use crate::db::storage::Storage;
use crate::error::{DbError, DbResult};
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, ThreadId};
use tracing::{debug, info};

/// A caller-defined holder of canned query templates.
///
/// Implementations are constructed once per coordinator per type, with
/// the engine's variant tag, and reused across units of work. Build
/// dialect-specific template sets in `create` based on the variant.
pub trait QueryAccessor: Send + Sync + Sized + 'static {
    fn create(variant: &str) -> Self;
}

/// Coordinates units of work over a session and an engine.
pub struct Transaction {
    session: Arc<dyn Session>,
    engine: Arc<dyn Engine>,
    contexts: Mutex<HashMap<ThreadId, SharedConnection>>,
    accessors: Mutex<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>,
}

impl Transaction {
    pub fn new(session: Arc<dyn Session>, engine: Arc<dyn Engine>) -> Self {
        Self {
            session,
            engine,
            contexts: Mutex::new(HashMap::new()),
            accessors: Mutex::new(HashMap::new()),
        }
    }

    /// Run a unit of work and return its value.
    pub fn call<T>(&self, work: impl FnOnce(&Storage) -> DbResult<T>) -> DbResult<T> {
        self.run(work)
    }

    /// Run a unit of work with the accessor for `Q`.
    pub fn call_with<Q, T>(
        &self,
        work: impl FnOnce(&Storage, &Q) -> DbResult<T>,
    ) -> DbResult<T>
    where
        Q: QueryAccessor,
    {
        let queries = self.accessor::<Q>()?;
        self.run(|storage| work(storage, &queries))
    }

    /// Run a unit of work with no result.
    pub fn exec(&self, work: impl FnOnce(&Storage) -> DbResult<()>) -> DbResult<()> {
        self.run(work)
    }

    /// Run a unit of work with the accessor for `Q` and no result.
    pub fn exec_with<Q>(
        &self,
        work: impl FnOnce(&Storage, &Q) -> DbResult<()>,
    ) -> DbResult<()>
    where
        Q: QueryAccessor,
    {
        self.call_with(work)
    }

    /// The cached accessor of type `Q`, created on first use with the
    /// engine's variant. The same instance is returned every time.
    pub fn accessor<Q: QueryAccessor>(&self) -> DbResult<Arc<Q>> {
        let entry = {
            let mut cache = self
                .accessors
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            Arc::clone(cache.entry(TypeId::of::<Q>()).or_insert_with(|| {
                debug!(variant = self.engine.variant(), "creating query accessor");
                Arc::new(Q::create(self.engine.variant()))
            }))
        };
        entry
            .downcast::<Q>()
            .map_err(|_| DbError::internal("query accessor cache holds a foreign type"))
    }

    fn run<T>(&self, work: impl FnOnce(&Storage) -> DbResult<T>) -> DbResult<T> {
        let tid = thread::current().id();

        let bound = {
            let contexts = self
                .contexts
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            contexts.get(&tid).cloned()
        };
        // Nested frame: reuse the bound connection, no lifecycle calls.
        if let Some(conn) = bound {
            let storage = Storage::new(&conn, self.engine.as_ref());
            return work(&storage);
        }

        let conn = self.session.acquire()?;
        if let Err(cause) = self.begin(&conn) {
            return Err(self.session.invalidate(&conn, cause));
        }
        self.contexts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(tid, Arc::clone(&conn));
        info!(conn_id = conn.id(), "transaction started");

        let result = {
            let storage = Storage::new(&conn, self.engine.as_ref());
            work(&storage)
        };

        match result {
            Ok(value) => {
                let committed = conn.raw().commit();
                if let Err(cause) = committed {
                    return Err(self.abort(tid, &conn, cause));
                }
                self.contexts
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .remove(&tid);
                self.session.release(&conn)?;
                info!(conn_id = conn.id(), "transaction committed");
                Ok(value)
            }
            Err(cause) => Err(self.abort(tid, &conn, cause)),
        }
    }

    fn begin(&self, conn: &SharedConnection) -> DbResult<()> {
        conn.raw().begin()?;
        self.engine.prepare_connection(conn.raw().as_mut())
    }

    /// Roll back and discard the connection. Returns the error to
    /// propagate: `cause`, with a failed rollback chained onto it.
    fn abort(&self, tid: ThreadId, conn: &SharedConnection, cause: DbError) -> DbError {
        info!(conn_id = conn.id(), error = %cause, "transaction rolled back");
        let rolled_back = conn.raw().rollback();
        let cause = match rolled_back {
            Ok(()) => cause,
            Err(e) => DbError::chain(cause, e),
        };
        self.contexts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&tid);
        self.session.invalidate(conn, cause)
    }
}
