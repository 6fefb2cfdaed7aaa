//! Connection sessions.
//!
//! A session owns the lifecycle of connections between units of work.
//! `CachingSession` binds one connection per thread and keeps a single
//! free connection for reuse; `DirectSession` opens a fresh connection
//! for every unit of work. Both enforce ownership: a thread may only
//! release or invalidate the connection it acquired, by handle identity.

use crate::db::connection::{ConnectionFactory, ConnectionHandle, SharedConnection};
use crate::error::{DbError, DbResult};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, ThreadId};
use tracing::{debug, warn};

/// Hands out connections to units of work and takes them back.
///
/// `acquire`/`release` pairs always run on the same thread. `invalidate`
/// discards a connection that failed mid-work; it never returns `Ok`,
/// instead handing back the caller's `cause` (with any cleanup failure
/// chained onto it) so the caller can re-raise one error.
pub trait Session: Send + Sync {
    /// Get a connection bound to the calling thread.
    fn acquire(&self) -> DbResult<SharedConnection>;

    /// Return the calling thread's connection after successful work.
    fn release(&self, conn: &SharedConnection) -> DbResult<()>;

    /// Discard the calling thread's connection after failed work.
    /// Returns `cause`, chaining any cleanup failure as secondary.
    fn invalidate(&self, conn: &SharedConnection, cause: DbError) -> DbError;
}

struct CachingState {
    bindings: HashMap<ThreadId, SharedConnection>,
    free: Option<SharedConnection>,
}

/// Session that reuses connections: each thread gets at most one bound
/// connection, and a single released connection is kept free for the
/// next acquiring thread instead of being closed.
pub struct CachingSession {
    factory: Arc<dyn ConnectionFactory>,
    state: Mutex<CachingState>,
}

impl CachingSession {
    pub fn new(factory: Arc<dyn ConnectionFactory>) -> Self {
        Self {
            factory,
            state: Mutex::new(CachingState {
                bindings: HashMap::new(),
                free: None,
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CachingState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Validate that `conn` is the connection bound to the calling
    /// thread, removing the binding on success. Runs under the caller's
    /// guard so the whole operation is one critical section.
    fn unbind(state: &mut CachingState, conn: &SharedConnection) -> DbResult<SharedConnection> {
        let tid = thread::current().id();
        match state.bindings.get(&tid) {
            Some(bound) if Arc::ptr_eq(bound, conn) => {
                Ok(state.bindings.remove(&tid).unwrap_or_else(|| Arc::clone(conn)))
            }
            Some(_) => Err(DbError::ownership(
                "connection does not belong to the current thread",
            )),
            None => Err(DbError::ownership(
                "no connection is bound to the current thread",
            )),
        }
    }
}

impl Session for CachingSession {
    /// Idempotent per thread: a repeated acquire before release returns
    /// the already bound connection.
    fn acquire(&self) -> DbResult<SharedConnection> {
        let tid = thread::current().id();
        {
            let mut state = self.lock();
            if let Some(bound) = state.bindings.get(&tid) {
                return Ok(Arc::clone(bound));
            }
            if let Some(conn) = state.free.take() {
                debug!(conn_id = conn.id(), "reusing free connection");
                state.bindings.insert(tid, Arc::clone(&conn));
                return Ok(conn);
            }
        }

        // Creation runs outside the lock; the thread key is ours alone,
        // so binding afterwards cannot race with another acquire.
        let conn = ConnectionHandle::new(self.factory.create()?);
        debug!(conn_id = conn.id(), "created connection");
        self.lock().bindings.insert(tid, Arc::clone(&conn));
        Ok(conn)
    }

    fn release(&self, conn: &SharedConnection) -> DbResult<()> {
        let mut state = self.lock();
        let conn = Self::unbind(&mut state, conn)?;
        match &state.free {
            Some(free) if Arc::ptr_eq(free, &conn) => Err(DbError::ownership(
                "connection was already released",
            )),
            Some(_) => {
                // The free slot holds one connection; an extra release
                // closes the returned connection instead. The only I/O
                // performed under the session lock.
                debug!(conn_id = conn.id(), "free slot occupied, closing connection");
                let closed = conn.raw().close();
                closed
            }
            None => {
                debug!(conn_id = conn.id(), "connection parked free");
                state.free = Some(conn);
                Ok(())
            }
        }
    }

    fn invalidate(&self, conn: &SharedConnection, cause: DbError) -> DbError {
        warn!(conn_id = conn.id(), error = %cause, "invalidating connection");
        let mut state = self.lock();
        let cause = match Self::unbind(&mut state, conn) {
            Ok(_) => cause,
            Err(fault) => DbError::chain(cause, fault),
        };
        if let Some(free) = &state.free {
            if Arc::ptr_eq(free, conn) {
                state.free = None;
            }
        }
        // The handle drops with the last clone; the physical link goes
        // with it. No close attempt on a connection in unknown state.
        cause
    }
}

/// Session with no reuse: every acquire opens a fresh connection and
/// release closes it.
pub struct DirectSession {
    factory: Arc<dyn ConnectionFactory>,
    bindings: Mutex<HashMap<ThreadId, SharedConnection>>,
}

impl DirectSession {
    pub fn new(factory: Arc<dyn ConnectionFactory>) -> Self {
        Self {
            factory,
            bindings: Mutex::new(HashMap::new()),
        }
    }

    fn unbind(&self, conn: &SharedConnection) -> DbResult<SharedConnection> {
        let tid = thread::current().id();
        let mut bindings = self
            .bindings
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        match bindings.get(&tid) {
            Some(bound) if Arc::ptr_eq(bound, conn) => {
                Ok(bindings.remove(&tid).unwrap_or_else(|| Arc::clone(conn)))
            }
            Some(_) => Err(DbError::ownership(
                "connection does not belong to the current thread",
            )),
            None => Err(DbError::ownership(
                "no connection is bound to the current thread",
            )),
        }
    }
}

impl Session for DirectSession {
    fn acquire(&self) -> DbResult<SharedConnection> {
        let tid = thread::current().id();
        {
            let bindings = self
                .bindings
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if bindings.contains_key(&tid) {
                return Err(DbError::ownership(
                    "current thread already holds a connection",
                ));
            }
        }
        let conn = ConnectionHandle::new(self.factory.create()?);
        debug!(conn_id = conn.id(), "created connection");
        self.bindings
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(tid, Arc::clone(&conn));
        Ok(conn)
    }

    fn release(&self, conn: &SharedConnection) -> DbResult<()> {
        let conn = self.unbind(conn)?;
        debug!(conn_id = conn.id(), "closing connection");
        // The guard must drop before `conn` does.
        let closed = conn.raw().close();
        closed
    }

    fn invalidate(&self, conn: &SharedConnection, cause: DbError) -> DbError {
        warn!(conn_id = conn.id(), error = %cause, "invalidating connection");
        match self.unbind(conn) {
            Ok(_) => cause,
            Err(fault) => DbError::chain(cause, fault),
        }
    }
}
