//! Test doubles for the connection seam, shared by the unit tests.

use crate::db::connection::{ConnectionFactory, RawConnection};
use crate::error::{DbError, DbResult};
use crate::models::Row;
use serde_json::Value as JsonValue;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Observable per-connection state, shared between the mock connection
/// and the test that created it.
#[derive(Default)]
pub struct MockProbe {
    pub begun: AtomicBool,
    pub committed: AtomicBool,
    pub rolled_back: AtomicBool,
    pub closed: AtomicBool,
    pub statements: Mutex<Vec<String>>,
}

impl MockProbe {
    pub fn closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Which lifecycle calls fail on a mock connection.
#[derive(Default, Clone, Copy)]
pub struct Faults {
    pub begin: bool,
    pub commit: bool,
    pub rollback: bool,
    pub close: bool,
}

pub struct MockConnection {
    pub probe: Arc<MockProbe>,
    pub faults: Faults,
}

impl MockConnection {
    pub fn new(probe: Arc<MockProbe>) -> Self {
        Self {
            probe,
            faults: Faults::default(),
        }
    }

    fn record(&self, sql: &str) {
        self.probe
            .statements
            .lock()
            .unwrap()
            .push(sql.to_string());
    }
}

impl RawConnection for MockConnection {
    fn begin(&mut self) -> DbResult<()> {
        if self.faults.begin {
            return Err(DbError::database("mock begin failure", None));
        }
        self.probe.begun.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn commit(&mut self) -> DbResult<()> {
        if self.faults.commit {
            return Err(DbError::database("mock commit failure", None));
        }
        self.probe.committed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn rollback(&mut self) -> DbResult<()> {
        if self.faults.rollback {
            return Err(DbError::database("mock rollback failure", None));
        }
        self.probe.rolled_back.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn execute_update(&mut self, sql: &str) -> DbResult<u64> {
        self.record(sql);
        Ok(0)
    }

    fn execute_insert(&mut self, sql: &str) -> DbResult<Vec<JsonValue>> {
        self.record(sql);
        Ok(Vec::new())
    }

    fn execute_query(&mut self, sql: &str) -> DbResult<Vec<Row>> {
        self.record(sql);
        Ok(Vec::new())
    }

    fn execute_raw(&mut self, sql: &str) -> DbResult<()> {
        self.record(sql);
        Ok(())
    }

    fn close(&mut self) -> DbResult<()> {
        if self.faults.close {
            return Err(DbError::connection("mock close failure"));
        }
        self.probe.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Factory producing mock connections, keeping a probe per connection
/// in creation order. The fault flags apply to connections created
/// after they are set.
#[derive(Default)]
pub struct MockFactory {
    pub created: AtomicUsize,
    pub probes: Mutex<Vec<Arc<MockProbe>>>,
    pub faults: Mutex<Faults>,
}

impl MockFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn probe(&self, i: usize) -> Arc<MockProbe> {
        Arc::clone(&self.probes.lock().unwrap()[i])
    }

    pub fn set_faults(&self, faults: Faults) {
        *self.faults.lock().unwrap() = faults;
    }
}

impl ConnectionFactory for MockFactory {
    fn create(&self) -> DbResult<Box<dyn RawConnection>> {
        let probe = Arc::new(MockProbe::default());
        self.probes.lock().unwrap().push(Arc::clone(&probe));
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockConnection {
            probe,
            faults: *self.faults.lock().unwrap(),
        }))
    }
}
