//! Database access layer: sessions, the transaction coordinator, query
//! execution, and the driver seam.

pub mod connection;
pub mod engine;
pub mod session;
pub mod sqlite;
pub mod storage;
pub mod transaction;

#[cfg(test)]
pub(crate) mod testing;

pub use connection::{ConnectionFactory, ConnectionHandle, RawConnection, SharedConnection};
pub use engine::{Engine, GenericEngine, MysqlEngine};
pub use session::{CachingSession, DirectSession, Session};
pub use sqlite::{SqliteConnection, SqliteFactory};
pub use storage::Storage;
pub use transaction::{QueryAccessor, Transaction};
