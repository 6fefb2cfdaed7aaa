//! Thin data-access layer over a relational store.
//!
//! The layer has three moving parts:
//!
//! - a [`Session`](db::Session) hands connections to threads and takes
//!   them back; [`CachingSession`](db::CachingSession) binds one
//!   connection per thread and keeps a single released connection free
//!   for reuse,
//! - a [`Transaction`](db::Transaction) coordinator runs units of work:
//!   the outermost call per thread opens and commits (or rolls back) a
//!   raw transaction, nested calls reuse the bound connection,
//! - a [`Storage`](db::Storage) executes templated statements inside a
//!   unit of work.
//!
//! Query text is produced by an [`Engine`](db::Engine) that substitutes
//! `:name` parameters into templates and escapes string values per
//! dialect. The store itself hides behind the
//! [`RawConnection`](db::RawConnection) seam; a rusqlite-backed adapter
//! ships in [`db::sqlite`].
//!
//! ```no_run
//! use db_session::db::{CachingSession, GenericEngine, SqliteFactory, Transaction};
//! use db_session::{params, DbResult};
//! use std::sync::Arc;
//!
//! fn main() -> DbResult<()> {
//!     let factory = Arc::new(SqliteFactory::new("app.db"));
//!     let session = Arc::new(CachingSession::new(factory));
//!     let tx = Transaction::new(session, Arc::new(GenericEngine));
//!
//!     tx.exec(|s| {
//!         s.update(
//!             "insert into users(name) values(:name)",
//!             params!["name" => "ada"],
//!         )?;
//!         Ok(())
//!     })
//! }
//! ```

pub mod db;
pub mod error;
pub mod models;

pub use error::{DbError, DbResult};
pub use models::{Param, Row};
