//! Error types for the data-access layer.
//!
//! All failures are expressed through the `DbError` enum, derived with
//! `thiserror`. Cleanup failures that occur while recovering from an
//! earlier failure are chained onto the original via `DbError::chain`;
//! the original cause is always what propagates to the caller.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    /// A statement failed to build or execute. Carries the rendered query
    /// text for diagnosis.
    #[error("Query failed: {message} (query: {query})")]
    Query { query: String, message: String },

    /// A query template referenced a parameter that was not supplied, or
    /// could not otherwise be rendered.
    #[error("Template error: {message}")]
    Template { message: String },

    /// Driver-level failure reported by the underlying store.
    #[error("Database error: {message}")]
    Database {
        message: String,
        /// Driver-specific error code, when available.
        code: Option<String>,
    },

    /// A result set had an unexpected number of rows.
    #[error("Cardinality violation: expected {expected} rows, got {actual}")]
    Cardinality {
        expected: &'static str,
        actual: usize,
    },

    /// A caller-supplied row mapper rejected a row.
    #[error("Row mapping failed: {message}")]
    Mapping { message: String },

    /// A connection could not be created, prepared, or closed.
    #[error("Connection error: {message}")]
    Connection { message: String },

    /// A session contract was violated: a thread released or invalidated a
    /// connection it does not own, or the free-slot invariant broke.
    /// Signals a coordinator bug; never retryable.
    #[error("Ownership violation: {message}")]
    Ownership { message: String },

    /// Internal invariant violation.
    #[error("Internal error: {message}")]
    Internal { message: String },

    /// An original failure plus a secondary failure raised while cleaning
    /// up after it. The cause is what the caller should react to.
    #[error("{cause}; cleanup also failed: {secondary}")]
    Chained {
        cause: Box<DbError>,
        secondary: Box<DbError>,
    },
}

impl DbError {
    /// Create a query error annotated with the rendered query text.
    pub fn query(query: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Query {
            query: query.into(),
            message: message.into(),
        }
    }

    /// Create a template error.
    pub fn template(message: impl Into<String>) -> Self {
        Self::Template {
            message: message.into(),
        }
    }

    /// Create a driver-level database error.
    pub fn database(message: impl Into<String>, code: Option<String>) -> Self {
        Self::Database {
            message: message.into(),
            code,
        }
    }

    /// Create a cardinality violation error.
    pub fn cardinality(expected: &'static str, actual: usize) -> Self {
        Self::Cardinality { expected, actual }
    }

    /// Create a row mapping error.
    pub fn mapping(message: impl Into<String>) -> Self {
        Self::Mapping {
            message: message.into(),
        }
    }

    /// Create a connection error.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Create an ownership violation error.
    pub fn ownership(message: impl Into<String>) -> Self {
        Self::Ownership {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Attach a secondary (cleanup) failure to an original cause.
    pub fn chain(cause: DbError, secondary: DbError) -> Self {
        Self::Chained {
            cause: Box::new(cause),
            secondary: Box::new(secondary),
        }
    }

    /// The original cause, unwrapping any cleanup chain.
    pub fn root(&self) -> &DbError {
        match self {
            Self::Chained { cause, .. } => cause.root(),
            other => other,
        }
    }

    /// Whether this error signals a broken internal invariant rather than
    /// a failed operation.
    pub fn is_fatal(&self) -> bool {
        matches!(self.root(), Self::Ownership { .. } | Self::Internal { .. })
    }
}

/// Result type alias for database operations.
pub type DbResult<T> = Result<T, DbError>;
