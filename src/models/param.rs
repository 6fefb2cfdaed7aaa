//! Query parameter values.
//!
//! Parameters are passed to the storage operations as `(name, value)`
//! pairs and substituted into query templates by the engine. The
//! `params!` macro builds the pair slice from `name => value` entries.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// A value bound to a named template parameter.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Param {
    /// NULL value
    Null,
    /// Boolean value, rendered as 1/0
    Bool(bool),
    /// Integer value (stored as i64 for maximum range)
    Int(i64),
    /// Floating point value
    Float(f64),
    /// String value, rendered quoted
    Str(String),
    /// UTC timestamp, rendered in MySQL-style format
    Timestamp(DateTime<Utc>),
    /// A list of values, rendered comma-joined (for `IN (:xs)` clauses)
    List(Vec<Param>),
}

impl Param {
    /// Check if this parameter is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Get the type name of this parameter for diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Str(_) => "string",
            Self::Timestamp(_) => "timestamp",
            Self::List(_) => "list",
        }
    }
}

impl From<bool> for Param {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for Param {
    fn from(v: i32) -> Self {
        Self::Int(v as i64)
    }
}

impl From<i64> for Param {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for Param {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for Param {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<String> for Param {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

impl From<DateTime<Utc>> for Param {
    fn from(v: DateTime<Utc>) -> Self {
        Self::Timestamp(v)
    }
}

impl<T: Into<Param>> From<Vec<T>> for Param {
    fn from(v: Vec<T>) -> Self {
        Self::List(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Param>> From<Option<T>> for Param {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(v) => v.into(),
            None => Self::Null,
        }
    }
}

/// Build a named-parameter slice for the storage operations.
///
/// ```
/// use db_session::params;
///
/// let ps = params!["id" => 2, "name" => "a1"];
/// assert_eq!(ps.len(), 2);
/// ```
#[macro_export]
macro_rules! params {
    [] => {
        &[] as &[(&str, $crate::models::Param)]
    };
    [$($name:expr => $value:expr),+ $(,)?] => {
        &[$(($name, $crate::models::Param::from($value))),+]
    };
}
