//! Query template engines.
//!
//! Engines render executable query text for a specific store dialect:
//! they substitute named parameters into templates, escape string
//! values, and prepare freshly acquired connections with any dialect
//! setup the store needs. The coordinator calls `prepare_connection`
//! once per acquired connection; `build_query` runs once per statement
//! and keeps no state between calls.

use crate::db::connection::RawConnection;
use crate::error::{DbError, DbResult};
use crate::models::Param;
use tracing::trace;

/// Dialect-specific query building and connection preparation.
pub trait Engine: Send + Sync {
    /// Run any dialect setup the store requires on a fresh connection,
    /// before the first query executes on it.
    fn prepare_connection(&self, conn: &mut dyn RawConnection) -> DbResult<()>;

    /// Substitute the named parameters into the template, producing an
    /// executable query string.
    fn build_query(&self, template: &str, params: &[(&str, Param)]) -> DbResult<String>;

    /// Alter a value so it can be interpolated as a string literal
    /// without breaking the query or enabling injection.
    fn escape(&self, value: &str) -> String;

    /// Tag identifying which dialect-specific query resources a caller
    /// should load. Stable per engine implementation.
    fn variant(&self) -> &str;
}

/// Characters that terminate a `:name` parameter reference.
const PARAM_ENDS: &[char] = &[' ', ',', '\r', '\n', '(', ')', '"', '\'', '`', '=', '!'];

/// Substitute `:name` references with rendered parameter values.
///
/// A name runs from the `:` to the next terminator character or the end
/// of the template. Names may repeat; every occurrence gets the same
/// value. A referenced name with no supplied value is a template error.
fn substitute(template: &str, params: &[(&str, Param)]) -> DbResult<String> {
    let mut query = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find(':') {
        query.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let end = after
            .find(|c| PARAM_ENDS.contains(&c))
            .unwrap_or(after.len());
        let name = &after[..end];
        rest = &after[end..];

        let value = params
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| v)
            .ok_or_else(|| {
                DbError::template(format!(
                    "missing parameter `{name}' in template: {template}"
                ))
            })?;
        render(value, &mut query);
    }
    query.push_str(rest);

    trace!(query = %query, "built query");

    Ok(query)
}

/// Render one parameter value as query text.
///
/// Strings are quoted but taken verbatim; escaping their content is the
/// caller's job via `Engine::escape`.
fn render(value: &Param, out: &mut String) {
    match value {
        Param::Null => out.push_str("null"),
        Param::Bool(true) => out.push('1'),
        Param::Bool(false) => out.push('0'),
        Param::Int(v) => out.push_str(&v.to_string()),
        Param::Float(v) => out.push_str(&v.to_string()),
        Param::Str(s) => {
            out.push('\'');
            out.push_str(s);
            out.push('\'');
        }
        Param::Timestamp(t) => {
            out.push('\'');
            out.push_str(&t.format("%Y-%m-%d %H:%M:%S%.3f").to_string());
            out.push('\'');
        }
        Param::List(items) => {
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                render(item, out);
            }
        }
    }
}

/// Engine with no dialect of its own: no connection preparation, empty
/// variant tag, quote-doubling escape. Suitable for SQLite and other
/// ANSI-quoting stores.
#[derive(Debug, Default)]
pub struct GenericEngine;

impl Engine for GenericEngine {
    fn prepare_connection(&self, _conn: &mut dyn RawConnection) -> DbResult<()> {
        Ok(())
    }

    fn build_query(&self, template: &str, params: &[(&str, Param)]) -> DbResult<String> {
        substitute(template, params)
    }

    fn escape(&self, value: &str) -> String {
        value.replace('\'', "''")
    }

    fn variant(&self) -> &str {
        ""
    }
}

/// MySQL engine: pins every connection to UTC and escapes with
/// backslash sequences.
#[derive(Debug, Default)]
pub struct MysqlEngine;

impl Engine for MysqlEngine {
    fn prepare_connection(&self, conn: &mut dyn RawConnection) -> DbResult<()> {
        conn.execute_raw("set time_zone = '+00:00'")
    }

    fn build_query(&self, template: &str, params: &[(&str, Param)]) -> DbResult<String> {
        substitute(template, params)
    }

    fn escape(&self, value: &str) -> String {
        let mut out = String::with_capacity(value.len());
        for c in value.chars() {
            match c {
                '\\' => out.push_str("\\\\"),
                '\'' => out.push_str("\\'"),
                '"' => out.push_str("\\\""),
                '\0' => out.push_str("\\0"),
                '\n' => out.push_str("\\n"),
                '\r' => out.push_str("\\r"),
                '\t' => out.push_str("\\t"),
                '\u{8}' => out.push_str("\\b"),
                '\u{1a}' => out.push_str("\\Z"),
                c => out.push(c),
            }
        }
        out
    }

    fn variant(&self) -> &str {
        "mysql"
    }
}
