//! Driver handle abstraction.
//!
//! The execution core never talks to a database library directly. It goes
//! through a `DriverHandle` (one live session) and the `PreparedStatement`s
//! that handle produces, so the same caching and normalization rules apply
//! to every engine.

use super::types::{ResultHandle, Value};
use crate::error::Result;
use async_trait::async_trait;

/// Rows touched by a write, plus the key the engine generated, if any.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteSummary {
    pub rows_affected: u64,
    pub last_insert_id: Option<i64>,
}

/// SQL literal quoting rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QuoteStyle {
    /// ANSI: single quotes doubled, everything else literal.
    #[default]
    Standard,
    /// MySQL: backslash escapes for quotes, backslashes and control bytes.
    Backslash,
    /// SQLite: like `Standard`, but NUL is spliced in with `char(0)` since
    /// statement text ends at the first NUL.
    Concat,
}

/// A live session with a database engine.
#[async_trait]
pub trait DriverHandle: Send + Sync {
    /// Engine name as reported by the driver (e.g. "SQLite", "PostgreSQL").
    fn backend_name(&self) -> &str;

    /// Compiles `sql` into a reusable statement.
    async fn prepare(&self, sql: &str) -> Result<Box<dyn PreparedStatement>>;

    /// Runs a read without parameters.
    async fn query(&self, sql: &str) -> Result<ResultHandle>;

    /// Runs a write without parameters.
    async fn execute(&self, sql: &str) -> Result<WriteSummary>;

    /// Key generated by the most recent insert on this session.
    async fn last_insert_id(&self) -> Result<Option<i64>>;

    /// Current value of a named sequence; `None` if it has no value or does
    /// not exist.
    async fn sequence_value(&self, sequence: &str) -> Result<Option<i64>>;

    /// Returns `value` as a complete SQL string literal, quotes included.
    fn quote(&self, value: &str) -> String;

    /// Closes the session.
    async fn close(&self);
}

/// A statement compiled once and executed with different bind values.
#[async_trait]
pub trait PreparedStatement: Send + Sync {
    /// The SQL text this statement was compiled from.
    fn sql(&self) -> &str;

    /// Executes as a read.
    async fn query(&self, params: &[Value]) -> Result<ResultHandle>;

    /// Executes as a write.
    async fn execute(&self, params: &[Value]) -> Result<WriteSummary>;
}

/// Quotes `value` as a SQL string literal using the given style.
pub fn quote_literal(value: &str, style: QuoteStyle) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('\'');
    match style {
        QuoteStyle::Standard | QuoteStyle::Concat => {
            for ch in value.chars() {
                match ch {
                    '\'' => quoted.push_str("''"),
                    '\0' if style == QuoteStyle::Concat => quoted.push_str("'||char(0)||'"),
                    _ => quoted.push(ch),
                }
            }
        }
        QuoteStyle::Backslash => {
            for ch in value.chars() {
                match ch {
                    '\0' => quoted.push_str("\\0"),
                    '\n' => quoted.push_str("\\n"),
                    '\r' => quoted.push_str("\\r"),
                    '\x1a' => quoted.push_str("\\Z"),
                    '\'' | '"' | '\\' => {
                        quoted.push('\\');
                        quoted.push(ch);
                    }
                    _ => quoted.push(ch),
                }
            }
        }
    }
    quoted.push('\'');
    quoted
}

/// Removes exactly one leading and one trailing character.
///
/// Used on the output of `quote`, whose first and last characters are the
/// driver's own quote marks; callers of `escape_string` add their own.
pub fn strip_outer_quotes(quoted: &str) -> String {
    let mut chars = quoted.chars();
    chars.next();
    chars.next_back();
    chars.as_str().to_string()
}
