//! Value, row and result types shared by every backend.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;

/// Parameters accepted by `connect`.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ConnectParams {
    /// Backend address. A URL for the generic backend, informational for
    /// the embedded one.
    pub host: String,

    /// Database user.
    pub user: String,

    /// Database password.
    pub password: String,

    /// Database name, or a file path/bare name for the embedded backend.
    pub database: String,
}

impl ConnectParams {
    /// Creates connect parameters from their four parts.
    pub fn new(
        host: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
        database: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            user: user.into(),
            password: password.into(),
            database: database.into(),
        }
    }
}

impl fmt::Debug for ConnectParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectParams")
            .field("host", &self.host)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("database", &self.database)
            .finish()
    }
}

/// Represents a single value bound to, or read from, a statement.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Value {
    /// NULL value.
    #[default]
    Null,

    /// Boolean value.
    Bool(bool),

    /// Signed integer (up to i64).
    Int(i64),

    /// Floating point number.
    Float(f64),

    /// Text/string value.
    String(String),

    /// Binary data.
    Bytes(Vec<u8>),
}

impl Value {
    /// Returns true if this value is NULL.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns the integer payload, if any.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Returns the text payload, if any.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Attempts to convert the value to a string representation.
    pub fn to_display_string(&self) -> String {
        match self {
            Value::Null => "NULL".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::String(s) => s.clone(),
            Value::Bytes(b) => format!("<{} bytes>", b.len()),
        }
    }

    /// Parses a command-line literal into the narrowest matching value.
    ///
    /// `NULL` (any case) is Null, integers and floats are numeric, anything
    /// else is text.
    pub fn parse_literal(s: &str) -> Self {
        if s.eq_ignore_ascii_case("null") {
            Value::Null
        } else if let Ok(i) = s.parse::<i64>() {
            Value::Int(i)
        } else if let Ok(f) = s.parse::<f64>() {
            Value::Float(f)
        } else {
            Value::String(s.to_string())
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_display_string())
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl<T> From<Option<T>> for Value
where
    T: Into<Value>,
{
    fn from(v: Option<T>) -> Self {
        match v {
            Some(val) => val.into(),
            None => Value::Null,
        }
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

/// A positional row as produced by a driver.
pub type Row = Vec<Value>;

/// One fetched row as ordered field-name/value pairs.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Record {
    fields: Vec<(String, Value)>,
}

impl Record {
    /// Creates a record from ordered field/value pairs.
    pub fn new(fields: Vec<(String, Value)>) -> Self {
        Self { fields }
    }

    /// Looks up a value by exact field name.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, value)| value)
    }

    /// Field names in column order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(name, _)| name.as_str())
    }

    /// Iterates over field/value pairs in column order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Rewrites every field name to upper case. Values are untouched.
    pub fn into_uppercase_fields(self) -> Self {
        Self {
            fields: self
                .fields
                .into_iter()
                .map(|(name, value)| (name.to_uppercase(), value))
                .collect(),
        }
    }

    /// Converts the record to a JSON object, preserving column order.
    pub fn to_json(&self) -> serde_json::Value {
        let mut map = serde_json::Map::with_capacity(self.fields.len());
        for (name, value) in &self.fields {
            let json = serde_json::to_value(value).unwrap_or(serde_json::Value::Null);
            map.insert(name.clone(), json);
        }
        serde_json::Value::Object(map)
    }
}

/// Cursor over the rows of one read.
///
/// Rows are handed out front to back by `fetch_array`; once the last row
/// is taken the handle stays exhausted.
#[derive(Debug, Clone, Default)]
pub struct ResultHandle {
    columns: Vec<String>,
    rows: VecDeque<Row>,
}

impl ResultHandle {
    /// Creates a result handle with the given column names and rows.
    pub fn new(columns: Vec<String>, rows: Vec<Row>) -> Self {
        Self {
            columns,
            rows: rows.into(),
        }
    }

    /// Column names as reported by the driver.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Number of rows not yet fetched.
    pub fn remaining(&self) -> usize {
        self.rows.len()
    }

    /// Returns true once every row has been fetched.
    pub fn is_exhausted(&self) -> bool {
        self.rows.is_empty()
    }

    /// Takes the next row, pairing values with column names.
    ///
    /// Values past the end of the column list are kept and named
    /// `col_<index>`.
    pub(crate) fn next_record(&mut self) -> Option<Record> {
        let row = self.rows.pop_front()?;
        let fields = row
            .into_iter()
            .enumerate()
            .map(|(idx, value)| {
                let name = self
                    .columns
                    .get(idx)
                    .cloned()
                    .unwrap_or_else(|| format!("col_{idx}"));
                (name, value)
            })
            .collect();
        Some(Record::new(fields))
    }
}

/// What a successful `exec` produced.
#[derive(Debug, Clone)]
pub enum ExecOutcome {
    /// A read: the rows to fetch.
    Rows(ResultHandle),

    /// A write: for parameterized statements the affected row count; for
    /// plain statements the affected row count plus one, so that touching
    /// zero rows still reads as a non-zero success.
    Count(u64),
}

impl ExecOutcome {
    /// Returns the result handle of a read.
    pub fn into_rows(self) -> Option<ResultHandle> {
        match self {
            Self::Rows(rows) => Some(rows),
            Self::Count(_) => None,
        }
    }

    /// Returns the count of a write.
    pub fn count(&self) -> Option<u64> {
        match self {
            Self::Rows(_) => None,
            Self::Count(n) => Some(*n),
        }
    }
}

/// Read or write, decided from the leading keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    Read,
    Write,
}

impl StatementKind {
    /// Classifies a statement: `SELECT`-prefixed text (case-insensitive,
    /// leading whitespace ignored) is a read, everything else a write.
    pub fn classify(sql: &str) -> Self {
        let trimmed = sql.trim_start();
        let is_select = trimmed
            .get(..6)
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case("select"));
        if is_select {
            Self::Read
        } else {
            Self::Write
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_value_display() {
        assert_eq!(Value::Null.to_display_string(), "NULL");
        assert_eq!(Value::Bool(true).to_display_string(), "true");
        assert_eq!(Value::Int(42).to_display_string(), "42");
        assert_eq!(Value::Float(2.71).to_display_string(), "2.71");
        assert_eq!(
            Value::String("hello".to_string()).to_display_string(),
            "hello"
        );
        assert_eq!(Value::Bytes(vec![1, 2, 3]).to_display_string(), "<3 bytes>");
    }

    #[test]
    fn test_value_from_conversions() {
        assert_eq!(Value::from(true), Value::Bool(true));
        assert_eq!(Value::from(42i32), Value::Int(42));
        assert_eq!(Value::from("hello"), Value::String("hello".to_string()));
        assert_eq!(Value::from(None::<i32>), Value::Null);
        assert_eq!(Value::from(Some(42i64)), Value::Int(42));
    }

    #[test]
    fn test_parse_literal() {
        assert_eq!(Value::parse_literal("NULL"), Value::Null);
        assert_eq!(Value::parse_literal("17"), Value::Int(17));
        assert_eq!(Value::parse_literal("1.5"), Value::Float(1.5));
        assert_eq!(
            Value::parse_literal("http://example.com"),
            Value::String("http://example.com".to_string())
        );
    }

    #[test]
    fn test_classify_statement() {
        assert_eq!(StatementKind::classify("SELECT 1"), StatementKind::Read);
        assert_eq!(StatementKind::classify("  \n\tselect * from t"), StatementKind::Read);
        assert_eq!(StatementKind::classify("SeLeCt 1"), StatementKind::Read);
        assert_eq!(StatementKind::classify("INSERT INTO t VALUES (1)"), StatementKind::Write);
        assert_eq!(
            StatementKind::classify("WITH x AS (SELECT 1) SELECT * FROM x"),
            StatementKind::Write
        );
        assert_eq!(StatementKind::classify("SEL"), StatementKind::Write);
        assert_eq!(StatementKind::classify(""), StatementKind::Write);
    }

    #[test]
    fn test_result_handle_is_consumed_in_order() {
        let mut handle = ResultHandle::new(
            vec!["id".to_string(), "url".to_string()],
            vec![
                vec![Value::Int(1), Value::from("a")],
                vec![Value::Int(2), Value::from("b")],
            ],
        );

        let first = handle.next_record().unwrap();
        assert_eq!(first.get("id"), Some(&Value::Int(1)));
        assert_eq!(handle.remaining(), 1);

        let second = handle.next_record().unwrap();
        assert_eq!(second.get("url"), Some(&Value::from("b")));
        assert!(handle.next_record().is_none());
        assert!(handle.is_exhausted());
    }

    #[test]
    fn test_extra_values_get_positional_names() {
        let mut handle = ResultHandle::new(
            vec!["id".to_string()],
            vec![vec![Value::Int(1), Value::from("a")]],
        );

        let record = handle.next_record().unwrap();
        assert_eq!(record.len(), 2);
        assert_eq!(record.get("col_1"), Some(&Value::from("a")));
    }

    #[test]
    fn test_record_uppercase_keeps_values() {
        let record = Record::new(vec![
            ("url".to_string(), Value::from("http://example.com")),
            ("Hits".to_string(), Value::Int(3)),
        ]);
        let folded = record.clone().into_uppercase_fields();

        assert_eq!(folded.field_names().collect::<Vec<_>>(), vec!["URL", "HITS"]);
        let original_values: Vec<_> = record.iter().map(|(_, v)| v.clone()).collect();
        let folded_values: Vec<_> = folded.iter().map(|(_, v)| v.clone()).collect();
        assert_eq!(original_values, folded_values);
    }

    #[test]
    fn test_record_to_json() {
        let record = Record::new(vec![
            ("url".to_string(), Value::from("http://example.com")),
            ("hits".to_string(), Value::Null),
        ]);
        assert_eq!(
            record.to_json(),
            serde_json::json!({"url": "http://example.com", "hits": null})
        );
    }

    #[test]
    fn test_connect_params_debug_hides_password() {
        let params = ConnectParams::new("sqlite:", "crawler", "hunter2", "crawl_index");
        let debug = format!("{params:?}");
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("crawl_index"));
    }
}
