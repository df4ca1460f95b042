//! sqlx-backed driver handle.
//!
//! Wraps a single `AnyConnection`, sqlx's uniform driver API, so the same
//! handle type serves PostgreSQL, MySQL and SQLite targets.

use super::driver::{quote_literal, DriverHandle, PreparedStatement, QuoteStyle, WriteSummary};
use super::types::{ResultHandle, Row, Value};
use crate::error::{DatasourceError, Result};
use async_trait::async_trait;
use sqlx::any::{AnyArguments, AnyConnectOptions, AnyQueryResult, AnyRow, AnyStatement};
use sqlx::query::Query;
use sqlx::{
    Any, AnyConnection, Column, ConnectOptions, Connection, Executor, Row as SqlxRow, Statement,
};
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use url::Url;

type SharedConnection = Arc<Mutex<Option<AnyConnection>>>;
type SharedInsertId = Arc<std::sync::Mutex<Option<i64>>>;

/// A live sqlx session.
pub struct SqlxHandle {
    conn: SharedConnection,
    backend: String,
    quote_style: QuoteStyle,
    last_insert_id: SharedInsertId,
}

impl SqlxHandle {
    /// Opens a session to `url`.
    ///
    /// `target_name` is a password-free rendering of the target used in
    /// error messages.
    pub async fn connect(url: &str, target_name: &str) -> Result<Self> {
        install_drivers();

        let options = AnyConnectOptions::from_str(url).map_err(|e| {
            DatasourceError::connection(format!("Invalid target {target_name}: {e}"))
        })?;

        let conn = options
            .connect()
            .await
            .map_err(|e| map_connection_error(e, target_name))?;

        let backend = conn.backend_name().to_string();
        debug!("Opened {} session to {}", backend, target_name);

        Ok(Self {
            quote_style: quote_style_for(&backend),
            backend,
            conn: Arc::new(Mutex::new(Some(conn))),
            last_insert_id: Arc::new(std::sync::Mutex::new(None)),
        })
    }

    fn remember_insert_id(&self, id: Option<i64>) {
        remember_insert_id(&self.last_insert_id, id);
    }
}

/// Registers the compiled-in sqlx drivers with the `Any` layer.
///
/// Safe to call repeatedly.
pub fn install_drivers() {
    sqlx::any::install_default_drivers();
}

/// Builds a read-write-create sqlx URL for a SQLite file.
///
/// Path segments are percent-encoded so `%`, `?` and `#` in directory or
/// file names survive sqlx's URL parsing.
pub(crate) fn sqlite_file_url(path: &Path) -> Result<String> {
    let absolute = std::path::absolute(path).map_err(|e| {
        DatasourceError::config(format!("Invalid database path {}: {e}", path.display()))
    })?;
    let file_url = Url::from_file_path(&absolute).map_err(|_| {
        DatasourceError::config(format!("Invalid database path {}", absolute.display()))
    })?;
    Ok(format!("sqlite://{}?mode=rwc", file_url.path()))
}

/// Returns true if a session to `url` can be opened through the `Any` layer.
///
/// The probe session is closed immediately.
pub async fn probe_driver(url: &str) -> bool {
    install_drivers();
    let Ok(options) = AnyConnectOptions::from_str(url) else {
        return false;
    };
    match options.connect().await {
        Ok(conn) => {
            let _ = conn.close().await;
            true
        }
        Err(e) => {
            debug!("Driver probe for {} failed: {}", url, e);
            false
        }
    }
}

#[async_trait]
impl DriverHandle for SqlxHandle {
    fn backend_name(&self) -> &str {
        &self.backend
    }

    async fn prepare(&self, sql: &str) -> Result<Box<dyn PreparedStatement>> {
        let mut guard = self.conn.lock().await;
        let conn = open_session(&mut guard)?;

        let prepared = conn
            .prepare(sql)
            .await
            .map_err(|e| map_driver_error(e, DatasourceError::prepare))?;
        let statement = Statement::to_owned(&prepared);

        Ok(Box::new(SqlxStatement {
            sql: sql.to_string(),
            statement,
            conn: Arc::clone(&self.conn),
            last_insert_id: Arc::clone(&self.last_insert_id),
        }))
    }

    async fn query(&self, sql: &str) -> Result<ResultHandle> {
        let mut guard = self.conn.lock().await;
        let conn = open_session(&mut guard)?;

        let rows: Vec<AnyRow> = conn
            .fetch_all(sql)
            .await
            .map_err(|e| map_driver_error(e, DatasourceError::execution))?;

        let columns = rows
            .first()
            .map(|row| {
                row.columns()
                    .iter()
                    .map(|col| col.name().to_string())
                    .collect()
            })
            .unwrap_or_default();

        Ok(ResultHandle::new(columns, rows.iter().map(convert_row).collect()))
    }

    async fn execute(&self, sql: &str) -> Result<WriteSummary> {
        let mut guard = self.conn.lock().await;
        let conn = open_session(&mut guard)?;

        let result: AnyQueryResult = conn
            .execute(sql)
            .await
            .map_err(|e| map_driver_error(e, DatasourceError::execution))?;

        let summary = summarize(&result);
        self.remember_insert_id(summary.last_insert_id);
        Ok(summary)
    }

    async fn last_insert_id(&self) -> Result<Option<i64>> {
        let remembered = *self
            .last_insert_id
            .lock()
            .map_err(|_| DatasourceError::internal("insert id lock poisoned"))?;

        if remembered.is_some() {
            return Ok(remembered);
        }

        // PostgreSQL and SQLite do not report generated keys through `Any`;
        // ask the session instead.
        let sql = match self.backend.as_str() {
            "PostgreSQL" => "SELECT lastval()",
            "SQLite" => "SELECT last_insert_rowid()",
            _ => return Ok(None),
        };

        let mut guard = self.conn.lock().await;
        let conn = open_session(&mut guard)?;
        match conn.fetch_optional(sql).await {
            Ok(Some(row)) => Ok(row
                .try_get::<Option<i64>, _>(0)
                .ok()
                .flatten()
                .filter(|id| *id > 0)),
            Ok(None) => Ok(None),
            Err(e) => match map_driver_error(e, DatasourceError::execution) {
                lost @ DatasourceError::Connection(_) => Err(lost),
                other => {
                    debug!("{} unavailable: {}", sql, other);
                    Ok(None)
                }
            },
        }
    }

    async fn sequence_value(&self, sequence: &str) -> Result<Option<i64>> {
        let sql = format!(
            "SELECT currval({})",
            quote_literal(sequence, self.quote_style)
        );

        let mut guard = self.conn.lock().await;
        let conn = open_session(&mut guard)?;

        match conn.fetch_optional(sql.as_str()).await {
            Ok(Some(row)) => Ok(row.try_get::<Option<i64>, _>(0).ok().flatten()),
            Ok(None) => Ok(None),
            Err(e) => match map_driver_error(e, DatasourceError::execution) {
                lost @ DatasourceError::Connection(_) => Err(lost),
                other => {
                    debug!("Sequence {} has no value: {}", sequence, other);
                    Ok(None)
                }
            },
        }
    }

    fn quote(&self, value: &str) -> String {
        quote_literal(value, self.quote_style)
    }

    async fn close(&self) {
        let mut guard = self.conn.lock().await;
        if let Some(conn) = guard.take() {
            if let Err(e) = conn.close().await {
                warn!("Error while closing {} session: {}", self.backend, e);
            }
        }
    }
}

/// A statement compiled on a `SqlxHandle`'s session.
struct SqlxStatement {
    sql: String,
    statement: AnyStatement<'static>,
    conn: SharedConnection,
    last_insert_id: SharedInsertId,
}

#[async_trait]
impl PreparedStatement for SqlxStatement {
    fn sql(&self) -> &str {
        &self.sql
    }

    async fn query(&self, params: &[Value]) -> Result<ResultHandle> {
        let mut guard = self.conn.lock().await;
        let conn = open_session(&mut guard)?;

        let query = params
            .iter()
            .fold(self.statement.query(), |query, value| bind_value(query, value));

        let rows = query
            .fetch_all(conn)
            .await
            .map_err(|e| map_driver_error(e, DatasourceError::execution))?;

        let columns = self
            .statement
            .columns()
            .iter()
            .map(|col| col.name().to_string())
            .collect();

        Ok(ResultHandle::new(columns, rows.iter().map(convert_row).collect()))
    }

    async fn execute(&self, params: &[Value]) -> Result<WriteSummary> {
        let mut guard = self.conn.lock().await;
        let conn = open_session(&mut guard)?;

        let query = params
            .iter()
            .fold(self.statement.query(), |query, value| bind_value(query, value));

        let result = query
            .execute(conn)
            .await
            .map_err(|e| map_driver_error(e, DatasourceError::execution))?;

        let summary = summarize(&result);
        remember_insert_id(&self.last_insert_id, summary.last_insert_id);
        Ok(summary)
    }
}

fn open_session(guard: &mut Option<AnyConnection>) -> Result<&mut AnyConnection> {
    guard
        .as_mut()
        .ok_or_else(|| DatasourceError::connection("Session has been closed"))
}

fn remember_insert_id(slot: &SharedInsertId, id: Option<i64>) {
    if id.is_none() {
        return;
    }
    match slot.lock() {
        Ok(mut last) => *last = id,
        Err(_) => warn!("Insert id lock poisoned; dropping generated key"),
    }
}

fn summarize(result: &AnyQueryResult) -> WriteSummary {
    WriteSummary {
        rows_affected: result.rows_affected(),
        last_insert_id: result.last_insert_id(),
    }
}

fn quote_style_for(backend: &str) -> QuoteStyle {
    match backend.to_lowercase().as_str() {
        "mysql" => QuoteStyle::Backslash,
        "sqlite" => QuoteStyle::Concat,
        _ => QuoteStyle::Standard,
    }
}

fn bind_value<'q>(
    query: Query<'q, Any, AnyArguments<'q>>,
    value: &Value,
) -> Query<'q, Any, AnyArguments<'q>> {
    match value {
        Value::Null => query.bind(None::<String>),
        Value::Bool(b) => query.bind(*b),
        Value::Int(i) => query.bind(*i),
        Value::Float(f) => query.bind(*f),
        Value::String(s) => query.bind(s.clone()),
        Value::Bytes(b) => query.bind(b.clone()),
    }
}

/// Converts a sqlx AnyRow to our Row type.
fn convert_row(row: &AnyRow) -> Row {
    (0..row.columns().len())
        .map(|index| convert_value(row, index))
        .collect()
}

/// Converts a single column value.
///
/// The `Any` layer only exposes a handful of value kinds, so decoding is
/// attempted from the narrowest kind outward.
fn convert_value(row: &AnyRow, index: usize) -> Value {
    if let Ok(v) = row.try_get::<Option<i64>, _>(index) {
        return v.map(Value::Int).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<f64>, _>(index) {
        return v.map(Value::Float).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<String>, _>(index) {
        return v.map(Value::String).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<bool>, _>(index) {
        return v.map(Value::Bool).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<Vec<u8>>, _>(index) {
        return v.map(Value::Bytes).unwrap_or(Value::Null);
    }
    Value::Null
}

/// Maps a driver error, keeping session-level failures as connection
/// errors so callers can drop the handle.
fn map_driver_error(error: sqlx::Error, kind: fn(String) -> DatasourceError) -> DatasourceError {
    match error {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::Protocol(_)
        | sqlx::Error::PoolClosed
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::WorkerCrashed => DatasourceError::connection(error.to_string()),
        other => kind(format_query_error(other)),
    }
}

/// Formats a statement error, including the engine's error code when present.
fn format_query_error(error: sqlx::Error) -> String {
    match error.as_database_error() {
        Some(db_error) => match db_error.code() {
            Some(code) => format!("{} (code {})", db_error.message(), code),
            None => db_error.message().to_string(),
        },
        None => error.to_string(),
    }
}

/// Maps sqlx connection errors to user-friendly messages.
fn map_connection_error(error: sqlx::Error, target_name: &str) -> DatasourceError {
    let error_str = error.to_string().to_lowercase();

    if error_str.contains("connection refused") || error_str.contains("could not connect") {
        DatasourceError::connection(format!(
            "Cannot connect to {target_name}. Check that the server is running."
        ))
    } else if error_str.contains("password authentication failed")
        || error_str.contains("authentication failed")
        || error_str.contains("access denied")
    {
        DatasourceError::connection(format!(
            "Authentication failed for {target_name}. Check your credentials."
        ))
    } else if error_str.contains("unable to open database file") {
        DatasourceError::connection(format!("Cannot open database file {target_name}."))
    } else if error_str.contains("timed out") || error_str.contains("timeout") {
        DatasourceError::connection(format!(
            "Connection to {target_name} timed out. The server may be overloaded or unreachable."
        ))
    } else {
        DatasourceError::connection(format!("{target_name}: {error}"))
    }
}
