//! Backend-agnostic SQL execution layer.
//!
//! Callers talk to a `DatasourceManager`; concrete managers translate the
//! calls for a generic sqlx-reachable engine or for embedded SQLite files.
//! Handles are shared process-wide through a `ConnectionRegistry`.

mod driver;
mod embedded;
mod generic;
mod manager;
pub mod mock;
mod registry;
mod sqlx_driver;
mod strategy;
mod types;

pub use driver::{
    quote_literal, strip_outer_quotes, DriverHandle, PreparedStatement, QuoteStyle, WriteSummary,
};
pub use embedded::{EmbeddedFileManager, EmbeddedStrategy, DB_FILE_EXTENSION};
pub use generic::{GenericSqlManager, GenericStrategy};
pub use manager::{Clock, SqlManager, SEQUENCE_SUFFIX};
pub use mock::{MockDriver, MockScript, MockStrategy};
pub use registry::{ConnectionRegistry, Fingerprint};
pub use sqlx_driver::SqlxHandle;
pub use strategy::{ConnectionStrategy, FingerprintPolicy, Target};
pub use types::{ConnectParams, ExecOutcome, Record, ResultHandle, Row, StatementKind, Value};

use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// The uniform contract every backend implements.
///
/// Failures are logged by the manager and returned as errors; no operation
/// panics.
#[async_trait]
pub trait DatasourceManager: Send {
    /// Establishes a connection, or reuses the registered one with the same
    /// fingerprint.
    async fn connect(&mut self, params: &ConnectParams) -> Result<Arc<dyn DriverHandle>>;

    /// Releases this manager's reference to its handle. The registry keeps
    /// the session for reuse.
    fn disconnect(&mut self);

    /// Executes one statement. An empty `params` runs it unprepared.
    async fn exec(&mut self, sql: &str, params: &[Value]) -> Result<ExecOutcome>;

    /// Rows affected or returned by the most recent successful `exec`.
    fn affected_rows(&self) -> u64;

    /// Key generated by the most recent insert. `table_name` is only used by
    /// backends that name sequences after tables.
    async fn insert_id(&mut self, table_name: &str) -> Result<i64>;

    /// Next row of `result` as field/value pairs, or `None` at the end.
    fn fetch_array(&self, result: &mut ResultHandle) -> Option<Record>;

    /// `value` made safe to embed in a SQL string literal, without the
    /// surrounding quotes.
    fn escape_string(&self, value: &str) -> String;
}

/// Which manager to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseBackend {
    #[default]
    Generic,
    Embedded,
}

impl DatabaseBackend {
    /// Returns the backend as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Generic => "generic",
            Self::Embedded => "embedded",
        }
    }

    /// Parses a backend from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "generic" | "sql" => Some(Self::Generic),
            "embedded" | "file" => Some(Self::Embedded),
            _ => None,
        }
    }
}

/// Creates a manager for the given backend.
///
/// This is the central factory for callers that pick the backend at runtime.
pub async fn manager_for(
    backend: DatabaseBackend,
    config: &crate::config::DatasourceConfig,
    registry: Arc<ConnectionRegistry>,
) -> Box<dyn DatasourceManager> {
    match backend {
        DatabaseBackend::Generic => Box::new(GenericSqlManager::new(config, registry)),
        DatabaseBackend::Embedded => {
            Box::new(EmbeddedFileManager::new(config.data_dir.clone(), registry).await)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_parse() {
        assert_eq!(DatabaseBackend::parse("generic"), Some(DatabaseBackend::Generic));
        assert_eq!(DatabaseBackend::parse("EMBEDDED"), Some(DatabaseBackend::Embedded));
        assert_eq!(DatabaseBackend::parse("file"), Some(DatabaseBackend::Embedded));
        assert_eq!(DatabaseBackend::parse("oracle"), None);
    }

    #[test]
    fn test_backend_as_str_round_trips() {
        for backend in [DatabaseBackend::Generic, DatabaseBackend::Embedded] {
            assert_eq!(DatabaseBackend::parse(backend.as_str()), Some(backend));
        }
    }

    #[test]
    fn test_manager_is_object_safe() {
        fn assert_object_safe(_: Option<Box<dyn DatasourceManager>>) {}
        assert_object_safe(None);
    }
}
