//! Mock driver for testing.
//!
//! Provides an in-memory driver handle with scripted results, plus a
//! strategy that hands out such handles, so the execution core can be
//! exercised without a database server.

use super::driver::{quote_literal, DriverHandle, PreparedStatement, QuoteStyle, WriteSummary};
use super::registry::Fingerprint;
use super::strategy::{ConnectionStrategy, FingerprintPolicy, Target};
use super::types::{ConnectParams, ResultHandle, Row, Value};
use crate::error::{DatasourceError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Canned behavior for mock handles.
#[derive(Debug, Clone)]
pub struct MockScript {
    columns: Vec<String>,
    rows: Vec<Row>,
    write_rows: u64,
    sequences: HashMap<String, i64>,
    reject_prepare: Option<String>,
}

impl Default for MockScript {
    fn default() -> Self {
        Self {
            columns: vec!["result".to_string()],
            rows: vec![vec![Value::Int(1)]],
            write_rows: 1,
            sequences: HashMap::new(),
            reject_prepare: None,
        }
    }
}

impl MockScript {
    /// Rows returned by every read.
    pub fn rows(mut self, columns: &[&str], rows: Vec<Row>) -> Self {
        self.columns = columns.iter().map(|c| c.to_string()).collect();
        self.rows = rows;
        self
    }

    /// Rows reported as affected by every write.
    pub fn write_rows(mut self, n: u64) -> Self {
        self.write_rows = n;
        self
    }

    /// Gives a sequence a current value.
    pub fn sequence(mut self, name: &str, value: i64) -> Self {
        self.sequences.insert(name.to_string(), value);
        self
    }

    /// Makes `prepare` fail for SQL starting with `prefix`.
    pub fn reject_prepare(mut self, prefix: &str) -> Self {
        self.reject_prepare = Some(prefix.to_string());
        self
    }
}

#[derive(Default)]
struct MockState {
    executed: Vec<String>,
    probed_sequences: Vec<String>,
    last_insert_id: Option<i64>,
    next_id: i64,
}

struct MockShared {
    script: MockScript,
    state: Mutex<MockState>,
    prepares: AtomicUsize,
    lost: AtomicBool,
    closed: AtomicBool,
}

impl MockShared {
    fn state(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn check_session(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(DatasourceError::connection("mock session closed"));
        }
        if self.lost.load(Ordering::SeqCst) {
            return Err(DatasourceError::connection("mock connection lost"));
        }
        Ok(())
    }

    fn read(&self, sql: &str) -> Result<ResultHandle> {
        self.check_session()?;
        self.state().executed.push(sql.to_string());
        Ok(ResultHandle::new(
            self.script.columns.clone(),
            self.script.rows.clone(),
        ))
    }

    fn write(&self, sql: &str) -> Result<WriteSummary> {
        self.check_session()?;
        let mut state = self.state();
        state.executed.push(sql.to_string());

        let last_insert_id = if sql.trim_start().to_uppercase().starts_with("INSERT") {
            state.next_id += 1;
            state.last_insert_id = Some(state.next_id);
            state.last_insert_id
        } else {
            None
        };

        Ok(WriteSummary {
            rows_affected: self.script.write_rows,
            last_insert_id,
        })
    }
}

/// An in-memory driver handle.
pub struct MockDriver {
    backend: String,
    shared: Arc<MockShared>,
}

impl MockDriver {
    /// Creates a mock handle with the default script.
    pub fn new(backend: &str) -> Self {
        Self::with_script(backend, MockScript::default())
    }

    /// Creates a mock handle with the given script.
    pub fn with_script(backend: &str, script: MockScript) -> Self {
        Self {
            backend: backend.to_string(),
            shared: Arc::new(MockShared {
                script,
                state: Mutex::new(MockState::default()),
                prepares: AtomicUsize::new(0),
                lost: AtomicBool::new(false),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Number of statements compiled on this handle.
    pub fn prepare_count(&self) -> usize {
        self.shared.prepares.load(Ordering::SeqCst)
    }

    /// SQL executed so far, in order.
    pub fn executed(&self) -> Vec<String> {
        self.shared.state().executed.clone()
    }

    /// Sequence names looked up so far, in order.
    pub fn probed_sequences(&self) -> Vec<String> {
        self.shared.state().probed_sequences.clone()
    }

    /// Makes every following operation fail as a lost connection.
    pub fn lose_connection(&self) {
        self.shared.lost.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DriverHandle for MockDriver {
    fn backend_name(&self) -> &str {
        &self.backend
    }

    async fn prepare(&self, sql: &str) -> Result<Box<dyn PreparedStatement>> {
        self.shared.check_session()?;
        if let Some(prefix) = &self.shared.script.reject_prepare {
            if sql.starts_with(prefix.as_str()) {
                return Err(DatasourceError::prepare(format!("syntax error near {prefix}")));
            }
        }
        self.shared.prepares.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockStatement {
            sql: sql.to_string(),
            shared: Arc::clone(&self.shared),
        }))
    }

    async fn query(&self, sql: &str) -> Result<ResultHandle> {
        self.shared.read(sql)
    }

    async fn execute(&self, sql: &str) -> Result<WriteSummary> {
        self.shared.write(sql)
    }

    async fn last_insert_id(&self) -> Result<Option<i64>> {
        self.shared.check_session()?;
        Ok(self.shared.state().last_insert_id)
    }

    async fn sequence_value(&self, sequence: &str) -> Result<Option<i64>> {
        self.shared.check_session()?;
        self.shared
            .state()
            .probed_sequences
            .push(sequence.to_string());
        Ok(self.shared.script.sequences.get(sequence).copied())
    }

    fn quote(&self, value: &str) -> String {
        quote_literal(value, QuoteStyle::Standard)
    }

    async fn close(&self) {
        self.shared.closed.store(true, Ordering::SeqCst);
    }
}

struct MockStatement {
    sql: String,
    shared: Arc<MockShared>,
}

#[async_trait]
impl PreparedStatement for MockStatement {
    fn sql(&self) -> &str {
        &self.sql
    }

    async fn query(&self, _params: &[Value]) -> Result<ResultHandle> {
        self.shared.read(&self.sql)
    }

    async fn execute(&self, _params: &[Value]) -> Result<WriteSummary> {
        self.shared.write(&self.sql)
    }
}

/// A strategy that opens `MockDriver` handles.
pub struct MockStrategy {
    script: MockScript,
    policy: FingerprintPolicy,
    fold_case: bool,
    refusing: AtomicBool,
    drivers: Mutex<Vec<Arc<MockDriver>>>,
}

impl MockStrategy {
    /// A strategy with stable fingerprints, no case folding and the
    /// default script.
    pub fn new() -> Self {
        Self {
            script: MockScript::default(),
            policy: FingerprintPolicy::Stable,
            fold_case: false,
            refusing: AtomicBool::new(false),
            drivers: Mutex::new(Vec::new()),
        }
    }

    pub fn with_script(mut self, script: MockScript) -> Self {
        self.script = script;
        self
    }

    /// Use salted fingerprints.
    pub fn salted(mut self) -> Self {
        self.policy = FingerprintPolicy::Salted;
        self
    }

    pub fn case_folding(mut self, fold: bool) -> Self {
        self.fold_case = fold;
        self
    }

    /// Fail every handle creation.
    pub fn refusing(self) -> Self {
        self.set_refusing(true);
        self
    }

    pub fn set_refusing(&self, refusing: bool) {
        self.refusing.store(refusing, Ordering::SeqCst);
    }

    /// Number of handles opened so far.
    pub fn opened(&self) -> usize {
        self.drivers.lock().map(|d| d.len()).unwrap_or(0)
    }

    /// The most recently opened handle.
    pub fn last_driver(&self) -> Option<Arc<MockDriver>> {
        self.drivers.lock().ok().and_then(|d| d.last().cloned())
    }
}

impl Default for MockStrategy {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConnectionStrategy for MockStrategy {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn fingerprint(&self, params: &ConnectParams) -> Fingerprint {
        self.policy.fingerprint(params)
    }

    fn resolve_target(&self, params: &ConnectParams) -> Result<Target> {
        Ok(Target {
            url: format!("mock://{}", params.database),
            display: format!("mock://{}", params.database),
        })
    }

    async fn make_handle(&self, target: &Target) -> Result<Arc<dyn DriverHandle>> {
        if self.refusing.load(Ordering::SeqCst) {
            return Err(DatasourceError::connection(format!(
                "{target} refused the connection"
            )));
        }

        let driver = Arc::new(MockDriver::with_script("Mock", self.script.clone()));
        self.drivers
            .lock()
            .map_err(|_| DatasourceError::internal("mock driver list poisoned"))?
            .push(Arc::clone(&driver));
        Ok(driver)
    }

    fn folds_case(&self, _params: &ConnectParams) -> bool {
        self.fold_case
    }
}
