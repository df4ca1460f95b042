//! Shared execution core.
//!
//! `SqlManager` implements the whole datasource contract on top of a
//! `ConnectionStrategy`: registry lookups, the one-shot stale reconnect,
//! the single-slot statement cache, error trapping, and field-name folding.
//! Backends differ only in the strategy they plug in.

use super::driver::{
    quote_literal, strip_outer_quotes, DriverHandle, PreparedStatement, QuoteStyle,
};
use super::registry::{ConnectionRegistry, Fingerprint};
use super::strategy::ConnectionStrategy;
use super::types::{ConnectParams, ExecOutcome, Record, ResultHandle, StatementKind, Value};
use super::DatasourceManager;
use crate::error::{DatasourceError, Result};
use async_trait::async_trait;
use std::sync::{Arc, Weak};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, error, info, warn};

/// Suffix appended to a table name to form its key sequence on
/// case-folding backends.
pub const SEQUENCE_SUFFIX: &str = "_ID_SEQ";

/// Wall-clock source in whole seconds.
pub type Clock = Arc<dyn Fn() -> u64 + Send + Sync>;

fn unix_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// A datasource manager parameterized by its connection strategy.
pub struct SqlManager<S> {
    strategy: S,
    registry: Arc<ConnectionRegistry>,
    handle: Option<Weak<dyn DriverHandle>>,
    fingerprint: Option<Fingerprint>,
    last_params: Option<ConnectParams>,
    connect_time: u64,
    statement: Option<Box<dyn PreparedStatement>>,
    affected_rows: u64,
    fold_case: bool,
    clock: Clock,
}

impl<S: ConnectionStrategy> SqlManager<S> {
    /// Creates a manager that opens handles through `strategy` and shares
    /// them via `registry`.
    pub fn with_strategy(strategy: S, registry: Arc<ConnectionRegistry>) -> Self {
        Self {
            strategy,
            registry,
            handle: None,
            fingerprint: None,
            last_params: None,
            connect_time: 0,
            statement: None,
            affected_rows: 0,
            fold_case: false,
            clock: Arc::new(unix_seconds),
        }
    }

    /// Replaces the wall clock used by the stale-handle check.
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn strategy(&self) -> &S {
        &self.strategy
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Whether fetched field names are upper-cased.
    pub fn folds_case(&self) -> bool {
        self.fold_case
    }

    /// Second at which the current handle was obtained.
    pub fn connect_time(&self) -> u64 {
        self.connect_time
    }

    /// Returns true while the manager holds a live handle.
    pub fn is_connected(&self) -> bool {
        self.live_handle().is_some()
    }

    /// SQL text of the cached prepared statement, if any.
    pub fn cached_sql(&self) -> Option<&str> {
        self.statement.as_ref().map(|stmt| stmt.sql())
    }

    fn live_handle(&self) -> Option<Arc<dyn DriverHandle>> {
        self.handle.as_ref().and_then(Weak::upgrade)
    }

    fn release_handle(&mut self) {
        self.handle = None;
        self.statement = None;
    }

    /// Returns the live handle, reconnecting once if it is gone and the
    /// clock has moved past the second it was obtained in.
    async fn ensure_handle(&mut self) -> Result<Arc<dyn DriverHandle>> {
        if let Some(handle) = self.live_handle() {
            return Ok(handle);
        }

        if let Some(reason) = self.strategy.unavailable_reason() {
            let err = DatasourceError::connection(reason.to_string());
            error!("{}: {}", err.category(), err);
            return Err(err);
        }

        if (self.clock)() != self.connect_time {
            if let Some(params) = self.last_params.clone() {
                if let Some(fingerprint) = &self.fingerprint {
                    self.registry.evict(fingerprint);
                }
                warn!(
                    "{} handle for '{}' is stale, reconnecting",
                    self.strategy.name(),
                    params.database
                );
                // Failures are logged by connect; the check below reports them.
                let _ = self.connect(&params).await;
            }
        }

        self.live_handle().ok_or_else(|| {
            let database = self
                .last_params
                .as_ref()
                .map(|p| p.database.as_str())
                .unwrap_or("<none>");
            let err = DatasourceError::not_connected(format!(
                "no live {} handle for '{}'",
                self.strategy.name(),
                database
            ));
            error!("{}: {}", err.category(), err);
            err
        })
    }

    async fn open_handle(&self, params: &ConnectParams) -> Result<Arc<dyn DriverHandle>> {
        let target = self.strategy.resolve_target(params)?;
        let handle = self.strategy.make_handle(&target).await?;
        info!("Connected {} handle to {}", self.strategy.name(), target);
        Ok(handle)
    }

    async fn exec_prepared(
        &mut self,
        handle: &Arc<dyn DriverHandle>,
        sql: &str,
        params: &[Value],
        kind: StatementKind,
    ) -> Result<ExecOutcome> {
        if self.cached_sql() != Some(sql) {
            // Drop the old statement before compiling the next one so an
            // embedded engine never sees two open at once.
            self.statement = None;
            self.statement = Some(handle.prepare(sql).await?);
            debug!("Prepared statement: {}", sql);
        }

        let statement = self
            .statement
            .as_ref()
            .ok_or_else(|| DatasourceError::internal("statement cache is empty after prepare"))?;

        match kind {
            StatementKind::Read => {
                let rows = statement.query(params).await?;
                self.affected_rows = rows.remaining() as u64;
                Ok(ExecOutcome::Rows(rows))
            }
            StatementKind::Write => {
                let summary = statement.execute(params).await?;
                self.affected_rows = summary.rows_affected;
                Ok(ExecOutcome::Count(summary.rows_affected))
            }
        }
    }

    async fn exec_plain(
        &mut self,
        handle: &Arc<dyn DriverHandle>,
        sql: &str,
        kind: StatementKind,
    ) -> Result<ExecOutcome> {
        if self.cached_sql().is_some_and(|cached| cached != sql) {
            self.statement = None;
        }

        match kind {
            StatementKind::Read => {
                let rows = handle.query(sql).await?;
                self.affected_rows = rows.remaining() as u64;
                Ok(ExecOutcome::Rows(rows))
            }
            StatementKind::Write => {
                let summary = handle.execute(sql).await?;
                self.affected_rows = summary.rows_affected;
                // Offset by one: a write touching no rows must not read as zero.
                Ok(ExecOutcome::Count(summary.rows_affected + 1))
            }
        }
    }
}

#[async_trait]
impl<S: ConnectionStrategy> DatasourceManager for SqlManager<S> {
    async fn connect(&mut self, params: &ConnectParams) -> Result<Arc<dyn DriverHandle>> {
        if let Some(reason) = self.strategy.unavailable_reason() {
            let err = DatasourceError::connection(reason.to_string());
            error!("{}: {}", err.category(), err);
            return Err(err);
        }

        let fingerprint = self.strategy.fingerprint(params);

        let handle = match self.registry.get(&fingerprint) {
            Some(handle) => {
                debug!(
                    "Reusing {} handle for '{}'",
                    self.strategy.name(),
                    params.database
                );
                handle
            }
            None => match self.open_handle(params).await {
                Ok(handle) => self.registry.publish(fingerprint.clone(), handle),
                Err(e) => {
                    error!("{}: {}", e.category(), e);
                    self.release_handle();
                    return Err(e);
                }
            },
        };

        let same_handle = self
            .live_handle()
            .is_some_and(|current| Arc::ptr_eq(&current, &handle));
        if !same_handle {
            self.statement = None;
        }

        self.handle = Some(Arc::downgrade(&handle));
        self.fingerprint = Some(fingerprint);
        self.last_params = Some(params.clone());
        self.connect_time = (self.clock)();
        self.fold_case = self.strategy.folds_case(params);

        Ok(handle)
    }

    fn disconnect(&mut self) {
        if self.handle.is_some() {
            debug!("Released {} handle", self.strategy.name());
        }
        self.release_handle();
    }

    async fn exec(&mut self, sql: &str, params: &[Value]) -> Result<ExecOutcome> {
        let handle = self.ensure_handle().await?;
        let kind = StatementKind::classify(sql);

        let result = if params.is_empty() {
            self.exec_plain(&handle, sql, kind).await
        } else {
            self.exec_prepared(&handle, sql, params, kind).await
        };

        result.map_err(|e| {
            error!("{}: {} (sql: {})", e.category(), e, sql);
            if e.is_connection_lost() {
                self.release_handle();
            }
            e
        })
    }

    fn affected_rows(&self) -> u64 {
        self.affected_rows
    }

    async fn insert_id(&mut self, table_name: &str) -> Result<i64> {
        let Some(handle) = self.live_handle() else {
            let err = DatasourceError::not_connected("insert id requested without a live handle");
            error!("{}: {}", err.category(), err);
            return Err(err);
        };

        if !self.fold_case {
            return match handle.last_insert_id().await {
                Ok(Some(id)) => Ok(id),
                Ok(None) => {
                    let err = DatasourceError::execution("driver reported no generated key");
                    error!("{}: {}", err.category(), err);
                    Err(err)
                }
                Err(e) => {
                    error!("{}: {}", e.category(), e);
                    Err(e)
                }
            };
        }

        let sequence = format!("{table_name}{SEQUENCE_SUFFIX}");
        // Some backends rename the sequence with a trailing digit.
        for candidate in [sequence.clone(), format!("{sequence}1")] {
            match handle.sequence_value(&candidate).await {
                Ok(Some(id)) => return Ok(id),
                Ok(None) => debug!("Sequence {} yielded nothing", candidate),
                Err(e) => {
                    error!("{}: {}", e.category(), e);
                    return Err(e);
                }
            }
        }

        let err = DatasourceError::execution(format!("no insert id for table '{table_name}'"));
        error!("{}: {}", err.category(), err);
        Err(err)
    }

    fn fetch_array(&self, result: &mut ResultHandle) -> Option<Record> {
        let record = result.next_record()?;
        if self.fold_case {
            Some(record.into_uppercase_fields())
        } else {
            Some(record)
        }
    }

    fn escape_string(&self, value: &str) -> String {
        let quoted = match self.live_handle() {
            Some(handle) => handle.quote(value),
            None => quote_literal(value, QuoteStyle::Standard),
        };
        strip_outer_quotes(&quoted)
    }
}
