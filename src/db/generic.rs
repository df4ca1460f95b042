//! Generic SQL backend.
//!
//! Connects to any engine the sqlx `Any` driver knows about. The host is a
//! URL; user, password and database are layered onto it.

use super::driver::DriverHandle;
use super::manager::SqlManager;
use super::registry::{ConnectionRegistry, Fingerprint};
use super::sqlx_driver::{sqlite_file_url, SqlxHandle};
use super::strategy::{ConnectionStrategy, FingerprintPolicy, Target};
use super::types::ConnectParams;
use crate::config::DatasourceConfig;
use crate::error::{DatasourceError, Result};
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use url::Url;

/// Connection strategy for network (or URL-addressed) engines.
#[derive(Debug, Clone)]
pub struct GenericStrategy {
    default_scheme: String,
    policy: FingerprintPolicy,
    case_fold_markers: Vec<String>,
}

impl GenericStrategy {
    /// Creates a strategy from the datasource configuration.
    pub fn from_config(config: &DatasourceConfig) -> Self {
        Self {
            default_scheme: config.default_scheme.clone(),
            policy: config.fingerprint,
            case_fold_markers: config
                .case_fold_markers
                .iter()
                .map(|m| m.to_lowercase())
                .collect(),
        }
    }

    pub fn policy(&self) -> FingerprintPolicy {
        self.policy
    }

    fn with_scheme(&self, host: &str) -> String {
        let host = host.trim();
        if host.is_empty() {
            format!("{}://localhost", self.default_scheme)
        } else if host.contains("://") || is_sqlite(host) {
            host.to_string()
        } else {
            format!("{}://{}", self.default_scheme, host)
        }
    }
}

impl Default for GenericStrategy {
    fn default() -> Self {
        Self::from_config(&DatasourceConfig::default())
    }
}

fn is_sqlite(host: &str) -> bool {
    host.get(..7)
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("sqlite:"))
}

#[async_trait]
impl ConnectionStrategy for GenericStrategy {
    fn name(&self) -> &'static str {
        "generic"
    }

    fn fingerprint(&self, params: &ConnectParams) -> Fingerprint {
        self.policy.fingerprint(params)
    }

    fn resolve_target(&self, params: &ConnectParams) -> Result<Target> {
        let host = self.with_scheme(&params.host);

        // SQLite addresses a file, not a server; the database is its path.
        if is_sqlite(&host) {
            if params.database.is_empty() {
                return Err(DatasourceError::config("SQLite database path is required"));
            }
            return Ok(Target {
                url: sqlite_file_url(Path::new(&params.database))?,
                display: format!("sqlite://{}", params.database),
            });
        }

        let mut url = Url::parse(&host)
            .map_err(|e| DatasourceError::config(format!("Invalid host '{host}': {e}")))?;

        if !params.user.is_empty() {
            url.set_username(&params.user).map_err(|_| {
                DatasourceError::config(format!("Host '{host}' cannot carry credentials"))
            })?;
        }
        url.set_path(&params.database);

        let display = url.to_string();

        if !params.password.is_empty() {
            url.set_password(Some(&params.password)).map_err(|_| {
                DatasourceError::config(format!("Host '{host}' cannot carry credentials"))
            })?;
        }

        Ok(Target {
            url: url.to_string(),
            display,
        })
    }

    async fn make_handle(&self, target: &Target) -> Result<Arc<dyn DriverHandle>> {
        let handle = SqlxHandle::connect(&target.url, &target.display).await?;
        Ok(Arc::new(handle))
    }

    fn folds_case(&self, params: &ConnectParams) -> bool {
        let host = params.host.to_lowercase();
        self.case_fold_markers
            .iter()
            .any(|marker| host.contains(marker.as_str()))
    }
}

/// Datasource manager for the generic SQL backend.
pub type GenericSqlManager = SqlManager<GenericStrategy>;

impl SqlManager<GenericStrategy> {
    /// Creates a generic manager configured from `config`.
    pub fn new(config: &DatasourceConfig, registry: Arc<ConnectionRegistry>) -> Self {
        Self::with_strategy(GenericStrategy::from_config(config), registry)
    }
}
