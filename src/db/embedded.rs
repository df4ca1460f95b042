//! Embedded file backend.
//!
//! SQLite databases stored as files. Only connection establishment differs
//! from the generic backend: bare names resolve under a fixed data directory,
//! fingerprints are never salted, and field names are never folded.

use super::driver::DriverHandle;
use super::manager::SqlManager;
use super::registry::{ConnectionRegistry, Fingerprint};
use super::sqlx_driver::{probe_driver, sqlite_file_url, SqlxHandle};
use super::strategy::{ConnectionStrategy, Target};
use super::types::ConnectParams;
use crate::error::{DatasourceError, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info};

/// Extension appended to bare database names.
pub const DB_FILE_EXTENSION: &str = "db";

/// SQLite keeps identifier case as written.
const EMBEDDED_FOLDS_CASE: bool = false;

/// Connection strategy for SQLite files.
#[derive(Debug, Clone)]
pub struct EmbeddedStrategy {
    data_dir: PathBuf,
    unavailable: Option<String>,
}

impl EmbeddedStrategy {
    /// Bootstraps the data directory and checks that the SQLite driver works.
    ///
    /// Never fails: problems are logged and leave the strategy disabled.
    pub async fn new(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();

        let unavailable = match ensure_data_dir(&data_dir) {
            Err(e) => Some(e.to_string()),
            Ok(()) if !probe_driver("sqlite::memory:").await => {
                Some("embedded engine unavailable: SQLite driver cannot open sessions".to_string())
            }
            Ok(()) => None,
        };

        if let Some(reason) = &unavailable {
            error!("Embedded backend disabled: {}", reason);
        } else {
            info!("Embedded backend ready at {}", data_dir.display());
        }

        Self {
            data_dir,
            unavailable,
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn is_available(&self) -> bool {
        self.unavailable.is_none()
    }

    /// Resolves a database name to its file.
    ///
    /// Names containing a path separator are used as given; bare names live
    /// in the data directory with the `.db` extension.
    pub fn database_path(&self, database: &str) -> PathBuf {
        if database.contains('/') || database.contains(std::path::MAIN_SEPARATOR) {
            PathBuf::from(database)
        } else {
            self.data_dir.join(format!("{database}.{DB_FILE_EXTENSION}"))
        }
    }
}

/// Creates the data directory, readable, writable and searchable by all.
fn ensure_data_dir(dir: &Path) -> Result<()> {
    if dir.is_dir() {
        return Ok(());
    }

    std::fs::create_dir_all(dir).map_err(|e| {
        DatasourceError::connection(format!(
            "embedded engine unavailable: cannot create data directory {}: {e}",
            dir.display()
        ))
    })?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o777)).map_err(|e| {
            DatasourceError::connection(format!(
                "embedded engine unavailable: cannot open up data directory {}: {e}",
                dir.display()
            ))
        })?;
    }

    Ok(())
}

#[async_trait]
impl ConnectionStrategy for EmbeddedStrategy {
    fn name(&self) -> &'static str {
        "embedded"
    }

    fn fingerprint(&self, params: &ConnectParams) -> Fingerprint {
        Fingerprint::stable(
            &params.host,
            &params.user,
            &params.password,
            &params.database,
        )
    }

    fn resolve_target(&self, params: &ConnectParams) -> Result<Target> {
        if params.database.is_empty() {
            return Err(DatasourceError::config("Embedded database name is required"));
        }

        let path = self.database_path(&params.database);
        Ok(Target {
            url: sqlite_file_url(&path)?,
            display: path.display().to_string(),
        })
    }

    async fn make_handle(&self, target: &Target) -> Result<Arc<dyn DriverHandle>> {
        let handle = SqlxHandle::connect(&target.url, &target.display).await?;
        Ok(Arc::new(handle))
    }

    fn folds_case(&self, _params: &ConnectParams) -> bool {
        EMBEDDED_FOLDS_CASE
    }

    fn unavailable_reason(&self) -> Option<&str> {
        self.unavailable.as_deref()
    }
}

/// Datasource manager for embedded SQLite files.
pub type EmbeddedFileManager = SqlManager<EmbeddedStrategy>;

impl SqlManager<EmbeddedStrategy> {
    /// Creates an embedded manager storing bare-named databases in
    /// `data_dir`.
    pub async fn new(data_dir: impl Into<PathBuf>, registry: Arc<ConnectionRegistry>) -> Self {
        Self::with_strategy(EmbeddedStrategy::new(data_dir).await, registry)
    }

    /// Returns true unless the backend disabled itself at construction.
    pub fn is_available(&self) -> bool {
        self.strategy().is_available()
    }
}
