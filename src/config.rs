//! Configuration management for the datasource layer.
//!
//! Handles loading configuration from TOML files and environment variables:
//! default connection parameters, the embedded data directory, and the
//! generic backend's fingerprint and case-folding settings.

use crate::db::{ConnectParams, FingerprintPolicy};
use crate::error::{DatasourceError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Datasource settings.
    #[serde(default)]
    pub datasource: DatasourceConfig,
}

/// Connection defaults and backend tuning.
#[derive(Clone, Serialize, Deserialize)]
pub struct DatasourceConfig {
    /// Default host (a URL such as `postgres://db:5432`, or `sqlite:`).
    pub host: Option<String>,

    /// Default user.
    pub user: Option<String>,

    /// Default password (not recommended to store in config).
    pub password: Option<String>,

    /// Default database name.
    pub database: Option<String>,

    /// Directory holding embedded database files.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Scheme assumed for hosts given without one.
    #[serde(default = "default_scheme")]
    pub default_scheme: String,

    /// Connection reuse policy for the generic backend.
    #[serde(default)]
    pub fingerprint: FingerprintPolicy,

    /// Host substrings (case-insensitive) that mark a case-folding backend.
    #[serde(default = "default_case_fold_markers")]
    pub case_fold_markers: Vec<String>,
}

/// Returns the platform data directory for embedded databases.
pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("datasource")
}

fn default_scheme() -> String {
    "postgres".to_string()
}

fn default_case_fold_markers() -> Vec<String> {
    vec!["pgsql".to_string(), "postgres".to_string()]
}

impl Default for DatasourceConfig {
    fn default() -> Self {
        Self {
            host: None,
            user: None,
            password: None,
            database: None,
            data_dir: default_data_dir(),
            default_scheme: default_scheme(),
            fingerprint: FingerprintPolicy::default(),
            case_fold_markers: default_case_fold_markers(),
        }
    }
}

impl std::fmt::Debug for DatasourceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatasourceConfig")
            .field("host", &self.host)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("database", &self.database)
            .field("data_dir", &self.data_dir)
            .field("default_scheme", &self.default_scheme)
            .field("fingerprint", &self.fingerprint)
            .field("case_fold_markers", &self.case_fold_markers)
            .finish()
    }
}

impl DatasourceConfig {
    /// Merges another config into this one, with the other taking precedence
    /// for connection parameters it sets.
    pub fn merge(&mut self, other: &DatasourceConfig) {
        if other.host.is_some() {
            self.host = other.host.clone();
        }
        if other.user.is_some() {
            self.user = other.user.clone();
        }
        if other.password.is_some() {
            self.password = other.password.clone();
        }
        if other.database.is_some() {
            self.database = other.database.clone();
        }
    }

    /// Applies `DATASOURCE_*` environment variables as defaults.
    pub fn apply_env_defaults(&mut self) {
        if self.host.is_none() {
            self.host = std::env::var("DATASOURCE_HOST").ok();
        }
        if self.user.is_none() {
            self.user = std::env::var("DATASOURCE_USER").ok();
        }
        if self.password.is_none() {
            self.password = std::env::var("DATASOURCE_PASSWORD").ok();
        }
        if self.database.is_none() {
            self.database = std::env::var("DATASOURCE_DATABASE").ok();
        }
        if let Ok(dir) = std::env::var("DATASOURCE_DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }
    }

    /// Builds connect parameters from the configured defaults.
    ///
    /// Unset user and password become empty strings; a database name is
    /// required.
    pub fn connect_params(&self) -> Result<ConnectParams> {
        let database = self
            .database
            .as_deref()
            .ok_or_else(|| DatasourceError::config("Database name is required"))?;

        Ok(ConnectParams::new(
            self.host.as_deref().unwrap_or("localhost"),
            self.user.as_deref().unwrap_or(""),
            self.password.as_deref().unwrap_or(""),
            database,
        ))
    }

    /// Returns a display-safe string (no password) for log lines.
    pub fn display_string(&self) -> String {
        let host = self.host.as_deref().unwrap_or("localhost");
        let database = self.database.as_deref().unwrap_or("unknown");
        format!("{database} @ {host}")
    }
}

impl Config {
    /// Returns the default config file path for the current platform.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("datasource")
            .join("config.toml")
    }

    /// Loads configuration from a TOML file. A missing file yields defaults.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| DatasourceError::config(format!("Failed to read config file: {e}")))?;

        Self::parse_toml(&content, path)
    }

    /// Parses configuration from a TOML string.
    fn parse_toml(content: &str, path: &Path) -> Result<Self> {
        toml::from_str(content).map_err(|e| {
            DatasourceError::config(format!(
                "Configuration error in {}:\n  {}",
                path.display(),
                e
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_valid_config() {
        let toml = r#"
[datasource]
host = "postgres://db.internal:5432"
user = "crawler"
database = "crawl"
data_dir = "/var/lib/crawler"
fingerprint = "salted"
case_fold_markers = ["pgsql"]
"#;
        let config: Config = toml::from_str(toml).unwrap();
        let ds = &config.datasource;

        assert_eq!(ds.host.as_deref(), Some("postgres://db.internal:5432"));
        assert_eq!(ds.user.as_deref(), Some("crawler"));
        assert_eq!(ds.database.as_deref(), Some("crawl"));
        assert_eq!(ds.data_dir, PathBuf::from("/var/lib/crawler"));
        assert_eq!(ds.fingerprint, FingerprintPolicy::Salted);
        assert_eq!(ds.case_fold_markers, vec!["pgsql".to_string()]);
    }

    #[test]
    fn test_missing_optional_fields() {
        let config: Config = toml::from_str("[datasource]\ndatabase = \"crawl\"\n").unwrap();
        let ds = &config.datasource;

        assert_eq!(ds.host, None);
        assert_eq!(ds.password, None);
        assert_eq!(ds.default_scheme, "postgres");
        assert_eq!(ds.fingerprint, FingerprintPolicy::Stable);
        assert_eq!(ds.data_dir, default_data_dir());
        assert_eq!(
            ds.case_fold_markers,
            vec!["pgsql".to_string(), "postgres".to_string()]
        );
    }

    #[test]
    fn test_empty_file_is_default() {
        let config: Config = toml::from_str("").unwrap();
        assert!(config.datasource.database.is_none());
    }

    #[test]
    fn test_invalid_policy_is_rejected() {
        let result: std::result::Result<Config, _> =
            toml::from_str("[datasource]\nfingerprint = \"random\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_load_missing_file_returns_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from_file(&dir.path().join("absent.toml")).unwrap();
        assert!(config.datasource.host.is_none());
    }

    #[test]
    fn test_load_reports_path_on_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[datasource\n").unwrap();

        let err = Config::load_from_file(&path).unwrap_err();
        assert!(matches!(err, DatasourceError::Config(_)));
        assert!(err.to_string().contains("bad.toml"));
    }

    #[test]
    fn test_connect_params_requires_database() {
        let config = DatasourceConfig::default();
        assert!(config.connect_params().is_err());

        let config = DatasourceConfig {
            database: Some("crawl".to_string()),
            ..Default::default()
        };
        let params = config.connect_params().unwrap();
        assert_eq!(params.host, "localhost");
        assert_eq!(params.user, "");
        assert_eq!(params.database, "crawl");
    }

    #[test]
    fn test_merge_prefers_other() {
        let mut base = DatasourceConfig {
            host: Some("postgres://a".to_string()),
            user: Some("u".to_string()),
            database: Some("db".to_string()),
            ..Default::default()
        };
        let other = DatasourceConfig {
            host: Some("postgres://b".to_string()),
            password: Some("secret".to_string()),
            ..Default::default()
        };

        base.merge(&other);

        assert_eq!(base.host.as_deref(), Some("postgres://b"));
        assert_eq!(base.user.as_deref(), Some("u"));
        assert_eq!(base.password.as_deref(), Some("secret"));
        assert_eq!(base.database.as_deref(), Some("db"));
    }

    #[test]
    fn test_debug_and_display_hide_password() {
        let config = DatasourceConfig {
            host: Some("postgres://db".to_string()),
            password: Some("hunter2".to_string()),
            database: Some("crawl".to_string()),
            ..Default::default()
        };
        assert!(!format!("{config:?}").contains("hunter2"));
        assert_eq!(config.display_string(), "crawl @ postgres://db");
    }
}
