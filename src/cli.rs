//! Command-line argument parsing for the datasource binary.

use clap::Parser;
use datasource::config::DatasourceConfig;
use datasource::db::{DatabaseBackend, Value};
use std::path::PathBuf;

/// Output format for rows returned by reads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Tab-separated values with a header line.
    #[default]
    Text,
    /// One JSON object per row.
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(format!("Invalid output format: {s}. Expected: text or json")),
        }
    }
}

/// Runs SQL statements against a generic or embedded datasource.
#[derive(Parser, Debug)]
#[command(name = "datasource")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// SQL statements, executed in order
    #[arg(value_name = "SQL", required = true)]
    pub statements: Vec<String>,

    /// Database host (a URL such as postgres://db:5432, or sqlite:)
    #[arg(short = 'H', long, value_name = "HOST")]
    pub host: Option<String>,

    /// Database user
    #[arg(short = 'U', long, value_name = "USER")]
    pub user: Option<String>,

    /// Database password
    #[arg(long, value_name = "PASSWORD", env = "DATASOURCE_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Database name (a file name or path with --embedded)
    #[arg(short = 'd', long, value_name = "DATABASE")]
    pub database: Option<String>,

    /// Use the embedded file backend instead of the generic one
    #[arg(long)]
    pub embedded: bool,

    /// Bind value for every statement (repeatable, in placeholder order)
    #[arg(short = 'p', long = "param", value_name = "VALUE")]
    pub params: Vec<String>,

    /// Output format for rows
    #[arg(long, value_name = "FORMAT", default_value = "text")]
    pub format: OutputFormat,

    /// Print the key generated by the last insert into TABLE
    #[arg(long, value_name = "TABLE")]
    pub insert_id: Option<String>,

    /// Config file path
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Write logs to a file instead of stderr
    #[arg(long, value_name = "PATH")]
    pub log_file: Option<PathBuf>,
}

impl Cli {
    /// Parses command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Returns the config file path to use.
    pub fn config_path(&self) -> PathBuf {
        self.config
            .clone()
            .unwrap_or_else(datasource::config::Config::default_path)
    }

    /// Connection parameters given on the command line, to be merged over
    /// the file config.
    pub fn to_config_overrides(&self) -> DatasourceConfig {
        DatasourceConfig {
            host: self.host.clone(),
            user: self.user.clone(),
            password: self.password.clone(),
            database: self.database.clone(),
            ..Default::default()
        }
    }

    pub fn backend(&self) -> DatabaseBackend {
        if self.embedded {
            DatabaseBackend::Embedded
        } else {
            DatabaseBackend::Generic
        }
    }

    /// Bind values parsed from the `--param` arguments.
    pub fn bind_values(&self) -> Vec<Value> {
        self.params.iter().map(|p| Value::parse_literal(p)).collect()
    }
}
