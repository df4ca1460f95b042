//! Logging setup for the datasource binary and embedding applications.
//!
//! Log lines go to stderr by default, or to a file when stdout carries
//! query output that must stay machine-readable.

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Initializes logging to the given file.
///
/// The file is truncated on each run. When it cannot be created a warning is
/// printed and logging stays disabled.
pub fn init_file_logging(log_path: &Path) {
    if let Some(parent) = log_path.parent() {
        if let Err(e) = fs::create_dir_all(parent) {
            eprintln!("Warning: Could not create log directory: {e}");
            return;
        }
    }

    let log_file = match File::create(log_path) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Warning: Could not create log file: {e}");
            return;
        }
    };

    // try_init: a host application may already own the global subscriber.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(log_file)
        .with_ansi(false)
        .try_init();
}

/// Initializes logging to stderr.
pub fn init_stderr_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(std::io::stderr)
        .try_init();
}

/// Returns the default log file location.
///
/// `~/.local/state/datasource/datasource.log` on Linux, the config directory
/// elsewhere, the temp directory as a last resort.
pub fn default_log_path() -> PathBuf {
    if let Some(state_dir) = dirs::state_dir() {
        return state_dir.join("datasource").join("datasource.log");
    }

    if let Some(config_dir) = dirs::config_dir() {
        return config_dir.join("datasource").join("datasource.log");
    }

    std::env::temp_dir().join("datasource.log")
}
