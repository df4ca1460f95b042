//! Error types for the datasource layer.
//!
//! Every failure produced by a manager is logged where it happens and then
//! returned as one of these variants; nothing in the layer panics.

use thiserror::Error;

/// Main error type for datasource operations.
#[derive(Error, Debug)]
pub enum DatasourceError {
    /// Driver unavailable, credentials rejected, or handle creation failed.
    #[error("Connection error: {0}")]
    Connection(String),

    /// Statement compilation failed.
    #[error("Prepare error: {0}")]
    Prepare(String),

    /// Binding or executing a statement failed.
    #[error("Execution error: {0}")]
    Execution(String),

    /// No live handle, and the reconnect attempt did not produce one.
    #[error("Not connected: {0}")]
    NotConnected(String),

    /// Configuration errors (invalid config file, bad host URL, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal errors (unexpected states, bugs, etc.)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl DatasourceError {
    /// Creates a connection error with the given message.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Creates a prepare error with the given message.
    pub fn prepare(msg: impl Into<String>) -> Self {
        Self::Prepare(msg.into())
    }

    /// Creates an execution error with the given message.
    pub fn execution(msg: impl Into<String>) -> Self {
        Self::Execution(msg.into())
    }

    /// Creates a not-connected error with the given message.
    pub fn not_connected(msg: impl Into<String>) -> Self {
        Self::NotConnected(msg.into())
    }

    /// Creates a configuration error with the given message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Creates an internal error with the given message.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Returns the error category as a string for display purposes.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Connection(_) => "Connection Error",
            Self::Prepare(_) => "Prepare Error",
            Self::Execution(_) => "Execution Error",
            Self::NotConnected(_) => "Not Connected",
            Self::Config(_) => "Configuration Error",
            Self::Internal(_) => "Internal Error",
        }
    }

    /// Returns true if the error means the underlying session is unusable.
    pub fn is_connection_lost(&self) -> bool {
        matches!(self, Self::Connection(_))
    }
}

/// Result type alias using DatasourceError.
pub type Result<T> = std::result::Result<T, DatasourceError>;
