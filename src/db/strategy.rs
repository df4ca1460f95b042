//! Connection strategies.
//!
//! A strategy is the only thing that differs between backends: how a
//! fingerprint is built, where the parameters point to, how a handle is
//! opened, and whether field names get case-folded. The execution core in
//! `manager.rs` is shared by all of them.

use super::driver::DriverHandle;
use super::registry::Fingerprint;
use super::types::ConnectParams;
use crate::error::Result;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

/// Fingerprint policy for backends that support both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FingerprintPolicy {
    /// Equal parameters share one handle.
    #[default]
    Stable,
    /// Every connect gets a fresh random salt, so handles are practically
    /// never shared.
    Salted,
}

impl FingerprintPolicy {
    /// Builds a fingerprint for `params` under this policy.
    pub fn fingerprint(&self, params: &ConnectParams) -> Fingerprint {
        match self {
            Self::Stable => Fingerprint::stable(
                &params.host,
                &params.user,
                &params.password,
                &params.database,
            ),
            Self::Salted => Fingerprint::salted(
                &params.host,
                &params.user,
                &params.password,
                &params.database,
            ),
        }
    }

    /// Parses a policy name.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "stable" => Some(Self::Stable),
            "salted" => Some(Self::Salted),
            _ => None,
        }
    }
}

/// Resolved backend address.
#[derive(Clone)]
pub struct Target {
    /// Driver URL; may contain credentials.
    pub url: String,
    /// Credential-free rendering for logs and errors.
    pub display: String,
}

impl fmt::Debug for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Target")
            .field("display", &self.display)
            .finish()
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display)
    }
}

/// Backend-specific connection establishment.
#[async_trait]
pub trait ConnectionStrategy: Send + Sync {
    /// Short backend name for log lines.
    fn name(&self) -> &'static str;

    /// Registry key for `params`.
    fn fingerprint(&self, params: &ConnectParams) -> Fingerprint;

    /// Turns connect parameters into a backend address.
    fn resolve_target(&self, params: &ConnectParams) -> Result<Target>;

    /// Opens a new handle to `target`.
    async fn make_handle(&self, target: &Target) -> Result<Arc<dyn DriverHandle>>;

    /// Whether field names read through handles for `params` are upper-cased.
    fn folds_case(&self, params: &ConnectParams) -> bool;

    /// Why this strategy cannot open handles, if it is disabled.
    fn unavailable_reason(&self) -> Option<&str> {
        None
    }
}
