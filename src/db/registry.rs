//! Process-wide connection registry.
//!
//! Maps a connection fingerprint to the live handle opened for it. Every
//! manager shares one registry, so two connects with the same fingerprint
//! resolve to the same session. Entries are only removed by explicit
//! eviction; the registry never health-checks what it holds.

use super::driver::DriverHandle;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

/// Cache key for a connection.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint {
    host: String,
    user: String,
    password: String,
    database: String,
    salt: Option<String>,
}

impl Fingerprint {
    /// A fingerprint that is equal for equal parameters.
    pub fn stable(host: &str, user: &str, password: &str, database: &str) -> Self {
        Self {
            host: host.to_string(),
            user: user.to_string(),
            password: password.to_string(),
            database: database.to_string(),
            salt: None,
        }
    }

    /// A fingerprint carrying a fresh random component, so it practically
    /// never matches an existing entry.
    pub fn salted(host: &str, user: &str, password: &str, database: &str) -> Self {
        Self {
            salt: Some(uuid::Uuid::new_v4().to_string()),
            ..Self::stable(host, user, password, database)
        }
    }

    pub fn is_salted(&self) -> bool {
        self.salt.is_some()
    }

    pub fn database(&self) -> &str {
        &self.database
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fingerprint")
            .field("host", &self.host)
            .field("user", &self.user)
            .field("database", &self.database)
            .field("salted", &self.salt.is_some())
            .finish()
    }
}

/// Shared fingerprint → handle map.
#[derive(Default)]
pub struct ConnectionRegistry {
    entries: Mutex<HashMap<Fingerprint, Arc<dyn DriverHandle>>>,
}

impl ConnectionRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty registry ready to be shared between managers.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Fingerprint, Arc<dyn DriverHandle>>> {
        // A panic while holding the lock cannot leave the map half-written.
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Returns the handle registered for `fingerprint`, if any.
    pub fn get(&self, fingerprint: &Fingerprint) -> Option<Arc<dyn DriverHandle>> {
        self.lock().get(fingerprint).cloned()
    }

    /// Registers `handle` under `fingerprint` unless an entry already
    /// exists. Returns the registered handle, which is the existing one when
    /// two connects raced.
    pub fn publish(
        &self,
        fingerprint: Fingerprint,
        handle: Arc<dyn DriverHandle>,
    ) -> Arc<dyn DriverHandle> {
        let mut entries = self.lock();
        let registered = entries.entry(fingerprint).or_insert(handle);
        Arc::clone(registered)
    }

    /// Removes and returns the entry for `fingerprint`.
    pub fn evict(&self, fingerprint: &Fingerprint) -> Option<Arc<dyn DriverHandle>> {
        let evicted = self.lock().remove(fingerprint);
        if evicted.is_some() {
            debug!("Evicted registry entry {:?}", fingerprint);
        }
        evicted
    }

    /// Number of registered handles.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Closes and removes every registered handle.
    pub async fn clear(&self) {
        let drained: Vec<_> = self.lock().drain().map(|(_, handle)| handle).collect();
        for handle in drained {
            handle.close().await;
        }
    }
}

impl fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("entries", &self.len())
            .finish()
    }
}
