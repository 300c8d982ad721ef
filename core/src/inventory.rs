//! The shared endpoint inventory.
//!
//! Written exclusively by the inventory loop; read by the poller, the
//! subscription manager, and the ingress server. Reads take a consistent
//! point-in-time snapshot; writes hold a short exclusive critical section.

use crate::endpoint::{Credentials, Endpoint};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// The set of known, usable BMCs, keyed by stable ID.
#[derive(Debug, Default)]
pub struct Inventory {
    inner: RwLock<HashMap<String, Endpoint>>,
}

impl Inventory {
    /// Create an empty inventory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // A poisoned lock means a writer panicked mid-update; the map itself is
    // still structurally sound, so recover the guard and keep serving.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Endpoint>> {
        match self.inner.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Endpoint>> {
        match self.inner.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Number of endpoints currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// True when no endpoints are known.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Whether an endpoint with this ID is already known.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.read().contains_key(id)
    }

    /// Insert or replace an endpoint.
    pub fn insert(&self, endpoint: Endpoint) {
        self.write().insert(endpoint.id.clone(), endpoint);
    }

    /// Clone out a single endpoint by ID.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<Endpoint> {
        self.read().get(id).cloned()
    }

    /// Resolve an endpoint by the host it answers on.
    ///
    /// Used by the ingress server to match an inbound event's peer address or
    /// origin header against the fleet. Matches the FQDN or its first label.
    #[must_use]
    pub fn resolve_host(&self, host: &str) -> Option<Endpoint> {
        self.read()
            .values()
            .find(|ep| {
                ep.fqdn == host
                    || ep.id == host
                    || ep.fqdn.split('.').next().is_some_and(|label| label == host)
            })
            .cloned()
    }

    /// A consistent point-in-time view of every endpoint.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Endpoint> {
        self.read().values().cloned().collect()
    }

    /// Mark an endpoint's credentials stale after an auth rejection.
    ///
    /// The inventory loop refetches credentials for stale endpoints on its
    /// next tick.
    pub fn mark_credentials_stale(&self, id: &str) {
        if let Some(ep) = self.write().get_mut(id) {
            ep.credentials_stale = true;
        }
    }

    /// IDs of endpoints whose credentials are currently stale.
    #[must_use]
    pub fn stale_credential_ids(&self) -> Vec<String> {
        self.read()
            .values()
            .filter(|ep| ep.credentials_stale)
            .map(|ep| ep.id.clone())
            .collect()
    }

    /// Replace an endpoint's credentials and clear its stale flag.
    pub fn update_credentials(&self, id: &str, credentials: Credentials) {
        if let Some(ep) = self.write().get_mut(id) {
            ep.credentials = credentials;
            ep.credentials_stale = false;
        }
    }

    /// Record a successful contact with the BMC.
    pub fn touch(&self, id: &str, when: DateTime<Utc>) {
        if let Some(ep) = self.write().get_mut(id) {
            ep.last_contact = Some(when);
        }
    }
}
