//! Provider Registry — the map of adapter name to (adapter, live status).
//!
//! Owned by the Provider Manager. Reads take a read-lock; the single
//! write path takes a write-lock for the duration of one mutation only —
//! never across an HTTP call.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::adapters::AdapterHandle;
use crate::types::ProviderStatus;

pub struct Registry {
    adapters: HashMap<String, AdapterHandle>,
    status: RwLock<HashMap<String, ProviderStatus>>,
    /// Lower priority value sorts first.
    priority: HashMap<String, i32>,
}

impl Registry {
    pub fn new(entries: Vec<(AdapterHandle, ProviderStatus, i32)>) -> Self {
        let mut adapters = HashMap::new();
        let mut status = HashMap::new();
        let mut priority = HashMap::new();
        for (adapter, s, prio) in entries {
            let name = adapter.name().to_string();
            priority.insert(name.clone(), prio);
            status.insert(name.clone(), s);
            adapters.insert(name, adapter);
        }
        Self {
            adapters,
            status: RwLock::new(status),
            priority,
        }
    }

    pub fn adapter(&self, name: &str) -> Option<AdapterHandle> {
        self.adapters.get(name).cloned()
    }

    /// Enabled adapters ordered by ascending priority (lower = preferred).
    pub fn by_priority(&self) -> Vec<String> {
        let mut names: Vec<String> = self.adapters.keys().cloned().collect();
        names.sort_by_key(|n| self.priority.get(n).copied().unwrap_or(i32::MAX));
        names
    }

    /// A defensive copy of every provider's current status, for the
    /// external health snapshot.
    pub fn status_snapshot(&self) -> Vec<ProviderStatus> {
        self.status
            .read()
            .expect("status lock poisoned")
            .values()
            .cloned()
            .collect()
    }

    pub fn status_of(&self, name: &str) -> Option<ProviderStatus> {
        self.status.read().expect("status lock poisoned").get(name).cloned()
    }

    /// Replace one provider's status under a short write-lock.
    pub fn update(&self, name: &str, new_status: ProviderStatus) {
        let mut guard = self.status.write().expect("status lock poisoned");
        guard.insert(name.to_string(), new_status);
    }

    pub fn names(&self) -> Vec<String> {
        self.adapters.keys().cloned().collect()
    }
}
