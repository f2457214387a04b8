use crate::topology::Replicasets;
use std::collections::HashMap;

/// TopologyCache holds discovered topologies keyed by application name. It is owned and passed
/// around by the caller, there is no process-wide cache.
#[derive(Clone, Debug, Default)]
pub struct TopologyCache {
    entries: HashMap<String, Replicasets>,
}

impl TopologyCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, app_name: &str) -> Option<&Replicasets> {
        self.entries.get(app_name)
    }

    pub fn insert(&mut self, app_name: &str, replicasets: Replicasets) {
        self.entries.insert(app_name.to_string(), replicasets);
    }

    /// Drops the cached topology, e.g. after a mutating action.
    pub fn invalidate(&mut self, app_name: &str) {
        self.entries.remove(app_name);
    }
}
