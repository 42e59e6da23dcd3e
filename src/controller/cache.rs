//! Name-keyed cluster cache
//!
//! The control API identifies clusters by id while callers use their unique
//! names, so resolutions are remembered for the lifetime of a session,
//! including negative ones.

use std::collections::HashMap;

use crate::api::models::Cluster;

/// What the session knows about a cluster name
#[derive(Clone, Debug, PartialEq)]
pub enum ClusterEntry {
    /// Never looked up, or invalidated since
    Unresolved,
    /// Looked up and confirmed not to exist
    Absent,
    Present(Cluster),
}

impl ClusterEntry {
    pub fn is_resolved(&self) -> bool {
        !matches!(self, ClusterEntry::Unresolved)
    }

    pub fn cluster(&self) -> Option<&Cluster> {
        match self {
            ClusterEntry::Present(cluster) => Some(cluster),
            _ => None,
        }
    }
}

impl From<Option<Cluster>> for ClusterEntry {
    fn from(cluster: Option<Cluster>) -> Self {
        match cluster {
            Some(cluster) => ClusterEntry::Present(cluster),
            None => ClusterEntry::Absent,
        }
    }
}

/// Session-owned map of cluster name to [`ClusterEntry`]
///
/// Single writer: mutations go through `&mut self`, the owning session must
/// not be shared across threads without external locking.
#[derive(Debug, Default)]
pub struct ClusterCache {
    entries: HashMap<String, ClusterEntry>,
}

impl ClusterCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> &ClusterEntry {
        self.entries.get(name).unwrap_or(&ClusterEntry::Unresolved)
    }

    pub fn store(&mut self, name: &str, entry: ClusterEntry) {
        self.entries.insert(name.to_string(), entry);
    }

    /// Record the latest known state of a cluster under its own name
    pub fn store_cluster(&mut self, cluster: Cluster) {
        let name = cluster.name.clone();
        self.entries.insert(name, ClusterEntry::Present(cluster));
    }

    pub fn invalidate(&mut self, name: &str) {
        self.entries.remove(name);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
