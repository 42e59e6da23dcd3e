use std::sync::Arc;

use tracing::debug;

use crate::api::models::Cluster;
use crate::api::{DatabaseApi, RemoteError, find_paged};
use crate::config::ReconcilerConfig;
use crate::controller::cache::{ClusterCache, ClusterEntry};
use crate::controller::error::{Error, Result};
use crate::controller::outcome::Outcome;
use crate::metrics::Metrics;
use crate::resources::address::AddressSource;
use crate::resources::process::ProcessRunner;

/// One reconciliation session
///
/// Owns the API client, the collaborators used for external tools and the
/// name → cluster cache. Methods that may touch the cache take `&mut self`;
/// callers serialize reconciliation calls on a session.
pub struct Session {
    pub(crate) api: Arc<dyn DatabaseApi>,
    pub(crate) address: Arc<dyn AddressSource>,
    pub(crate) runner: Arc<dyn ProcessRunner>,
    pub(crate) config: ReconcilerConfig,
    pub(crate) metrics: Arc<Metrics>,
    cache: ClusterCache,
}

impl Session {
    pub fn new(
        api: Arc<dyn DatabaseApi>,
        address: Arc<dyn AddressSource>,
        runner: Arc<dyn ProcessRunner>,
        config: ReconcilerConfig,
    ) -> Self {
        Self {
            api,
            address,
            runner,
            config,
            metrics: Arc::new(Metrics::new()),
            cache: ClusterCache::new(),
        }
    }

    /// Report into a shared registry instead of a private one
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn config(&self) -> &ReconcilerConfig {
        &self.config
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn cache(&self) -> &ClusterCache {
        &self.cache
    }

    pub(crate) fn cache_mut(&mut self) -> &mut ClusterCache {
        &mut self.cache
    }

    /// Resolve a cluster by its user-facing name
    ///
    /// Answers from the cache when the name was already resolved (absence
    /// included); otherwise scans the cluster listing and remembers the result.
    /// A listed entry under `name` that cannot be decoded is an error, never
    /// an absence.
    pub async fn resolve(&mut self, name: &str) -> Result<Option<Cluster>> {
        if let ClusterEntry::Present(cluster) = self.cache.get(name) {
            return Ok(Some(cluster.clone()));
        }
        if self.cache.get(name).is_resolved() {
            return Ok(None);
        }

        debug!(cluster = %name, "Looking up cluster");
        let api = self.api.as_ref();
        let fetch = |page| async move {
            let page = api.list_clusters(page).await?;
            // An entry under this name exists but could not be read
            if page.skipped.iter().any(|skipped| skipped == name) {
                return Err(RemoteError::transport(format!(
                    "cluster `{}` is listed but could not be decoded",
                    name
                )));
            }
            Ok(page)
        };
        let found = find_paged(fetch, |c| c.name == name).await?;

        self.cache.store(name, found.clone().into());
        Ok(found)
    }

    /// Resolve a cluster that has to exist
    pub async fn require_cluster(&mut self, name: &str) -> Result<Cluster> {
        self.resolve(name)
            .await?
            .ok_or_else(|| Error::ClusterNotFound(name.to_string()))
    }

    /// Forget what is known about a cluster name
    pub fn invalidate(&mut self, name: &str) {
        self.cache.invalidate(name);
    }

    /// Count a finished reconciliation in the metrics
    pub(crate) fn observe<T>(&self, kind: &str, result: Result<Outcome<T>>) -> Result<Outcome<T>> {
        self.metrics
            .record(kind, result.as_ref().ok().map(|outcome| outcome.changed));
        result
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("config", &self.config)
            .field("cached_clusters", &self.cache.len())
            .finish_non_exhaustive()
    }
}
