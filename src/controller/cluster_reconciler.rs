//! Cluster provisioning
//!
//! Ensures a named cluster exists, waits for it to come online and guards it
//! against drift from the requested shape. The provisioner never resizes or
//! moves a cluster; a mismatch is reported and left for an operator.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::{Instant, sleep};
use tracing::{debug, info};

use crate::api::models::{Cluster, ClusterCreate, ClusterStatus, Engine};
use crate::controller::context::Session;
use crate::controller::error::{Error, Result};
use crate::controller::outcome::Outcome;

/// Requested shape of a cluster
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ClusterSpec {
    pub name: String,
    pub engine: Engine,
    /// Engine version, the engine's default when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub size: String,
    pub region: String,
    #[serde(alias = "nodes")]
    pub num_nodes: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_network: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// Accept an existing cluster regardless of size, region and node count
    #[serde(default)]
    pub skip_checks: bool,
}

impl ClusterSpec {
    pub fn new(
        name: impl Into<String>,
        engine: Engine,
        size: impl Into<String>,
        region: impl Into<String>,
        num_nodes: u32,
    ) -> Self {
        Self {
            name: name.into(),
            engine,
            version: None,
            size: size.into(),
            region: region.into(),
            num_nodes,
            private_network: None,
            tags: Vec::new(),
            skip_checks: false,
        }
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn private_network(mut self, uuid: impl Into<String>) -> Self {
        self.private_network = Some(uuid.into());
        self
    }

    pub fn skip_checks(mut self) -> Self {
        self.skip_checks = true;
        self
    }

    pub fn effective_version(&self) -> &str {
        self.version
            .as_deref()
            .unwrap_or_else(|| self.engine.default_version())
    }

    fn to_create(&self) -> ClusterCreate {
        ClusterCreate {
            name: self.name.clone(),
            engine: self.engine,
            version: self.effective_version().to_string(),
            size: self.size.clone(),
            region: self.region.clone(),
            num_nodes: self.num_nodes,
            tags: self.tags.clone(),
            private_network_uuid: self.private_network.clone(),
        }
    }

    /// Compare size, region and node count, in that order
    pub fn check(&self, cluster: &Cluster) -> Result<()> {
        let mismatch = |field, expected: String, actual: String| Error::SpecMismatch {
            cluster: self.name.clone(),
            field,
            expected,
            actual,
        };

        if cluster.size != self.size {
            return Err(mismatch("size", self.size.clone(), cluster.size.clone()));
        }
        if cluster.region != self.region {
            return Err(mismatch("region", self.region.clone(), cluster.region.clone()));
        }
        if cluster.num_nodes != self.num_nodes {
            return Err(mismatch(
                "num_nodes",
                self.num_nodes.to_string(),
                cluster.num_nodes.to_string(),
            ));
        }
        Ok(())
    }
}

/// Where a provisioning cluster stands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionState {
    Pending,
    Online,
    TimedOut,
}

impl ProvisionState {
    pub fn evaluate(status: ClusterStatus, elapsed: Duration, timeout: Duration) -> Self {
        if status.is_online() {
            ProvisionState::Online
        } else if elapsed >= timeout {
            ProvisionState::TimedOut
        } else {
            ProvisionState::Pending
        }
    }
}

impl Session {
    /// Make sure a cluster matching `spec` exists and is online
    ///
    /// `output` carries a note when the cluster had to be created.
    pub async fn ensure_cluster(&mut self, spec: &ClusterSpec) -> Result<Outcome<String>> {
        let result = self.ensure_cluster_inner(spec).await;
        self.observe("cluster", result)
    }

    async fn ensure_cluster_inner(&mut self, spec: &ClusterSpec) -> Result<Outcome<String>> {
        let (cluster, created) = match self.resolve(&spec.name).await? {
            Some(cluster) => {
                debug!(cluster = %spec.name, status = %cluster.status, "Cluster exists");
                (cluster, false)
            }
            None => {
                info!(
                    cluster = %spec.name,
                    engine = %spec.engine,
                    size = %spec.size,
                    region = %spec.region,
                    "Creating database cluster"
                );
                let cluster = self.api.create_cluster(&spec.to_create()).await?;
                self.cache_mut().store_cluster(cluster.clone());
                (cluster, true)
            }
        };

        let cluster = self.wait_until_online(cluster).await?;

        if !spec.skip_checks {
            spec.check(&cluster)?;
        }

        self.cache_mut().store_cluster(cluster);

        Ok(if created {
            Outcome::with_output(
                true,
                format!("Created {} database cluster {}", spec.engine, spec.name),
            )
        } else {
            Outcome::unchanged()
        })
    }

    /// Poll `cluster` until it reports online or the provisioning timeout runs out
    async fn wait_until_online(&self, mut cluster: Cluster) -> Result<Cluster> {
        let timeout = self.config.provision_timeout;
        let interval = self.config.poll_interval;
        let started = Instant::now();

        loop {
            let elapsed = started.elapsed();
            match ProvisionState::evaluate(cluster.status, elapsed, timeout) {
                ProvisionState::Online => break,
                ProvisionState::TimedOut => {
                    self.metrics.observe_provision_wait(elapsed.as_secs_f64());
                    return Err(Error::ProvisioningTimeout {
                        cluster: cluster.name,
                        waited: elapsed,
                    });
                }
                ProvisionState::Pending => {
                    debug!(
                        cluster = %cluster.name,
                        status = %cluster.status,
                        elapsed_secs = elapsed.as_secs(),
                        "Waiting for cluster to come online"
                    );
                    sleep(interval.min(timeout - elapsed)).await;
                    cluster = self.api.get_cluster(&cluster.id).await?;
                }
            }
        }

        let waited = started.elapsed();
        if !waited.is_zero() {
            info!(cluster = %cluster.name, waited_secs = waited.as_secs(), "Cluster is online");
            self.metrics.observe_provision_wait(waited.as_secs_f64());
        }
        Ok(cluster)
    }

    pub async fn ensure_postgres_cluster(
        &mut self,
        name: &str,
        size: &str,
        region: &str,
        num_nodes: u32,
    ) -> Result<Outcome<String>> {
        self.ensure_cluster(&ClusterSpec::new(name, Engine::Pg, size, region, num_nodes))
            .await
    }

    pub async fn ensure_mysql_cluster(
        &mut self,
        name: &str,
        size: &str,
        region: &str,
        num_nodes: u32,
    ) -> Result<Outcome<String>> {
        self.ensure_cluster(&ClusterSpec::new(name, Engine::Mysql, size, region, num_nodes))
            .await
    }

    pub async fn ensure_redis_cluster(
        &mut self,
        name: &str,
        size: &str,
        region: &str,
        num_nodes: u32,
    ) -> Result<Outcome<String>> {
        self.ensure_cluster(&ClusterSpec::new(name, Engine::Redis, size, region, num_nodes))
            .await
    }

    pub async fn ensure_mongo_cluster(
        &mut self,
        name: &str,
        size: &str,
        region: &str,
        num_nodes: u32,
    ) -> Result<Outcome<String>> {
        self.ensure_cluster(&ClusterSpec::new(name, Engine::Mongo, size, region, num_nodes))
            .await
    }
}
