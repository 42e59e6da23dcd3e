//! Builders for clusters and sessions
//!
//! # Quick Start
//!
//! ```rust,ignore
//! let api = Arc::new(FakeApi::new());
//! api.add_cluster(ClusterBuilder::new("app-db").build());
//! let runner = Arc::new(FakeRunner::new());
//! let mut session = test_session(&api, &runner);
//! ```

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use cluster_reconciler::api::models::{Cluster, ClusterStatus, Connection, Engine};
use cluster_reconciler::resources::StaticAddressSource;
use cluster_reconciler::{ReconcilerConfig, Session};

use super::{FakeApi, FakeRunner};

/// Address the fake address source reports for this host
pub const SELF_ADDRESS: &str = "203.0.113.10";

pub const ADMIN_USER: &str = "doadmin";
pub const ADMIN_PASSWORD: &str = "admin-secret";

// =============================================================================
// Connections
// =============================================================================

pub fn public_connection(cluster_name: &str) -> Connection {
    Connection {
        database: "defaultdb".to_string(),
        host: format!("{}-do-user-1.db.ondigitalocean.com", cluster_name),
        port: 25060,
        user: ADMIN_USER.to_string(),
        password: ADMIN_PASSWORD.to_string(),
        ssl: true,
    }
}

pub fn private_connection(cluster_name: &str) -> Connection {
    Connection {
        host: format!("private-{}-do-user-1.db.ondigitalocean.com", cluster_name),
        ..public_connection(cluster_name)
    }
}

// =============================================================================
// Clusters
// =============================================================================

/// Builder for [`Cluster`] values as the control plane reports them
pub struct ClusterBuilder {
    cluster: Cluster,
}

impl ClusterBuilder {
    /// Online single node PostgreSQL cluster in `ams3`
    pub fn new(name: &str) -> Self {
        Self {
            cluster: Cluster {
                id: format!("id-{}", name),
                name: name.to_string(),
                engine: Engine::Pg,
                version: "14".to_string(),
                connection: public_connection(name),
                private_connection: private_connection(name),
                num_nodes: 1,
                size: "db-s-1vcpu-1gb".to_string(),
                region: "ams3".to_string(),
                status: ClusterStatus::Online,
                created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
                private_network_uuid: None,
                db_names: None,
                tags: Vec::new(),
                maintenance_window: None,
            },
        }
    }

    pub fn with_nodes(mut self, num_nodes: u32) -> Self {
        self.cluster.num_nodes = num_nodes;
        self
    }

    pub fn with_size(mut self, size: &str) -> Self {
        self.cluster.size = size.to_string();
        self
    }

    pub fn with_region(mut self, region: &str) -> Self {
        self.cluster.region = region.to_string();
        self
    }

    pub fn with_status(mut self, status: ClusterStatus) -> Self {
        self.cluster.status = status;
        self
    }

    pub fn build(self) -> Cluster {
        self.cluster
    }
}

// =============================================================================
// Sessions
// =============================================================================

/// Poll every 5s, give up after 60s
pub fn test_config() -> ReconcilerConfig {
    ReconcilerConfig {
        provision_timeout: Duration::from_secs(60),
        poll_interval: Duration::from_secs(5),
        ..ReconcilerConfig::default()
    }
}

pub fn test_session(api: &Arc<FakeApi>, runner: &Arc<FakeRunner>) -> Session {
    test_session_with_config(api, runner, test_config())
}

pub fn test_session_with_config(
    api: &Arc<FakeApi>,
    runner: &Arc<FakeRunner>,
    config: ReconcilerConfig,
) -> Session {
    Session::new(
        api.clone(),
        Arc::new(StaticAddressSource(SELF_ADDRESS.to_string())),
        runner.clone(),
        config,
    )
}
