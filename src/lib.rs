pub mod api;
pub mod config;
pub mod controller;
pub mod manifest;
pub mod metrics;
pub mod resources;

pub use api::http::HttpApiClient;
pub use api::models::{
    Cluster, Connection, Engine, EntryState, FirewallRuleCreate, FirewallRuleType,
};
pub use api::{DatabaseApi, Page, RemoteError};
pub use config::{ApiConfig, ReconcilerConfig};
pub use controller::{
    ClusterSpec, Error, Outcome, Result, RuleDiff, SelfAccessGrant, Session, UserConnections,
    diff_rules,
};
pub use manifest::{Manifest, ReportEntry};
pub use metrics::Metrics;
