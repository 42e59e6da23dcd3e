pub mod access;
pub mod cache;
pub mod cluster_reconciler;
pub mod context;
pub mod database_reconciler;
pub mod error;
pub mod firewall;
pub mod outcome;
pub mod user_reconciler;

pub use access::SelfAccessGrant;
pub use cache::{ClusterCache, ClusterEntry};
pub use cluster_reconciler::{ClusterSpec, ProvisionState};
pub use context::Session;
pub use error::{CopyStage, Error, Result};
pub use firewall::{RuleDiff, diff_rules};
pub use outcome::Outcome;
pub use user_reconciler::{UserConnections, pool_name};
