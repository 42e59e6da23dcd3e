//! Desired-state manifest
//!
//! A JSON document listing clusters, firewall rules, databases and users.
//! Sections are applied in that order, so databases exist before users are
//! given ownership inside them. Application stops at the first error.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::api::models::{EntryState, FirewallRuleCreate};
use crate::controller::cluster_reconciler::ClusterSpec;
use crate::controller::context::Session;
use crate::controller::error::Result;
use crate::controller::outcome::Outcome;

fn default_pool_size() -> u32 {
    1
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
pub struct Manifest {
    #[serde(default)]
    pub clusters: Vec<ClusterSpec>,
    #[serde(default)]
    pub firewall: Vec<FirewallEntry>,
    #[serde(default)]
    pub databases: Vec<DatabaseEntry>,
    #[serde(default)]
    pub users: Vec<UserEntry>,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct FirewallEntry {
    pub cluster: String,
    #[serde(default)]
    pub rules: Vec<FirewallRuleCreate>,
    /// Droplet names, allowed by id
    #[serde(default)]
    pub droplets: Vec<String>,
    /// Permanently allow this host
    #[serde(default)]
    pub allow_self: bool,
    #[serde(default)]
    pub state: EntryState,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct DatabaseEntry {
    pub cluster: String,
    pub name: String,
    #[serde(default)]
    pub state: EntryState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub copy_from: Option<String>,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct UserEntry {
    pub cluster: String,
    pub name: String,
    pub database: String,
    #[serde(default)]
    pub state: EntryState,
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,
}

/// One line of the apply report
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct ReportEntry {
    pub kind: &'static str,
    pub target: String,
    pub changed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<serde_json::Value>,
}

impl ReportEntry {
    fn new<T: Serialize>(kind: &'static str, target: String, outcome: Outcome<T>) -> Result<Self> {
        let output = outcome.output.map(serde_json::to_value).transpose()?;
        Ok(Self {
            kind,
            target,
            changed: outcome.changed,
            output,
        })
    }
}

impl Manifest {
    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    pub async fn from_path(path: &Path) -> Result<Self> {
        let raw = tokio::fs::read_to_string(path).await?;
        Self::from_json(&raw)
    }

    /// Apply every entry in order and report what each call did
    pub async fn apply(&self, session: &mut Session) -> Result<Vec<ReportEntry>> {
        let mut report = Vec::new();

        for spec in &self.clusters {
            let outcome = session.ensure_cluster(spec).await?;
            report.push(ReportEntry::new("cluster", spec.name.clone(), outcome)?);
        }

        for entry in &self.firewall {
            if !entry.rules.is_empty() {
                let outcome = session
                    .reconcile_rules(&entry.cluster, &entry.rules, entry.state)
                    .await?;
                report.push(ReportEntry::new("firewall", entry.cluster.clone(), outcome)?);
            }
            if !entry.droplets.is_empty() {
                let outcome = session
                    .allow_droplets(&entry.cluster, &entry.droplets)
                    .await?;
                report.push(ReportEntry::new("droplets", entry.cluster.clone(), outcome)?);
            }
            if entry.allow_self {
                let outcome = session.allow_self(&entry.cluster).await?;
                report.push(ReportEntry::new("self_access", entry.cluster.clone(), outcome)?);
            }
        }

        for entry in &self.databases {
            let outcome = session
                .ensure_database(
                    &entry.cluster,
                    &entry.name,
                    entry.state,
                    entry.copy_from.as_deref(),
                )
                .await?;
            report.push(ReportEntry::new(
                "database",
                format!("{}/{}", entry.cluster, entry.name),
                outcome,
            )?);
        }

        for entry in &self.users {
            let outcome = session
                .ensure_user(
                    &entry.cluster,
                    &entry.name,
                    &entry.database,
                    entry.state,
                    entry.pool_size,
                )
                .await?;
            report.push(ReportEntry::new(
                "user",
                format!("{}/{}", entry.cluster, entry.name),
                outcome,
            )?);
        }

        let changed = report.iter().filter(|entry| entry.changed).count();
        info!(entries = report.len(), changed, "Manifest applied");
        Ok(report)
    }
}
