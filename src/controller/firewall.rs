//! Firewall rule reconciliation
//!
//! The control plane only accepts the complete rule set on update, so a
//! reconciliation reads the current rules, computes the full replacement
//! and writes it back when it differs.

use std::collections::BTreeSet;
use std::slice;

use tracing::{debug, info};

use crate::api::models::{Cluster, EntryState, FirewallRule, FirewallRuleCreate};
use crate::api::{DatabaseApi, collect_paged};
use crate::controller::context::Session;
use crate::controller::error::{Error, Result};
use crate::controller::outcome::Outcome;

/// Replacement rule set computed by [`diff_rules`]
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RuleDiff {
    /// Full rule list to submit
    pub rules: Vec<FirewallRuleCreate>,
    pub added: Vec<FirewallRuleCreate>,
    pub removed: Vec<FirewallRuleCreate>,
    pub changed: bool,
}

/// Compute the rule set that brings `desired` into `state`
///
/// Rules are identified by `(type, value)`; ordering is irrelevant and
/// duplicates in `desired` collapse. Current rules unrelated to `desired`
/// are always kept.
pub fn diff_rules(
    current: &[FirewallRule],
    desired: &[FirewallRuleCreate],
    state: EntryState,
) -> RuleDiff {
    let mut wanted: BTreeSet<FirewallRuleCreate> = desired.iter().cloned().collect();
    let mut diff = RuleDiff::default();

    match state {
        EntryState::Present => {
            for rule in current {
                let key = rule.key();
                wanted.remove(&key);
                diff.rules.push(key);
            }
            diff.added = wanted.into_iter().collect();
            diff.rules.extend(diff.added.iter().cloned());
            diff.changed = !diff.added.is_empty();
        }
        EntryState::Absent => {
            for rule in current {
                let key = rule.key();
                if wanted.contains(&key) {
                    diff.removed.push(key);
                } else {
                    diff.rules.push(key);
                }
            }
            diff.changed = !diff.removed.is_empty();
        }
    }

    diff
}

/// Reconcile `desired` on a known cluster
pub(crate) async fn apply_rules(
    api: &dyn DatabaseApi,
    cluster: &Cluster,
    desired: &[FirewallRuleCreate],
    state: EntryState,
) -> Result<Outcome> {
    let current = api.list_firewall_rules(&cluster.id).await?;
    let diff = diff_rules(&current, desired, state);

    if !diff.changed {
        debug!(cluster = %cluster.name, state = %state, "Firewall rules already converged");
        return Ok(Outcome::unchanged());
    }

    info!(
        cluster = %cluster.name,
        added = diff.added.len(),
        removed = diff.removed.len(),
        "Updating firewall rules"
    );
    api.update_firewall_rules(&cluster.id, &diff.rules).await?;
    Ok(Outcome::new(true))
}

impl Session {
    /// Bring `rules` into `state` on the named cluster
    pub async fn reconcile_rules(
        &mut self,
        cluster_name: &str,
        rules: &[FirewallRuleCreate],
        state: EntryState,
    ) -> Result<Outcome> {
        let result = async {
            let cluster = self.require_cluster(cluster_name).await?;
            apply_rules(self.api.as_ref(), &cluster, rules, state).await
        }
        .await;
        self.observe("firewall", result)
    }

    /// Allow the named droplets to reach the cluster
    ///
    /// Fails without writing anything when a name does not match a droplet.
    pub async fn allow_droplets(
        &mut self,
        cluster_name: &str,
        droplet_names: &[String],
    ) -> Result<Outcome> {
        let result = async {
            let cluster = self.require_cluster(cluster_name).await?;

            let api = self.api.as_ref();
            let droplets = collect_paged(|page| api.list_droplets(page)).await?;

            let mut missing: BTreeSet<&str> = droplet_names.iter().map(String::as_str).collect();
            let rules: Vec<FirewallRuleCreate> = droplets
                .iter()
                .filter(|droplet| missing.remove(droplet.name.as_str()))
                .map(|droplet| FirewallRuleCreate::droplet(droplet.id))
                .collect();

            if !missing.is_empty() {
                return Err(Error::DropletsNotFound(
                    missing.into_iter().map(str::to_string).collect(),
                ));
            }

            apply_rules(api, &cluster, &rules, EntryState::Present).await
        }
        .await;
        self.observe("firewall", result)
    }

    /// Permanently allow this host's public address
    pub async fn allow_self(&mut self, cluster_name: &str) -> Result<Outcome> {
        let result = async {
            let cluster = self.require_cluster(cluster_name).await?;
            let address = self.address.public_address().await?;
            let rule = FirewallRuleCreate::ip_addr(address);
            apply_rules(
                self.api.as_ref(),
                &cluster,
                slice::from_ref(&rule),
                EntryState::Present,
            )
            .await
        }
        .await;
        self.observe("firewall", result)
    }
}
