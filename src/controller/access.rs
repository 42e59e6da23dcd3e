//! Temporary firewall access for this host
//!
//! External tools connect to a cluster from wherever the reconciler runs, so
//! the host's public address is allow-listed for the duration of the work
//! and removed afterwards, unless it was already allowed.

use std::future::Future;
use std::slice;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::api::DatabaseApi;
use crate::api::models::{Cluster, EntryState, FirewallRuleCreate};
use crate::controller::context::Session;
use crate::controller::error::Result;
use crate::controller::firewall::apply_rules;
use crate::resources::address::AddressSource;

/// Guard for an allow-listed public address
///
/// Call [`SelfAccessGrant::release`] when done. A guard dropped without
/// release (panic, cancelled future) schedules the removal on the current
/// tokio runtime.
#[must_use = "the grant has to be released"]
pub struct SelfAccessGrant {
    api: Arc<dyn DatabaseApi>,
    cluster: Cluster,
    rule: FirewallRuleCreate,
    roll_back: bool,
    released: bool,
}

impl SelfAccessGrant {
    pub async fn acquire(
        api: Arc<dyn DatabaseApi>,
        address: &dyn AddressSource,
        cluster: &Cluster,
    ) -> Result<Self> {
        let rule = FirewallRuleCreate::ip_addr(address.public_address().await?);
        let outcome = apply_rules(
            api.as_ref(),
            cluster,
            slice::from_ref(&rule),
            EntryState::Present,
        )
        .await?;

        if outcome.changed {
            info!(
                cluster = %cluster.name,
                address = %rule.value,
                "Temporarily allowed own address"
            );
        } else {
            debug!(cluster = %cluster.name, address = %rule.value, "Own address already allowed");
        }

        Ok(Self {
            api,
            cluster: cluster.clone(),
            rule,
            roll_back: outcome.changed,
            released: false,
        })
    }

    /// Address covered by this grant
    pub fn address(&self) -> &str {
        &self.rule.value
    }

    /// Whether releasing removes the rule again
    pub fn is_temporary(&self) -> bool {
        self.roll_back
    }

    pub async fn release(mut self) -> Result<()> {
        if !self.roll_back {
            self.released = true;
            return Ok(());
        }

        let result = apply_rules(
            self.api.as_ref(),
            &self.cluster,
            slice::from_ref(&self.rule),
            EntryState::Absent,
        )
        .await;
        self.released = true;

        if result.is_ok() {
            info!(
                cluster = %self.cluster.name,
                address = %self.rule.value,
                "Removed temporary access rule"
            );
        }
        result.map(|_| ())
    }
}

impl Drop for SelfAccessGrant {
    fn drop(&mut self) {
        if self.released || !self.roll_back {
            return;
        }

        warn!(
            cluster = %self.cluster.name,
            address = %self.rule.value,
            "Access grant dropped without release, scheduling removal"
        );
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let api = Arc::clone(&self.api);
                let cluster = self.cluster.clone();
                let rule = self.rule.clone();
                handle.spawn(async move {
                    if let Err(e) = apply_rules(
                        api.as_ref(),
                        &cluster,
                        slice::from_ref(&rule),
                        EntryState::Absent,
                    )
                    .await
                    {
                        error!(
                            cluster = %cluster.name,
                            address = %rule.value,
                            error = %e,
                            "Failed to remove temporary access rule"
                        );
                    }
                });
            }
            Err(_) => error!(
                cluster = %self.cluster.name,
                address = %self.rule.value,
                "No runtime left to remove temporary access rule"
            ),
        }
    }
}

impl Session {
    /// Run `body` while this host is allowed through the cluster firewall
    ///
    /// The grant is released whatever `body` returns; when both fail the
    /// body's error is reported.
    pub async fn with_self_access<T, F>(&self, cluster: &Cluster, body: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let grant =
            SelfAccessGrant::acquire(Arc::clone(&self.api), self.address.as_ref(), cluster).await?;

        let result = body.await;

        match (result, grant.release().await) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(release_err)) => Err(release_err),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(release_err)) => {
                warn!(
                    cluster = %cluster.name,
                    error = %release_err,
                    "Failed to remove temporary access rule"
                );
                Err(e)
            }
        }
    }
}
