//! Prometheus metrics for reconciliation calls
//!
//! A one-shot run has no scrape endpoint, so the registry is rendered in
//! text exposition format and can be dropped into a node-exporter textfile
//! directory.

use std::path::Path;

use prometheus_client::encoding::text::encode;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::histogram::{Histogram, exponential_buckets};
use prometheus_client::registry::Registry;

/// Labels for reconciliation metrics
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct ReconcileLabels {
    /// Reconciliation kind (`cluster`, `firewall`, `database`, `user`)
    pub kind: String,
}

impl prometheus_client::encoding::EncodeLabelSet for ReconcileLabels {
    fn encode(
        &self,
        mut encoder: prometheus_client::encoding::LabelSetEncoder<'_>,
    ) -> Result<(), std::fmt::Error> {
        use prometheus_client::encoding::EncodeLabel;
        ("kind", self.kind.as_str()).encode(encoder.encode_label())?;
        Ok(())
    }
}

pub struct Metrics {
    /// Total reconciliations counter
    pub reconciliations_total: Family<ReconcileLabels, Counter>,
    /// Reconciliations that mutated remote state
    pub reconciliation_changes_total: Family<ReconcileLabels, Counter>,
    /// Failed reconciliations counter
    pub reconciliation_errors_total: Family<ReconcileLabels, Counter>,
    /// Time spent waiting for clusters to come online
    pub provision_wait_seconds: Histogram,

    registry: Registry,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics").finish_non_exhaustive()
    }
}

impl Metrics {
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let reconciliations_total = Family::<ReconcileLabels, Counter>::default();
        registry.register(
            "cluster_reconciler_reconciliations",
            "Total number of reconciliations",
            reconciliations_total.clone(),
        );

        let reconciliation_changes_total = Family::<ReconcileLabels, Counter>::default();
        registry.register(
            "cluster_reconciler_reconciliation_changes",
            "Total number of reconciliations that changed remote state",
            reconciliation_changes_total.clone(),
        );

        let reconciliation_errors_total = Family::<ReconcileLabels, Counter>::default();
        registry.register(
            "cluster_reconciler_reconciliation_errors",
            "Total number of reconciliation errors",
            reconciliation_errors_total.clone(),
        );

        let provision_wait_seconds = Histogram::new(exponential_buckets(5.0, 2.0, 10));
        registry.register(
            "cluster_reconciler_provision_wait_seconds",
            "Time spent polling for clusters to come online",
            provision_wait_seconds.clone(),
        );

        Self {
            reconciliations_total,
            reconciliation_changes_total,
            reconciliation_errors_total,
            provision_wait_seconds,
            registry,
        }
    }

    /// Record the result of one reconciliation call
    pub fn record(&self, kind: &str, changed: Option<bool>) {
        let labels = ReconcileLabels {
            kind: kind.to_string(),
        };
        self.reconciliations_total.get_or_create(&labels).inc();
        match changed {
            Some(true) => {
                self.reconciliation_changes_total
                    .get_or_create(&labels)
                    .inc();
            }
            Some(false) => {}
            None => {
                self.reconciliation_errors_total
                    .get_or_create(&labels)
                    .inc();
            }
        }
    }

    pub fn observe_provision_wait(&self, secs: f64) {
        self.provision_wait_seconds.observe(secs);
    }

    /// Encode metrics to Prometheus text format
    ///
    /// Returns an empty string if encoding fails (should never happen with valid metrics).
    pub fn encode(&self) -> String {
        let mut buffer = String::new();
        if let Err(e) = encode(&mut buffer, &self.registry) {
            tracing::error!("Failed to encode metrics: {}", e);
            return String::new();
        }
        buffer
    }

    /// Write the encoded registry to `path`
    pub async fn write_textfile(&self, path: &Path) -> std::io::Result<()> {
        tokio::fs::write(path, self.encode()).await
    }
}
