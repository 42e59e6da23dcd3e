use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::signal;
use tracing::{error, info, warn};

use cluster_reconciler::resources::address::DEFAULT_DISCOVERY_URL;
use cluster_reconciler::resources::{
    AddressSource, HttpAddressSource, StaticAddressSource, TokioProcessRunner,
};
use cluster_reconciler::{
    ApiConfig, DatabaseApi, HttpApiClient, Manifest, Metrics, ReconcilerConfig, Session,
};

/// Time left to detached rollbacks after an interrupt
const SHUTDOWN_GRACE_PERIOD_SECS: u64 = 5;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Logs go to stderr, stdout carries the report
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("cluster_reconciler=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let manifest_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .ok_or("usage: cluster-reconciler <manifest.json>")?;

    let config = ReconcilerConfig::from_env()?;
    let api_config = ApiConfig::from_env()?;
    let manifest = Manifest::from_path(&manifest_path).await?;

    info!(
        manifest = %manifest_path.display(),
        api = %api_config.base_url,
        "Starting cluster-reconciler"
    );

    let api: Arc<dyn DatabaseApi> = Arc::new(HttpApiClient::new(&api_config)?);
    let address: Arc<dyn AddressSource> = match &config.public_address {
        Some(address) => Arc::new(StaticAddressSource(address.clone())),
        None => Arc::new(HttpAddressSource::new(DEFAULT_DISCOVERY_URL)?),
    };
    let metrics = Arc::new(Metrics::new());
    let metrics_file = config.metrics_file.clone();

    let mut session = Session::new(api, address, Arc::new(TokioProcessRunner), config)
        .with_metrics(Arc::clone(&metrics));

    let applied = tokio::select! {
        result = manifest.apply(&mut session) => Some(result),
        _ = shutdown_signal() => None,
    };

    let result: Result<_, Box<dyn std::error::Error>> = match applied {
        Some(result) => result.map_err(Into::into),
        None => {
            // The abandoned apply future is gone by now, its grants have
            // scheduled their removal
            warn!("Received shutdown signal, abandoning manifest");
            tokio::time::sleep(Duration::from_secs(SHUTDOWN_GRACE_PERIOD_SECS)).await;
            Err("interrupted".into())
        }
    };

    if let Some(path) = metrics_file {
        if let Err(e) = metrics.write_textfile(&path).await {
            error!(path = %path.display(), error = %e, "Failed to write metrics");
        }
    }

    match result {
        Ok(report) => {
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Reconciliation failed");
            Err(e)
        }
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
