//! Runtime configuration
//!
//! Defaults match the control plane's documented behaviour; every value can
//! be overridden from the environment.

use std::path::PathBuf;
use std::time::Duration;

use crate::controller::error::{Error, Result};

/// How long a new cluster may take to come online
pub const DEFAULT_PROVISION_TIMEOUT: Duration = Duration::from_secs(60 * 30);
/// Delay between two status checks of a provisioning cluster
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
/// Captured stderr kept in tool failure errors
pub const DEFAULT_STDERR_LIMIT: usize = 1000;

pub const DEFAULT_API_URL: &str = "https://api.digitalocean.com/v2/";
pub const DEFAULT_API_TIMEOUT: Duration = Duration::from_secs(30);

/// Tuning of the reconciliation engine
#[derive(Clone, Debug, PartialEq)]
pub struct ReconcilerConfig {
    pub provision_timeout: Duration,
    pub poll_interval: Duration,
    pub stderr_limit: usize,
    /// Where to write prometheus metrics when the process exits
    pub metrics_file: Option<PathBuf>,
    /// Skip address discovery and grant this address instead
    pub public_address: Option<String>,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            provision_timeout: DEFAULT_PROVISION_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            stderr_limit: DEFAULT_STDERR_LIMIT,
            metrics_file: None,
            public_address: None,
        }
    }
}

impl ReconcilerConfig {
    /// Read overrides from `RECONCILER_*` environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`ReconcilerConfig::from_env`] with an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(secs) = parse_var::<u64, _>(&lookup, "RECONCILER_PROVISION_TIMEOUT_SECS")? {
            config.provision_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_var::<u64, _>(&lookup, "RECONCILER_POLL_INTERVAL_SECS")? {
            if secs == 0 {
                return Err(Error::InvalidConfig(
                    "RECONCILER_POLL_INTERVAL_SECS must be at least 1".to_string(),
                ));
            }
            config.poll_interval = Duration::from_secs(secs);
        }
        if let Some(limit) = parse_var::<usize, _>(&lookup, "RECONCILER_STDERR_LIMIT")? {
            config.stderr_limit = limit;
        }
        config.metrics_file = lookup("RECONCILER_METRICS_FILE")
            .filter(|path| !path.is_empty())
            .map(PathBuf::from);
        config.public_address = lookup("RECONCILER_PUBLIC_ADDRESS").filter(|addr| !addr.is_empty());

        Ok(config)
    }
}

/// Connection settings of the HTTP control API client
#[derive(Clone, PartialEq)]
pub struct ApiConfig {
    pub base_url: String,
    pub token: String,
    pub timeout: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_URL.to_string(),
            token: String::new(),
            timeout: DEFAULT_API_TIMEOUT,
        }
    }
}

impl std::fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiConfig")
            .field("base_url", &self.base_url)
            .field("token", &"<redacted>")
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl ApiConfig {
    /// Read `DO_API_TOKEN` (required) and `DO_API_URL`
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let token = lookup("DO_API_TOKEN")
            .filter(|token| !token.is_empty())
            .ok_or_else(|| Error::InvalidConfig("DO_API_TOKEN is not set".to_string()))?;

        let mut config = Self {
            token,
            ..Self::default()
        };
        if let Some(url) = lookup("DO_API_URL").filter(|url| !url.is_empty()) {
            config.base_url = url;
        }
        if let Some(secs) = parse_var::<u64, _>(&lookup, "DO_API_TIMEOUT_SECS")? {
            config.timeout = Duration::from_secs(secs);
        }

        Ok(config)
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| Error::InvalidConfig(format!("{} has invalid value {:?}", key, raw))),
    }
}
