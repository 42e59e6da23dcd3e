//! Public address discovery
//!
//! Temporary firewall grants need the address the control plane sees this
//! host connecting from.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::controller::error::{Error, Result};

pub const DEFAULT_DISCOVERY_URL: &str = "https://httpbin.org/get";

#[async_trait]
pub trait AddressSource: Send + Sync {
    async fn public_address(&self) -> Result<String>;
}

/// Asks an echo service which address the request came from
#[derive(Clone, Debug)]
pub struct HttpAddressSource {
    http: reqwest::Client,
    url: String,
}

#[derive(Deserialize)]
struct EchoResponse {
    origin: String,
}

impl HttpAddressSource {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| Error::AddressDiscovery(e.to_string()))?;
        Ok(Self {
            http,
            url: url.into(),
        })
    }
}

#[async_trait]
impl AddressSource for HttpAddressSource {
    async fn public_address(&self) -> Result<String> {
        let response = self
            .http
            .get(&self.url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| Error::AddressDiscovery(e.to_string()))?;

        let echo: EchoResponse = response
            .json()
            .await
            .map_err(|e| Error::AddressDiscovery(e.to_string()))?;

        let address = parse_origin(&echo.origin)?;
        debug!(address = %address, "Discovered public address");
        Ok(address)
    }
}

/// Fixed address, for hosts whose egress address is known in advance
#[derive(Clone, Debug)]
pub struct StaticAddressSource(pub String);

#[async_trait]
impl AddressSource for StaticAddressSource {
    async fn public_address(&self) -> Result<String> {
        Ok(self.0.clone())
    }
}

/// Behind proxies the echoed origin is a comma-separated chain; the first hop
/// is the client
fn parse_origin(origin: &str) -> Result<String> {
    origin
        .split(',')
        .map(str::trim)
        .find(|hop| !hop.is_empty())
        .map(str::to_string)
        .ok_or_else(|| Error::AddressDiscovery(format!("unusable origin {:?}", origin)))
}
