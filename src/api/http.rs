//! HTTP implementation of [`DatabaseApi`]
//!
//! Every response body wraps the payload in a resource-specific key
//! (`{"database": {...}}`, `{"rules": [...]}`); listings that paginate also
//! carry `{"meta": {"total": N}}`. Names are percent-encoded as single path
//! segments.

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, error};
use url::Url;

use super::models::{
    Cluster, ClusterCreate, ConnectionPool, Database, DatabaseUser, Droplet, FirewallRule,
    FirewallRuleCreate, PoolCreate, UserCreate,
};
use super::{ApiResult, DatabaseApi, Page, RemoteError};
use crate::config::ApiConfig;

impl From<reqwest::Error> for RemoteError {
    fn from(e: reqwest::Error) -> Self {
        match e.status() {
            Some(status) => RemoteError::new(status.as_u16(), e.to_string()),
            None => RemoteError::transport(e.to_string()),
        }
    }
}

/// Control API client authenticated with a bearer token
#[derive(Clone)]
pub struct HttpApiClient {
    http: Client,
    base_url: Url,
    token: String,
}

impl std::fmt::Debug for HttpApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpApiClient")
            .field("base_url", &self.base_url.as_str())
            .finish_non_exhaustive()
    }
}

impl HttpApiClient {
    pub fn new(config: &ApiConfig) -> ApiResult<Self> {
        let base_url = Url::parse(&config.base_url)
            .map_err(|e| RemoteError::transport(format!("invalid API url: {}", e)))?;
        if base_url.cannot_be_a_base() {
            return Err(RemoteError::transport(format!(
                "invalid API url: {}",
                config.base_url
            )));
        }

        let http = Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            http,
            base_url,
            token: config.token.clone(),
        })
    }

    /// Resolve path segments against the base url, percent-encoding each one
    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn page_url(&self, segments: &[&str], page: u32) -> Url {
        let mut url = self.url(segments);
        url.query_pairs_mut().append_pair("page", &page.to_string());
        url
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        debug!(method = %method, url = %url, "Request");
        self.http.request(method, url).bearer_auth(&self.token)
    }

    /// Send a request and decode the JSON body; 204 answers decode to `Null`
    async fn send(&self, builder: RequestBuilder) -> ApiResult<Value> {
        let response = builder.send().await?;
        let status = response.status();

        if status == StatusCode::NO_CONTENT {
            return Ok(Value::Null);
        }

        let body: Value = match response.bytes().await {
            Ok(bytes) if bytes.is_empty() => Value::Null,
            Ok(bytes) => serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).to_string())),
            Err(e) => return Err(e.into()),
        };

        if !status.is_success() {
            error!(status = status.as_u16(), body = %body, "API error");
            let message = body
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| status.to_string());
            return Err(RemoteError::new(status.as_u16(), message).with_body(body));
        }

        Ok(body)
    }

    async fn get_json(&self, segments: &[&str]) -> ApiResult<Value> {
        self.send(self.request(Method::GET, self.url(segments))).await
    }

    async fn post_json<B: Serialize + ?Sized>(
        &self,
        segments: &[&str],
        body: &B,
    ) -> ApiResult<Value> {
        self.send(self.request(Method::POST, self.url(segments)).json(body))
            .await
    }

    async fn put_json<B: Serialize + ?Sized>(
        &self,
        segments: &[&str],
        body: &B,
    ) -> ApiResult<Value> {
        self.send(self.request(Method::PUT, self.url(segments)).json(body))
            .await
    }

    async fn delete(&self, segments: &[&str]) -> ApiResult<()> {
        self.send(self.request(Method::DELETE, self.url(segments)))
            .await?;
        Ok(())
    }

    async fn get_page(&self, segments: &[&str], page: u32) -> ApiResult<Value> {
        self.send(self.request(Method::GET, self.page_url(segments, page)))
            .await
    }
}

/// Pull the payload out of its envelope key
fn extract<T: DeserializeOwned>(mut body: Value, key: &str) -> ApiResult<T> {
    let payload = body
        .get_mut(key)
        .map(Value::take)
        .ok_or_else(|| RemoteError::transport(format!("response has no `{}` key", key)))?;

    serde_json::from_value(payload)
        .map_err(|e| RemoteError::transport(format!("cannot decode `{}`: {}", key, e)))
}

/// Decode one page of a listing
///
/// Entries this client cannot decode (newer engines, unknown fields) are
/// left out of `items` but still counted, and their names are reported in
/// `skipped`.
fn lenient_page<T: DeserializeOwned>(mut body: Value, key: &str) -> Page<T> {
    let total = body
        .get("meta")
        .and_then(|meta| meta.get("total"))
        .and_then(Value::as_u64);

    let entries = match body.get_mut(key).map(Value::take) {
        Some(Value::Array(entries)) => entries,
        _ => Vec::new(),
    };
    let fetched = entries.len() as u64;

    let mut items = Vec::with_capacity(entries.len());
    let mut skipped = Vec::new();
    for entry in entries {
        let name = entry.get("name").and_then(Value::as_str).map(str::to_string);
        match serde_json::from_value(entry) {
            Ok(item) => items.push(item),
            Err(e) => {
                debug!(key = %key, name = ?name, error = %e, "Skipping unrecognised entry");
                skipped.extend(name);
            }
        }
    }

    Page::new(items, total).with_skipped(fetched, skipped)
}

#[async_trait]
impl DatabaseApi for HttpApiClient {
    async fn list_clusters(&self, page: u32) -> ApiResult<Page<Cluster>> {
        let body = self.get_page(&["databases"], page).await?;
        Ok(lenient_page(body, "databases"))
    }

    async fn get_cluster(&self, cluster_id: &str) -> ApiResult<Cluster> {
        extract(
            self.get_json(&["databases", cluster_id]).await?,
            "database",
        )
    }

    async fn create_cluster(&self, spec: &ClusterCreate) -> ApiResult<Cluster> {
        extract(self.post_json(&["databases"], spec).await?, "database")
    }

    async fn list_databases(&self, cluster_id: &str, page: u32) -> ApiResult<Page<Database>> {
        let body = self.get_page(&["databases", cluster_id, "dbs"], page).await?;
        Ok(lenient_page(body, "dbs"))
    }

    async fn create_database(&self, cluster_id: &str, database: &Database) -> ApiResult<Database> {
        extract(
            self.post_json(&["databases", cluster_id, "dbs"], database)
                .await?,
            "db",
        )
    }

    async fn delete_database(&self, cluster_id: &str, name: &str) -> ApiResult<()> {
        self.delete(&["databases", cluster_id, "dbs", name]).await
    }

    async fn list_firewall_rules(&self, cluster_id: &str) -> ApiResult<Vec<FirewallRule>> {
        extract(
            self.get_json(&["databases", cluster_id, "firewall"])
                .await?,
            "rules",
        )
    }

    async fn update_firewall_rules(
        &self,
        cluster_id: &str,
        rules: &[FirewallRuleCreate],
    ) -> ApiResult<()> {
        self.put_json(
            &["databases", cluster_id, "firewall"],
            &serde_json::json!({ "rules": rules }),
        )
        .await?;
        Ok(())
    }

    async fn list_users(&self, cluster_id: &str) -> ApiResult<Vec<DatabaseUser>> {
        extract(
            self.get_json(&["databases", cluster_id, "users"]).await?,
            "users",
        )
    }

    async fn create_user(&self, cluster_id: &str, user: &UserCreate) -> ApiResult<DatabaseUser> {
        extract(
            self.post_json(&["databases", cluster_id, "users"], user)
                .await?,
            "user",
        )
    }

    async fn delete_user(&self, cluster_id: &str, name: &str) -> ApiResult<()> {
        self.delete(&["databases", cluster_id, "users", name]).await
    }

    async fn list_pools(&self, cluster_id: &str) -> ApiResult<Vec<ConnectionPool>> {
        extract(
            self.get_json(&["databases", cluster_id, "pools"]).await?,
            "pools",
        )
    }

    async fn create_pool(&self, cluster_id: &str, pool: &PoolCreate) -> ApiResult<ConnectionPool> {
        extract(
            self.post_json(&["databases", cluster_id, "pools"], pool)
                .await?,
            "pool",
        )
    }

    async fn delete_pool(&self, cluster_id: &str, name: &str) -> ApiResult<()> {
        self.delete(&["databases", cluster_id, "pools", name]).await
    }

    async fn list_droplets(&self, page: u32) -> ApiResult<Page<Droplet>> {
        let body = self.get_page(&["droplets"], page).await?;
        Ok(lenient_page(body, "droplets"))
    }
}
