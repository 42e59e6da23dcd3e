//! Control API collaborator
//!
//! The reconcilers only talk to the control plane through [`DatabaseApi`],
//! so any transport (the bundled HTTP client, an in-memory fake) can back a
//! session.

pub mod http;
pub mod models;

use std::future::Future;

use async_trait::async_trait;
use thiserror::Error;

use models::{
    Cluster, ClusterCreate, ConnectionPool, Database, DatabaseUser, Droplet, FirewallRule,
    FirewallRuleCreate, PoolCreate, UserCreate,
};

/// Hard stop for paginated scans
pub const MAX_PAGES: u32 = 1000;

/// Failure reported by the control plane or the transport reaching it
#[derive(Error, Debug, Clone)]
#[error("{}", describe(.status, .message))]
pub struct RemoteError {
    /// HTTP status, `None` when the request never got a response
    pub status: Option<u16>,
    pub message: String,
    /// Decoded error body, when the remote sent one
    pub body: Option<serde_json::Value>,
}

fn describe(status: &Option<u16>, message: &str) -> String {
    match *status {
        Some(code) => format!("remote API error (HTTP {}): {}", code, message),
        None => format!("remote API unreachable: {}", message),
    }
}

impl RemoteError {
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            message: message.into(),
            body: None,
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            status: None,
            message: message.into(),
            body: None,
        }
    }

    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn is_not_found(&self) -> bool {
        self.status == Some(404)
    }
}

pub type ApiResult<T> = std::result::Result<T, RemoteError>;

/// One page of a paginated listing
#[derive(Clone, Debug, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Total number of items across all pages, `None` for unpaginated answers
    pub total: Option<u64>,
    /// Entries the remote returned on this page, decodable or not
    pub fetched: u64,
    /// Names of entries on this page that could not be decoded
    pub skipped: Vec<String>,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total: Option<u64>) -> Self {
        Self {
            fetched: items.len() as u64,
            items,
            total,
            skipped: Vec::new(),
        }
    }

    /// Account for `fetched` raw entries, of which the named ones were dropped
    pub fn with_skipped(mut self, fetched: u64, skipped: Vec<String>) -> Self {
        self.fetched = fetched;
        self.skipped = skipped;
        self
    }
}

/// Typed operations of the database control API
#[async_trait]
pub trait DatabaseApi: Send + Sync {
    async fn list_clusters(&self, page: u32) -> ApiResult<Page<Cluster>>;
    async fn get_cluster(&self, cluster_id: &str) -> ApiResult<Cluster>;
    async fn create_cluster(&self, spec: &ClusterCreate) -> ApiResult<Cluster>;

    async fn list_databases(&self, cluster_id: &str, page: u32) -> ApiResult<Page<Database>>;
    async fn create_database(&self, cluster_id: &str, database: &Database) -> ApiResult<Database>;
    async fn delete_database(&self, cluster_id: &str, name: &str) -> ApiResult<()>;

    async fn list_firewall_rules(&self, cluster_id: &str) -> ApiResult<Vec<FirewallRule>>;
    /// Replaces the whole rule set of the cluster
    async fn update_firewall_rules(
        &self,
        cluster_id: &str,
        rules: &[FirewallRuleCreate],
    ) -> ApiResult<()>;

    async fn list_users(&self, cluster_id: &str) -> ApiResult<Vec<DatabaseUser>>;
    async fn create_user(&self, cluster_id: &str, user: &UserCreate) -> ApiResult<DatabaseUser>;
    async fn delete_user(&self, cluster_id: &str, name: &str) -> ApiResult<()>;

    async fn list_pools(&self, cluster_id: &str) -> ApiResult<Vec<ConnectionPool>>;
    async fn create_pool(&self, cluster_id: &str, pool: &PoolCreate) -> ApiResult<ConnectionPool>;
    async fn delete_pool(&self, cluster_id: &str, name: &str) -> ApiResult<()>;

    async fn list_droplets(&self, page: u32) -> ApiResult<Page<Droplet>>;
}

/// Walk a paginated listing until `pred` matches, without fetching the
/// remaining pages
///
/// Progress is counted on raw entries so pages of undecodable entries never
/// end the scan early.
pub async fn find_paged<T, F, Fut, P>(mut fetch: F, mut pred: P) -> ApiResult<Option<T>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = ApiResult<Page<T>>>,
    P: FnMut(&T) -> bool,
{
    let mut page = 1;
    let mut seen: u64 = 0;

    while page <= MAX_PAGES {
        let Page {
            items,
            total,
            fetched,
            ..
        } = fetch(page).await?;

        if let Some(found) = items.into_iter().find(|item| pred(item)) {
            return Ok(Some(found));
        }

        seen += fetched;
        match total {
            Some(total) if fetched > 0 && seen < total => page += 1,
            _ => break,
        }
    }

    Ok(None)
}

/// Collect every item of a paginated listing
pub async fn collect_paged<T, F, Fut>(mut fetch: F) -> ApiResult<Vec<T>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = ApiResult<Page<T>>>,
{
    let mut all = Vec::new();
    let mut page = 1;
    let mut seen: u64 = 0;

    while page <= MAX_PAGES {
        let Page {
            items,
            total,
            fetched,
            ..
        } = fetch(page).await?;
        all.extend(items);

        seen += fetched;
        match total {
            Some(total) if fetched > 0 && seen < total => page += 1,
            _ => break,
        }
    }

    Ok(all)
}
