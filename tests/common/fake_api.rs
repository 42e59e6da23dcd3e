//! In-memory control plane
//!
//! Behaves like the managed database API closely enough for reconciliation:
//! paginated listings, clusters that come online after a number of status
//! checks, whole-set firewall updates. Every mutating call is logged so tests
//! can assert on remote writes.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use cluster_reconciler::api::models::{
    Cluster, ClusterCreate, ClusterStatus, Connection, ConnectionPool, Database, DatabaseUser,
    Droplet, FirewallRule, FirewallRuleCreate, PoolCreate, UserCreate, UserRole,
};
use cluster_reconciler::api::{ApiResult, DatabaseApi, Page, RemoteError};

use super::fixtures::{private_connection, public_connection};

#[derive(Default)]
struct State {
    clusters: Vec<Cluster>,
    /// Listed ahead of `clusters` but never decodable by the client
    unreadable_clusters: Vec<String>,
    databases: HashMap<String, Vec<Database>>,
    rules: HashMap<String, Vec<FirewallRule>>,
    users: HashMap<String, Vec<DatabaseUser>>,
    pools: HashMap<String, Vec<ConnectionPool>>,
    droplets: Vec<Droplet>,

    /// Status checks before a creating cluster turns online, `None` for never
    online_after: Option<u32>,
    status_checks: HashMap<String, u32>,
    page_size: usize,
    fail_rule_updates: bool,

    writes: Vec<String>,
    cluster_list_calls: u32,
    next_rule: u32,
}

pub struct FakeApi {
    state: Mutex<State>,
}

impl Default for FakeApi {
    fn default() -> Self {
        Self::new()
    }
}

fn paginate<T: Clone>(items: &[T], page: u32, page_size: usize) -> Page<T> {
    let start = (page.saturating_sub(1) as usize) * page_size;
    let chunk = items.iter().skip(start).take(page_size).cloned().collect();
    Page::new(chunk, Some(items.len() as u64))
}

fn not_found(what: &str) -> RemoteError {
    RemoteError::new(404, format!("{} not found", what))
}

impl FakeApi {
    /// Empty backend; new clusters come online on the first status check
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                online_after: Some(1),
                page_size: 2,
                ..State::default()
            }),
        }
    }

    // =========================================================================
    // Seeding
    // =========================================================================

    pub fn add_cluster(&self, cluster: Cluster) {
        self.state.lock().unwrap().clusters.push(cluster);
    }

    /// List an entry under `name` that the client cannot decode (e.g. an
    /// engine it does not know); these come before every regular cluster
    pub fn add_unreadable_cluster(&self, name: &str) {
        self.state
            .lock()
            .unwrap()
            .unreadable_clusters
            .push(name.to_string());
    }

    pub fn add_database(&self, cluster_id: &str, name: &str) {
        let mut state = self.state.lock().unwrap();
        state
            .databases
            .entry(cluster_id.to_string())
            .or_default()
            .push(Database::new(name));
    }

    pub fn add_rule(&self, cluster_id: &str, rule: FirewallRuleCreate) {
        let mut state = self.state.lock().unwrap();
        let applied = state.applied_rule(cluster_id, rule);
        state
            .rules
            .entry(cluster_id.to_string())
            .or_default()
            .push(applied);
    }

    pub fn add_user(&self, cluster_id: &str, name: &str, password: &str) {
        self.state
            .lock()
            .unwrap()
            .users
            .entry(cluster_id.to_string())
            .or_default()
            .push(DatabaseUser {
                name: name.to_string(),
                role: UserRole::Normal,
                password: password.to_string(),
                mysql_settings: None,
            });
    }

    pub fn add_droplet(&self, id: u64, name: &str) {
        self.state.lock().unwrap().droplets.push(Droplet {
            id,
            name: name.to_string(),
        });
    }

    pub fn set_online_after(&self, checks: Option<u32>) {
        self.state.lock().unwrap().online_after = checks;
    }

    pub fn set_page_size(&self, page_size: usize) {
        self.state.lock().unwrap().page_size = page_size;
    }

    /// Make every following firewall update fail with a server error
    pub fn set_fail_rule_updates(&self, fail: bool) {
        self.state.lock().unwrap().fail_rule_updates = fail;
    }

    // =========================================================================
    // Inspection
    // =========================================================================

    /// Mutating calls in order, e.g. `create_user:orders`
    pub fn writes(&self) -> Vec<String> {
        self.state.lock().unwrap().writes.clone()
    }

    pub fn write_count(&self) -> usize {
        self.state.lock().unwrap().writes.len()
    }

    pub fn cluster_list_calls(&self) -> u32 {
        self.state.lock().unwrap().cluster_list_calls
    }

    pub fn status_checks(&self, cluster_id: &str) -> u32 {
        self.state
            .lock()
            .unwrap()
            .status_checks
            .get(cluster_id)
            .copied()
            .unwrap_or(0)
    }

    pub fn cluster(&self, name: &str) -> Option<Cluster> {
        self.state
            .lock()
            .unwrap()
            .clusters
            .iter()
            .find(|c| c.name == name)
            .cloned()
    }

    pub fn rules(&self, cluster_id: &str) -> Vec<FirewallRuleCreate> {
        self.state
            .lock()
            .unwrap()
            .rules
            .get(cluster_id)
            .map(|rules| rules.iter().map(FirewallRule::key).collect())
            .unwrap_or_default()
    }

    pub fn databases(&self, cluster_id: &str) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .databases
            .get(cluster_id)
            .map(|dbs| dbs.iter().map(|db| db.name.clone()).collect())
            .unwrap_or_default()
    }

    pub fn users(&self, cluster_id: &str) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .users
            .get(cluster_id)
            .map(|users| users.iter().map(|u| u.name.clone()).collect())
            .unwrap_or_default()
    }

    pub fn pools(&self, cluster_id: &str) -> Vec<ConnectionPool> {
        self.state
            .lock()
            .unwrap()
            .pools
            .get(cluster_id)
            .cloned()
            .unwrap_or_default()
    }
}

impl State {
    fn record(&mut self, call: &str, target: &str) {
        self.writes.push(format!("{}:{}", call, target));
    }

    fn applied_rule(&mut self, cluster_id: &str, rule: FirewallRuleCreate) -> FirewallRule {
        self.next_rule += 1;
        FirewallRule {
            uuid: format!("rule-{}", self.next_rule),
            cluster_uuid: cluster_id.to_string(),
            rule_type: rule.rule_type,
            value: rule.value,
            created_at: Utc::now(),
        }
    }

    fn cluster_mut(&mut self, cluster_id: &str) -> ApiResult<&mut Cluster> {
        self.clusters
            .iter_mut()
            .find(|c| c.id == cluster_id)
            .ok_or_else(|| not_found("cluster"))
    }
}

#[async_trait]
impl DatabaseApi for FakeApi {
    async fn list_clusters(&self, page: u32) -> ApiResult<Page<Cluster>> {
        let mut state = self.state.lock().unwrap();
        state.cluster_list_calls += 1;

        let listing: Vec<Result<Cluster, String>> = state
            .unreadable_clusters
            .iter()
            .cloned()
            .map(Err)
            .chain(state.clusters.iter().cloned().map(Ok))
            .collect();
        let Page { items, total, .. } = paginate(&listing, page, state.page_size);
        let fetched = items.len() as u64;
        let (readable, unreadable): (Vec<_>, Vec<_>) = items.into_iter().partition(Result::is_ok);
        Ok(Page::new(readable.into_iter().flatten().collect(), total).with_skipped(
            fetched,
            unreadable.into_iter().filter_map(Result::err).collect(),
        ))
    }

    async fn get_cluster(&self, cluster_id: &str) -> ApiResult<Cluster> {
        let mut state = self.state.lock().unwrap();
        let checks = {
            let counter = state.status_checks.entry(cluster_id.to_string()).or_insert(0);
            *counter += 1;
            *counter
        };
        let online_after = state.online_after;
        let cluster = state.cluster_mut(cluster_id)?;
        if cluster.status == ClusterStatus::Creating
            && online_after.is_some_and(|after| checks >= after)
        {
            cluster.status = ClusterStatus::Online;
        }
        Ok(cluster.clone())
    }

    async fn create_cluster(&self, spec: &ClusterCreate) -> ApiResult<Cluster> {
        let mut state = self.state.lock().unwrap();
        if state.clusters.iter().any(|c| c.name == spec.name) {
            return Err(RemoteError::new(422, "name is already in use"));
        }
        state.record("create_cluster", &spec.name);

        let cluster = Cluster {
            id: format!("id-{}", spec.name),
            name: spec.name.clone(),
            engine: spec.engine,
            version: spec.version.clone(),
            connection: public_connection(&spec.name),
            private_connection: private_connection(&spec.name),
            num_nodes: spec.num_nodes,
            size: spec.size.clone(),
            region: spec.region.clone(),
            status: ClusterStatus::Creating,
            created_at: Utc::now(),
            private_network_uuid: spec.private_network_uuid.clone(),
            db_names: None,
            tags: spec.tags.clone(),
            maintenance_window: None,
        };
        state.clusters.push(cluster.clone());
        Ok(cluster)
    }

    async fn list_databases(&self, cluster_id: &str, page: u32) -> ApiResult<Page<Database>> {
        let state = self.state.lock().unwrap();
        let dbs = state.databases.get(cluster_id).cloned().unwrap_or_default();
        Ok(paginate(&dbs, page, state.page_size))
    }

    async fn create_database(&self, cluster_id: &str, database: &Database) -> ApiResult<Database> {
        let mut state = self.state.lock().unwrap();
        state.record("create_database", &database.name);
        state
            .databases
            .entry(cluster_id.to_string())
            .or_default()
            .push(database.clone());
        Ok(database.clone())
    }

    async fn delete_database(&self, cluster_id: &str, name: &str) -> ApiResult<()> {
        let mut state = self.state.lock().unwrap();
        state.record("delete_database", name);
        let dbs = state.databases.entry(cluster_id.to_string()).or_default();
        let before = dbs.len();
        dbs.retain(|db| db.name != name);
        if dbs.len() == before {
            return Err(not_found("database"));
        }
        Ok(())
    }

    async fn list_firewall_rules(&self, cluster_id: &str) -> ApiResult<Vec<FirewallRule>> {
        let state = self.state.lock().unwrap();
        Ok(state.rules.get(cluster_id).cloned().unwrap_or_default())
    }

    async fn update_firewall_rules(
        &self,
        cluster_id: &str,
        rules: &[FirewallRuleCreate],
    ) -> ApiResult<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_rule_updates {
            return Err(RemoteError::new(500, "firewall update failed"));
        }
        state.record("update_firewall_rules", cluster_id);
        let applied = rules
            .iter()
            .cloned()
            .map(|rule| state.applied_rule(cluster_id, rule))
            .collect();
        state.rules.insert(cluster_id.to_string(), applied);
        Ok(())
    }

    async fn list_users(&self, cluster_id: &str) -> ApiResult<Vec<DatabaseUser>> {
        let state = self.state.lock().unwrap();
        Ok(state.users.get(cluster_id).cloned().unwrap_or_default())
    }

    async fn create_user(&self, cluster_id: &str, user: &UserCreate) -> ApiResult<DatabaseUser> {
        let mut state = self.state.lock().unwrap();
        state.record("create_user", &user.name);
        let created = DatabaseUser {
            name: user.name.clone(),
            role: UserRole::Normal,
            password: format!("pw-{}", user.name),
            mysql_settings: user.mysql_settings.clone(),
        };
        state
            .users
            .entry(cluster_id.to_string())
            .or_default()
            .push(created.clone());
        Ok(created)
    }

    async fn delete_user(&self, cluster_id: &str, name: &str) -> ApiResult<()> {
        let mut state = self.state.lock().unwrap();
        state.record("delete_user", name);
        let users = state.users.entry(cluster_id.to_string()).or_default();
        let before = users.len();
        users.retain(|u| u.name != name);
        if users.len() == before {
            return Err(not_found("user"));
        }
        Ok(())
    }

    async fn list_pools(&self, cluster_id: &str) -> ApiResult<Vec<ConnectionPool>> {
        let state = self.state.lock().unwrap();
        Ok(state.pools.get(cluster_id).cloned().unwrap_or_default())
    }

    async fn create_pool(&self, cluster_id: &str, pool: &PoolCreate) -> ApiResult<ConnectionPool> {
        let mut state = self.state.lock().unwrap();
        state.record("create_pool", &pool.name);

        let cluster_name = state
            .clusters
            .iter()
            .find(|c| c.id == cluster_id)
            .map(|c| c.name.clone())
            .ok_or_else(|| not_found("cluster"))?;
        let password = state
            .users
            .get(cluster_id)
            .and_then(|users| users.iter().find(|u| u.name == pool.user))
            .map(|u| u.password.clone())
            .unwrap_or_default();

        let routed = |base: Connection| Connection {
            host: format!("pool-{}", base.host),
            port: 25061,
            database: pool.name.clone(),
            user: pool.user.clone(),
            password: password.clone(),
            ssl: base.ssl,
        };
        let created = ConnectionPool {
            name: pool.name.clone(),
            mode: pool.mode,
            size: pool.size,
            db: pool.db.clone(),
            user: pool.user.clone(),
            connection: routed(public_connection(&cluster_name)),
            private_connection: routed(private_connection(&cluster_name)),
        };
        state
            .pools
            .entry(cluster_id.to_string())
            .or_default()
            .push(created.clone());
        Ok(created)
    }

    async fn delete_pool(&self, cluster_id: &str, name: &str) -> ApiResult<()> {
        let mut state = self.state.lock().unwrap();
        state.record("delete_pool", name);
        let pools = state.pools.entry(cluster_id.to_string()).or_default();
        let before = pools.len();
        pools.retain(|p| p.name != name);
        if pools.len() == before {
            return Err(not_found("pool"));
        }
        Ok(())
    }

    async fn list_droplets(&self, page: u32) -> ApiResult<Page<Droplet>> {
        let state = self.state.lock().unwrap();
        Ok(paginate(&state.droplets, page, state.page_size))
    }
}
