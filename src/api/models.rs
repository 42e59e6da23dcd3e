//! Resource shapes exchanged with the database control API
//!
//! Creation forms (`*Create`) omit the fields the control plane assigns once
//! the resource exists.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

/// Desired state of an entry (database, user, firewall rule)
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum EntryState {
    #[default]
    Present,
    Absent,
}

impl fmt::Display for EntryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryState::Present => write!(f, "present"),
            EntryState::Absent => write!(f, "absent"),
        }
    }
}

/// Database engine of a cluster
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Engine {
    Pg,
    Mysql,
    Redis,
    Mongo,
}

impl Engine {
    /// Version used when the caller does not ask for one
    pub fn default_version(self) -> &'static str {
        match self {
            Engine::Pg => "14",
            Engine::Mysql => "8",
            Engine::Redis => "7",
            Engine::Mongo => "4.4",
        }
    }
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Engine::Pg => write!(f, "PG"),
            Engine::Mysql => write!(f, "MYSQL"),
            Engine::Redis => write!(f, "REDIS"),
            Engine::Mongo => write!(f, "MONGO"),
        }
    }
}

/// Lifecycle status reported by the control plane
///
/// Anything other than `Online` means the cluster is not usable yet.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ClusterStatus {
    Creating,
    Online,
    Resizing,
    Migrating,
    /// Status added to the API after this client was written
    #[serde(other)]
    Unknown,
}

impl ClusterStatus {
    pub fn is_online(self) -> bool {
        self == ClusterStatus::Online
    }
}

impl fmt::Display for ClusterStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClusterStatus::Creating => write!(f, "creating"),
            ClusterStatus::Online => write!(f, "online"),
            ClusterStatus::Resizing => write!(f, "resizing"),
            ClusterStatus::Migrating => write!(f, "migrating"),
            ClusterStatus::Unknown => write!(f, "unknown"),
        }
    }
}

/// Connection parameters exposed by a cluster or a pool
#[derive(Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Connection {
    pub database: String,
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub ssl: bool,
}

impl Connection {
    /// Connection URI with every component percent-encoded
    pub fn uri(&self) -> String {
        let base = format!("postgresql://{}:{}/", self.host, self.port);
        let mut url = match Url::parse(&base) {
            Ok(url) => url,
            Err(_) => return base,
        };
        // Both setters only fail on cannot-be-a-base URLs, which this is not
        let _ = url.set_username(&self.user);
        let _ = url.set_password(Some(&self.password));
        url.path_segments_mut()
            .map(|mut segments| {
                segments.pop_if_empty().push(&self.database);
            })
            .ok();
        if self.ssl {
            url.set_query(Some("sslmode=require"));
        }
        url.to_string()
    }

    /// Environment injected into `psql`/`pg_dump` invocations
    pub fn pg_env(&self) -> Vec<(String, String)> {
        let mut env = vec![("PGPASSWORD".to_string(), self.password.clone())];
        if self.ssl {
            env.push(("PGSSLMODE".to_string(), "require".to_string()));
        }
        env
    }

    /// Command-line connection flags; an empty `database` targets the
    /// descriptor's own database
    pub fn pg_flags(&self, database: &str) -> Vec<String> {
        let database = if database.is_empty() {
            self.database.as_str()
        } else {
            database
        };

        vec![
            "-U".to_string(),
            self.user.clone(),
            "-h".to_string(),
            self.host.clone(),
            "-p".to_string(),
            self.port.to_string(),
            "-d".to_string(),
            database.to_string(),
        ]
    }

    /// Copy of this descriptor authenticating as another user on another database
    pub fn with_credentials(&self, user: &str, password: &str, database: &str) -> Self {
        Self {
            database: database.to_string(),
            user: user.to_string(),
            password: password.to_string(),
            ..self.clone()
        }
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("database", &self.database)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("ssl", &self.ssl)
            .finish()
    }
}

/// Weekly maintenance slot of a cluster
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct MaintenanceWindow {
    pub day: String,
    pub hour: String,
    #[serde(default)]
    pub pending: bool,
    #[serde(default)]
    pub description: Vec<String>,
}

/// A managed database cluster
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Cluster {
    pub id: String,
    pub name: String,
    pub engine: Engine,
    pub version: String,
    pub connection: Connection,
    pub private_connection: Connection,
    pub num_nodes: u32,
    pub size: String,
    pub region: String,
    pub status: ClusterStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_network_uuid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_names: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maintenance_window: Option<MaintenanceWindow>,
}

/// Creation form of a cluster
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ClusterCreate {
    pub name: String,
    pub engine: Engine,
    pub version: String,
    pub size: String,
    pub region: String,
    pub num_nodes: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_network_uuid: Option<String>,
}

/// Kind of source a firewall rule allows
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum FirewallRuleType {
    Droplet,
    K8s,
    IpAddr,
    Tag,
}

/// Identity of a firewall rule: only `(type, value)` is compared during
/// reconciliation
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FirewallRuleCreate {
    #[serde(rename = "type")]
    pub rule_type: FirewallRuleType,
    pub value: String,
}

impl FirewallRuleCreate {
    pub fn new(rule_type: FirewallRuleType, value: impl Into<String>) -> Self {
        Self {
            rule_type,
            value: value.into(),
        }
    }

    pub fn ip_addr(address: impl Into<String>) -> Self {
        Self::new(FirewallRuleType::IpAddr, address)
    }

    pub fn droplet(id: impl fmt::Display) -> Self {
        Self::new(FirewallRuleType::Droplet, id.to_string())
    }
}

/// A firewall rule as applied by the control plane
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct FirewallRule {
    pub uuid: String,
    pub cluster_uuid: String,
    #[serde(rename = "type")]
    pub rule_type: FirewallRuleType,
    pub value: String,
    pub created_at: DateTime<Utc>,
}

impl FirewallRule {
    pub fn key(&self) -> FirewallRuleCreate {
        FirewallRuleCreate::new(self.rule_type, self.value.clone())
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Primary,
    #[default]
    Normal,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum MysqlAuthPlugin {
    #[serde(rename = "mysql_native_password")]
    MysqlNative,
    #[serde(rename = "caching_sha2_password")]
    CachingSha2,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct MysqlSettings {
    pub auth_plugin: MysqlAuthPlugin,
}

/// Creation form of a database user
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct UserCreate {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mysql_settings: Option<MysqlSettings>,
}

impl UserCreate {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mysql_settings: None,
        }
    }
}

/// A database user; the password is only guaranteed on creation
#[derive(Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct DatabaseUser {
    pub name: String,
    #[serde(default)]
    pub role: UserRole,
    #[serde(default)]
    pub password: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mysql_settings: Option<MysqlSettings>,
}

impl fmt::Debug for DatabaseUser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseUser")
            .field("name", &self.name)
            .field("role", &self.role)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Database {
    pub name: String,
}

impl Database {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// PgBouncer pooling mode
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PoolMode {
    Session,
    #[default]
    Transaction,
    Statement,
}

/// Creation form of a connection pool
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct PoolCreate {
    pub name: String,
    pub mode: PoolMode,
    pub size: u32,
    pub db: String,
    pub user: String,
}

/// A connection pool with the descriptors it exposes
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ConnectionPool {
    pub name: String,
    pub mode: PoolMode,
    pub size: u32,
    pub db: String,
    pub user: String,
    pub connection: Connection,
    pub private_connection: Connection,
}

/// Compute instance, only used to translate names into firewall rules
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Droplet {
    pub id: u64,
    pub name: String,
}
