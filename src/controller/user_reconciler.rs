//! Database user and connection pool reconciliation
//!
//! A new user is handed ownership of everything the admin user owns in the
//! target database, and gets a transaction-mode pool named after it. The
//! connection parameters callers should use are returned in the outcome.

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::api::models::{
    Cluster, Connection, ConnectionPool, DatabaseUser, EntryState, PoolCreate, PoolMode,
    UserCreate,
};
use crate::controller::context::Session;
use crate::controller::error::{Error, Result, truncate_output};
use crate::controller::outcome::Outcome;
use crate::resources::sql;

/// Effective connection parameters of a user
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct UserConnections {
    pub connection: Connection,
    pub private_connection: Connection,
    /// `connection` as a single URI
    pub uri: String,
}

/// Name of the pool dedicated to `user_name`
pub fn pool_name(user_name: &str) -> String {
    format!("user_{}", user_name)
}

impl Session {
    /// Reconcile a user and its pool on the named cluster
    ///
    /// `output` holds the pool's connection parameters if a pool remains and
    /// the cluster's otherwise, with the user's credentials and `db_name`
    /// filled in. A deleted user still reports the parameters it had; a user
    /// that never existed reports nothing. `pool_size` 0 means no pool.
    pub async fn ensure_user(
        &mut self,
        cluster_name: &str,
        user_name: &str,
        db_name: &str,
        state: EntryState,
        pool_size: u32,
    ) -> Result<Outcome<UserConnections>> {
        let result = async {
            let cluster = self.require_cluster(cluster_name).await?;
            self.ensure_user_on(&cluster, user_name, db_name, state, pool_size)
                .await
        }
        .await;
        self.observe("user", result)
    }

    async fn ensure_user_on(
        &self,
        cluster: &Cluster,
        user_name: &str,
        db_name: &str,
        state: EntryState,
        pool_size: u32,
    ) -> Result<Outcome<UserConnections>> {
        let existing = self
            .api
            .list_users(&cluster.id)
            .await?
            .into_iter()
            .find(|user| user.name == user_name);

        let mut changed = false;

        let user = match existing {
            Some(user) => user,
            None if state == EntryState::Absent => {
                debug!(cluster = %cluster.name, user = %user_name, "User already absent");
                return Ok(Outcome::unchanged());
            }
            None => {
                info!(cluster = %cluster.name, user = %user_name, "Creating database user");
                let user = self
                    .api
                    .create_user(&cluster.id, &UserCreate::new(user_name))
                    .await?;
                changed = true;

                let reassign = self.reassign_ownership(cluster, db_name, user_name);
                self.with_self_access(cluster, reassign).await?;
                user
            }
        };

        let pool_name = pool_name(user_name);
        let mut pool = self
            .api
            .list_pools(&cluster.id)
            .await?
            .into_iter()
            .find(|pool| pool.name == pool_name);

        match (&pool, state) {
            (None, EntryState::Present) if pool_size > 0 => {
                info!(
                    cluster = %cluster.name,
                    pool = %pool_name,
                    size = pool_size,
                    "Creating connection pool"
                );
                let request = PoolCreate {
                    name: pool_name.clone(),
                    mode: PoolMode::Transaction,
                    size: pool_size,
                    db: db_name.to_string(),
                    user: user_name.to_string(),
                };
                pool = Some(self.api.create_pool(&cluster.id, &request).await?);
                changed = true;
            }
            (Some(_), EntryState::Absent) => {
                info!(cluster = %cluster.name, pool = %pool_name, "Deleting connection pool");
                self.api.delete_pool(&cluster.id, &pool_name).await?;
                pool = None;
                changed = true;
            }
            _ => {}
        }

        if state == EntryState::Absent {
            info!(cluster = %cluster.name, user = %user_name, "Deleting database user");
            self.api.delete_user(&cluster.id, user_name).await?;
            changed = true;
        }

        Ok(Outcome::with_output(
            changed,
            connections(cluster, &user, pool.as_ref(), db_name),
        ))
    }

    /// Hand the admin user's objects in `db_name` over to `user_name`
    async fn reassign_ownership(
        &self,
        cluster: &Cluster,
        db_name: &str,
        user_name: &str,
    ) -> Result<()> {
        let spec = sql::reassign_owned(&cluster.connection, db_name, user_name);
        let output = self.runner.run(spec).await?;
        if output.success() {
            debug!(cluster = %cluster.name, user = %user_name, "Reassigned object ownership");
            return Ok(());
        }

        let stderr = truncate_output(&output.stderr, self.config.stderr_limit);
        warn!(
            cluster = %cluster.name,
            user = %user_name,
            code = ?output.code,
            "Ownership reassignment failed"
        );
        Err(Error::OwnershipReassignmentFailed {
            user: user_name.to_string(),
            stderr,
        })
    }
}

fn connections(
    cluster: &Cluster,
    user: &DatabaseUser,
    pool: Option<&ConnectionPool>,
    db_name: &str,
) -> UserConnections {
    let (connection, private_connection) = match pool {
        Some(pool) => (pool.connection.clone(), pool.private_connection.clone()),
        None => (
            cluster
                .connection
                .with_credentials(&user.name, &user.password, db_name),
            cluster
                .private_connection
                .with_credentials(&user.name, &user.password, db_name),
        ),
    };
    UserConnections {
        uri: connection.uri(),
        connection,
        private_connection,
    }
}
