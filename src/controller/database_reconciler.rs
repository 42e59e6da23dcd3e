//! Database reconciler
//!
//! Creates or deletes a database inside a cluster. A freshly created
//! database can be seeded from a sibling database with a dump and restore.

use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::api::find_paged;
use crate::api::models::{Cluster, Database, EntryState};
use crate::controller::context::Session;
use crate::controller::error::{CopyStage, Error, Result, truncate_output};
use crate::controller::outcome::Outcome;
use crate::resources::process::ProcessOutput;
use crate::resources::sql;

impl Session {
    /// Reconcile a database on the named cluster
    ///
    /// `copy_from` only applies when the database is created.
    pub async fn ensure_database(
        &mut self,
        cluster_name: &str,
        db_name: &str,
        state: EntryState,
        copy_from: Option<&str>,
    ) -> Result<Outcome> {
        let result = async {
            let cluster = self.require_cluster(cluster_name).await?;
            self.ensure_database_on(&cluster, db_name, state, copy_from)
                .await
        }
        .await;
        self.observe("database", result)
    }

    async fn ensure_database_on(
        &self,
        cluster: &Cluster,
        db_name: &str,
        state: EntryState,
        copy_from: Option<&str>,
    ) -> Result<Outcome> {
        let api = self.api.as_ref();
        let existing = find_paged(
            |page| api.list_databases(&cluster.id, page),
            |db| db.name == db_name,
        )
        .await?;

        match (existing, state) {
            (None, EntryState::Absent) | (Some(_), EntryState::Present) => {
                debug!(
                    cluster = %cluster.name,
                    database = %db_name,
                    state = %state,
                    "Database already converged"
                );
                Ok(Outcome::unchanged())
            }
            (Some(_), EntryState::Absent) => {
                info!(cluster = %cluster.name, database = %db_name, "Deleting database");
                api.delete_database(&cluster.id, db_name).await?;
                Ok(Outcome::new(true))
            }
            (None, EntryState::Present) => {
                info!(cluster = %cluster.name, database = %db_name, "Creating database");
                api.create_database(&cluster.id, &Database::new(db_name))
                    .await?;

                if let Some(source) = copy_from.filter(|source| !source.is_empty()) {
                    self.with_self_access(cluster, self.copy_database(cluster, source, db_name))
                        .await?;
                }
                Ok(Outcome::new(true))
            }
        }
    }

    /// Dump `source` into a private temporary file and replay it into `target`
    async fn copy_database(&self, cluster: &Cluster, source: &str, target: &str) -> Result<()> {
        // Removed when dropped, on every return path
        let dump_file = NamedTempFile::new()?;

        info!(cluster = %cluster.name, source = %source, target = %target, "Copying database");

        let output = self
            .runner
            .run(sql::dump(&cluster.connection, source, dump_file.path()))
            .await?;
        self.check_copy_step(output, CopyStage::Dump, source)?;

        let output = self
            .runner
            .run(sql::restore(&cluster.connection, target, dump_file.path()))
            .await?;
        self.check_copy_step(output, CopyStage::Restore, target)?;

        debug!(cluster = %cluster.name, target = %target, "Database copy finished");
        Ok(())
    }

    fn check_copy_step(
        &self,
        output: ProcessOutput,
        stage: CopyStage,
        database: &str,
    ) -> Result<()> {
        if output.success() {
            return Ok(());
        }
        warn!(database = %database, code = ?output.code, "Error while {} database", stage);
        Err(Error::DataCopyFailed {
            stage,
            database: database.to_string(),
            stderr: truncate_output(&output.stderr, self.config.stderr_limit),
        })
    }
}
