//! PostgreSQL client tool invocations
//!
//! Builds the `psql` / `pg_dump` commands used for ownership reassignment and
//! database copies. Connection flags come from the cluster's admin
//! descriptor, credentials travel through the environment only.

use std::path::Path;

use crate::api::models::Connection;
use crate::resources::process::{ProcessInput, ProcessOutputTarget, ProcessSpec};

pub const PSQL: &str = "psql";
pub const PG_DUMP: &str = "pg_dump";

/// Quote a SQL identifier
///
/// This prevents SQL injection by ensuring special characters in identifiers
/// are properly escaped. For example:
/// - `my_table` -> `"my_table"`
/// - `table"name` -> `"table""name"`
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Statement handing every object owned by `from` over to `to`
pub fn reassign_owned_sql(from: &str, to: &str) -> String {
    format!(
        "REASSIGN OWNED BY {} TO {}",
        quote_identifier(from),
        quote_identifier(to)
    )
}

/// `psql` on `database`, reading the statements from `input`
pub fn psql(connection: &Connection, database: &str, input: ProcessInput) -> ProcessSpec {
    ProcessSpec::new(PSQL)
        .args(connection.pg_flags(database))
        .env(connection.pg_env())
        .stdin(input)
}

/// `psql` running the ownership reassignment from the admin user to `user`
pub fn reassign_owned(admin: &Connection, database: &str, user: &str) -> ProcessSpec {
    let statement = reassign_owned_sql(&admin.user, user);
    psql(admin, database, ProcessInput::Bytes(statement.into_bytes()))
}

/// `pg_dump` of `database` without ownership statements, written to `target`
pub fn dump(connection: &Connection, database: &str, target: &Path) -> ProcessSpec {
    ProcessSpec::new(PG_DUMP)
        .args(["-O".to_string()])
        .args(connection.pg_flags(database))
        .env(connection.pg_env())
        .stdout(ProcessOutputTarget::File(target.to_path_buf()))
}

/// `psql` replaying a dump file into `database`
pub fn restore(connection: &Connection, database: &str, source: &Path) -> ProcessSpec {
    psql(connection, database, ProcessInput::File(source.to_path_buf()))
}
