//! Error types for the reconciliation engine

use std::time::Duration;

use thiserror::Error;

use crate::api::RemoteError;

/// Error variants follow the failure classes callers have to tell apart:
/// remote failures, convergence failures and external tool failures.
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error("Cluster {cluster} did not come online within {}s", .waited.as_secs())]
    ProvisioningTimeout { cluster: String, waited: Duration },

    #[error("Existing cluster {cluster} does not match the requested {field}: expected {expected}, found {actual}")]
    SpecMismatch {
        cluster: String,
        field: &'static str,
        expected: String,
        actual: String,
    },

    #[error("Cluster {0} does not exist")]
    ClusterNotFound(String),

    #[error("Droplets not found: {}", .0.join(", "))]
    DropletsNotFound(Vec<String>),

    #[error("Error while re-assigning DB objects to user {user}: {stderr}")]
    OwnershipReassignmentFailed { user: String, stderr: String },

    #[error("Error while {stage} database {database}: {stderr}")]
    DataCopyFailed {
        stage: CopyStage,
        database: String,
        stderr: String,
    },

    #[error("Failed to start {program}: {source}")]
    ProcessSpawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Public address discovery failed: {0}")]
    AddressDiscovery(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Step of a database copy that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyStage {
    Dump,
    Restore,
}

impl std::fmt::Display for CopyStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CopyStage::Dump => write!(f, "dumping"),
            CopyStage::Restore => write!(f, "restoring dump into"),
        }
    }
}

impl Error {
    /// Check if this error indicates a remote resource was not found
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::ClusterNotFound(_) | Error::DropletsNotFound(_) => true,
            Error::Remote(e) => e.is_not_found(),
            _ => false,
        }
    }

    /// Check if running the same reconciliation again may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Remote(e) => match e.status {
                // 4xx errors (except 409 Conflict, 429 TooManyRequests) are usually not retryable
                Some(code) if (400..500).contains(&code) => code == 409 || code == 429,
                // 5xx and transport errors are retryable
                _ => true,
            },
            // The cluster may still come online later
            Error::ProvisioningTimeout { .. } => true,
            // Drift has to be resolved by hand
            Error::SpecMismatch { .. } => false,
            Error::ClusterNotFound(_) | Error::DropletsNotFound(_) => false,
            Error::OwnershipReassignmentFailed { .. } | Error::DataCopyFailed { .. } => false,
            Error::ProcessSpawn { .. } => false,
            Error::Io(_) => true,
            Error::AddressDiscovery(_) => true,
            Error::InvalidConfig(_) => false,
            Error::Serialization(_) => false,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Keep at most `limit` bytes of captured stderr for error reporting
pub fn truncate_output(output: &[u8], limit: usize) -> String {
    let kept = &output[..output.len().min(limit)];
    String::from_utf8_lossy(kept).trim_end().to_string()
}
