//! Error types for cluster orchestration.

use thiserror::Error;

use crate::runtime::RuntimeError;

/// Error type for all cluster lifecycle operations.
#[derive(Debug, Error)]
pub enum ClusterError {
    /// Bad input: invalid cluster name, duplicate name, unsupported node role.
    /// Surfaced before any resource has been touched.
    #[error("Invalid cluster configuration: {0}")]
    Validation(String),

    /// A runtime call failed while creating or removing a resource.
    #[error("Provisioning failed: {0}")]
    Provision(#[from] RuntimeError),

    /// The readiness wait exceeded its deadline.
    #[error("Timed out after {seconds}s waiting for log message \"{marker}\"")]
    Timeout { marker: String, seconds: u64 },

    /// The container log stream errored or closed before the marker appeared.
    #[error("Log stream error: {0}")]
    Stream(String),

    /// Runtime state contradicts the single-server cluster model
    /// (multiple servers for one cluster, malformed worker name suffix).
    #[error("Inconsistent cluster state: {0}")]
    Consistency(String),

    /// A required resource is missing (no running server, join config absent).
    #[error("Not found: {0}")]
    NotFound(String),

    /// A port-mapping expression could not be parsed.
    #[error("Invalid port mapping: {0}")]
    PortParse(String),

    /// Two port mappings resolve to the same host port on one node.
    #[error("Port conflict: {0}")]
    PortConflict(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
