//! Container runtime collaborator contract.
//!
//! The orchestrator never talks to a concrete runtime transport. Everything it
//! needs (networks, volumes, container lifecycle, label-filtered listing and
//! a log stream) sits behind this trait, so the runtime client is swappable and
//! the whole lifecycle is testable against an in-memory double.

use async_trait::async_trait;
use std::collections::HashMap;
use std::pin::Pin;
use thiserror::Error;
use tokio::io::AsyncRead;

use crate::spec::PortBinding;

/// Error type at the runtime boundary.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("Runtime unreachable: {0}")]
    Unreachable(String),
    #[error("Resource not found: {0}")]
    NotFound(String),
    #[error("Runtime API error: {0}")]
    Api(String),
}

/// Container state as reported by the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerState {
    Created,
    Running,
    Stopped,
}

/// Everything needed to create one node container.
#[derive(Debug, Clone)]
pub struct ContainerConfig {
    pub name: String,
    pub image: String,
    /// `KEY=VALUE` entries, in order. Duplicates allowed; the runtime applies
    /// them in order, so later entries shadow earlier ones.
    pub env: Vec<String>,
    pub cmd: Vec<String>,
    pub ports: Vec<PortBinding>,
    /// `host-path:container-path` or `volume-name:container-path` mounts.
    pub volumes: Vec<String>,
    pub labels: HashMap<String, String>,
    /// Name of the cluster network to attach to.
    pub network: String,
    pub hostname: String,
    /// Restart the container with the runtime daemon.
    pub auto_restart: bool,
    /// k3s needs a privileged container to run its own containerd.
    pub privileged: bool,
}

/// Summary entry from a container listing.
#[derive(Debug, Clone)]
pub struct ContainerSummary {
    pub id: String,
    pub name: String,
    pub labels: HashMap<String, String>,
    pub state: ContainerState,
}

/// Detailed view of one container, as returned by inspect.
#[derive(Debug, Clone)]
pub struct ContainerDetails {
    pub id: String,
    pub name: String,
    pub env: Vec<String>,
    pub cmd: Vec<String>,
    pub state: ContainerState,
}

/// Conjunctive label filter for listing queries.
#[derive(Debug, Clone, Default)]
pub struct LabelFilter {
    pairs: Vec<(String, String)>,
}

impl LabelFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn label(mut self, key: &str, value: &str) -> Self {
        self.pairs.push((key.to_string(), value.to_string()));
        self
    }

    /// True if every filter pair is present in `labels`.
    pub fn matches(&self, labels: &HashMap<String, String>) -> bool {
        self.pairs
            .iter()
            .all(|(k, v)| labels.get(k).map(String::as_str) == Some(v.as_str()))
    }

    pub fn pairs(&self) -> &[(String, String)] {
        &self.pairs
    }
}

/// Byte stream of a container's combined output.
pub type LogStream = Pin<Box<dyn AsyncRead + Send>>;

/// Container runtime operations consumed by the orchestrator.
///
/// All calls are synchronous from the orchestrator's point of view: they
/// complete or fail, nothing is cancellable mid-flight.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Check that the runtime is reachable; returns its API version string.
    async fn ping(&self) -> Result<String, RuntimeError>;

    async fn create_network(
        &self,
        name: &str,
        labels: &HashMap<String, String>,
    ) -> Result<String, RuntimeError>;

    async fn remove_network(&self, name: &str) -> Result<(), RuntimeError>;

    async fn create_volume(
        &self,
        name: &str,
        labels: &HashMap<String, String>,
    ) -> Result<String, RuntimeError>;

    async fn remove_volume(&self, name: &str) -> Result<(), RuntimeError>;

    /// Create a container; returns its runtime ID. The container is not started.
    async fn create_container(&self, config: &ContainerConfig) -> Result<String, RuntimeError>;

    async fn start_container(&self, id: &str) -> Result<(), RuntimeError>;

    async fn stop_container(&self, id: &str) -> Result<(), RuntimeError>;

    /// Remove a container, stopping it first if necessary.
    async fn remove_container(&self, id: &str) -> Result<(), RuntimeError>;

    async fn inspect_container(&self, id: &str) -> Result<ContainerDetails, RuntimeError>;

    /// List containers matching every pair in `filter`. With `all` false only
    /// running containers are returned.
    async fn list_containers(
        &self,
        filter: &LabelFilter,
        all: bool,
    ) -> Result<Vec<ContainerSummary>, RuntimeError>;

    /// Stream the container's combined output from the moment of the call.
    async fn container_logs(&self, id: &str) -> Result<LogStream, RuntimeError>;
}
