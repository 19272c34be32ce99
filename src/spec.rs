//! Cluster specification and naming conventions.
//!
//! A `ClusterSpec` is built once per operation and never mutated after being
//! handed to the orchestrator. Node, network and volume names are all derived
//! deterministically from the cluster name; together with the labels stamped
//! on every container they are the only record of cluster membership.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::error::ClusterError;
use crate::secret::generate_cluster_secret;

/// Label key/value identifying containers managed by this crate.
pub const LABEL_APP: &str = "app";
pub const APP_NAME: &str = "k3d";
/// Label key holding the owning cluster's name.
pub const LABEL_CLUSTER: &str = "cluster";
/// Label key holding the node role (`server` or `worker`).
pub const LABEL_COMPONENT: &str = "component";

/// Registry prepended to image references that carry none.
pub const DEFAULT_REGISTRY: &str = "docker.io";
/// Default image for node containers.
pub const DEFAULT_IMAGE: &str = "rancher/k3s:latest";
/// Default API listen port for the server node.
pub const DEFAULT_API_PORT: u16 = 6443;

/// Fixed env entry telling the server where to write the kubeconfig.
pub const KUBECONFIG_OUTPUT_ENV: &str = "K3S_KUBECONFIG_OUTPUT=/output/kubeconfig.yaml";
/// Env variable carrying the shared cluster secret.
pub const CLUSTER_SECRET_VAR: &str = "K3S_CLUSTER_SECRET";
/// Env variable pointing joining agents at the server.
pub const SERVER_URL_VAR: &str = "K3S_URL";
/// Server argument that sets the API listen port; the join deriver scans for
/// it positionally, so it is always passed as a separate flag and value.
pub const API_PORT_FLAG: &str = "--https-listen-port";
/// Container path of the shared image volume.
pub const IMAGE_VOLUME_MOUNT: &str = "/images";

/// Role of a node container within a cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeRole {
    Server,
    Worker,
}

impl NodeRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeRole::Server => "server",
            NodeRole::Worker => "worker",
        }
    }
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Name of a cluster's server container.
pub fn server_name(cluster: &str) -> String {
    format!("{cluster}-server")
}

/// Name of a cluster's worker container with the given ordinal suffix.
pub fn worker_name(cluster: &str, suffix: u64) -> String {
    format!("{cluster}-worker-{suffix}")
}

/// All node container names for a cluster, server first, workers in ordinal
/// order. This is the node list port mappings are broadcast over.
pub fn node_names(cluster: &str, workers: usize) -> Vec<String> {
    let mut names = Vec::with_capacity(workers + 1);
    names.push(server_name(cluster));
    for i in 0..workers as u64 {
        names.push(worker_name(cluster, i));
    }
    names
}

/// Trailing numeric ordinal of a worker container name, if it has one.
pub fn worker_suffix(name: &str) -> Option<u64> {
    name.rsplit('-').next()?.parse().ok()
}

/// Name of a cluster's private network.
pub fn network_name(cluster: &str) -> String {
    format!("k3d-{cluster}")
}

/// Name of a cluster's shared image volume.
pub fn image_volume_name(cluster: &str) -> String {
    format!("k3d-{cluster}-images")
}

/// Validate a cluster name. It becomes part of container host names, so it
/// must be a valid hostname fragment: lowercase alphanumerics and dashes,
/// starting and ending alphanumeric, at most 63 characters.
pub fn check_cluster_name(name: &str) -> Result<(), ClusterError> {
    if name.is_empty() {
        return Err(ClusterError::Validation(
            "cluster name must not be empty".to_string(),
        ));
    }
    if name.len() > 63 {
        return Err(ClusterError::Validation(format!(
            "cluster name [{name}] exceeds 63 characters"
        )));
    }
    let valid_char = |c: char| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-';
    if !name.chars().all(valid_char)
        || name.starts_with('-')
        || name.ends_with('-')
    {
        return Err(ClusterError::Validation(format!(
            "cluster name [{name}] is not a valid hostname fragment \
             (lowercase alphanumerics and dashes only)"
        )));
    }
    Ok(())
}

/// Qualify an image reference with the default registry when it carries none.
/// A reference with more than two slash-separated components already names a
/// registry and is left alone.
pub fn qualify_image(image: &str) -> String {
    if image.split('/').count() <= 2 {
        format!("{DEFAULT_REGISTRY}/{image}")
    } else {
        image.to_string()
    }
}

/// Transport protocol of a port binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Tcp,
    Udp,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Tcp => f.write_str("tcp"),
            Protocol::Udp => f.write_str("udp"),
        }
    }
}

/// One host-to-container port mapping on a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortBinding {
    /// Host interface to bind; `None` binds all interfaces.
    pub host_ip: Option<String>,
    pub host_port: u16,
    pub container_port: u16,
    pub protocol: Protocol,
}

/// Host interface and port the server's API listens on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiPort {
    /// Explicit host name or address; added as a TLS SAN when present.
    pub host: Option<String>,
    pub port: u16,
}

impl Default for ApiPort {
    fn default() -> Self {
        Self {
            host: None,
            port: DEFAULT_API_PORT,
        }
    }
}

/// Parse an API port expression: either `"port"` or `"host:port"`.
pub fn parse_api_port(expr: &str) -> Result<ApiPort, ClusterError> {
    let (host, port) = match expr.rsplit_once(':') {
        Some((host, port)) if !host.is_empty() => (Some(host.to_string()), port),
        Some((_, port)) => (None, port),
        None => (None, expr),
    };
    let port: u16 = port.parse().map_err(|_| {
        ClusterError::PortParse(format!("invalid API port in [{expr}]"))
    })?;
    Ok(ApiPort { host, port })
}

/// Immutable input to cluster and node creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterSpec {
    /// Cluster name; validated hostname fragment, unique among live clusters.
    pub name: String,
    /// Image reference for all node containers.
    pub image: String,
    /// Ordered `KEY=VALUE` env entries. Duplicates are not deduplicated; the
    /// runtime applies them in order, so later entries win.
    #[serde(default)]
    pub env: Vec<String>,
    /// Extra arguments for the server process.
    #[serde(default)]
    pub server_args: Vec<String>,
    /// Extra arguments for agent processes.
    #[serde(default)]
    pub agent_args: Vec<String>,
    /// Per-node port binding table, keyed by node container name.
    #[serde(default)]
    pub port_map: HashMap<String, Vec<PortBinding>>,
    /// Host-port increment applied per node when one mapping is broadcast to
    /// several nodes.
    #[serde(default)]
    pub port_auto_offset: u16,
    /// `host-path:container-path` mounts, including the synthesized shared
    /// image-volume mount appended during create.
    #[serde(default)]
    pub volumes: Vec<String>,
    #[serde(default)]
    pub api_port: ApiPort,
    /// Number of worker containers to create.
    #[serde(default)]
    pub workers: usize,
    /// Restart node containers with the runtime daemon.
    #[serde(default)]
    pub auto_restart: bool,
    /// Seconds to wait for server readiness; `None` skips the wait.
    #[serde(default)]
    pub wait_timeout: Option<u64>,
}

impl ClusterSpec {
    /// Build a spec for a new cluster. Seeds the env with the kubeconfig
    /// output path and a freshly generated cluster secret; user-supplied
    /// variables are appended after these and may shadow them.
    pub fn new(name: &str, image: &str) -> Self {
        Self {
            name: name.to_string(),
            image: image.to_string(),
            env: vec![
                KUBECONFIG_OUTPUT_ENV.to_string(),
                format!("{CLUSTER_SECRET_VAR}={}", generate_cluster_secret()),
            ],
            server_args: Vec::new(),
            agent_args: Vec::new(),
            port_map: HashMap::new(),
            port_auto_offset: 0,
            volumes: Vec::new(),
            api_port: ApiPort::default(),
            workers: 0,
            auto_restart: false,
            wait_timeout: None,
        }
    }

    /// Build the reduced spec used when joining nodes to an existing cluster.
    /// Joining agents carry only the join env (server URL and cluster secret);
    /// no port map, no server args, no volumes.
    pub fn joining(name: &str, image: &str, join_env: Vec<String>) -> Self {
        Self {
            name: name.to_string(),
            image: image.to_string(),
            env: join_env,
            server_args: Vec::new(),
            agent_args: Vec::new(),
            port_map: HashMap::new(),
            port_auto_offset: 0,
            volumes: Vec::new(),
            api_port: ApiPort::default(),
            workers: 0,
            auto_restart: false,
            wait_timeout: None,
        }
    }

    /// Resolve user port mappings into the per-node binding table, applying
    /// this spec's auto-offset across the cluster's node names.
    pub fn allocate_ports(&mut self, port_specs: &[String]) -> Result<(), ClusterError> {
        let nodes = node_names(&self.name, self.workers);
        self.port_map = crate::ports::allocate(port_specs, &nodes, self.port_auto_offset)?;
        Ok(())
    }
}
