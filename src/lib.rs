//! k3d: cluster lifecycle orchestration for k3s-in-containers.
//!
//! Provisions, joins and tears down multi-container clusters on top of a
//! container runtime. Each cluster is one server container plus any number of
//! worker containers sharing a private network, an image volume and a cluster
//! secret. Cluster membership is recorded solely in container labels; every
//! operation re-derives cluster state from the runtime, there is no metadata
//! store.
//!
//! The runtime transport and filesystem bookkeeping are collaborators behind
//! the [`runtime::ContainerRuntime`] and [`dirs::ClusterDirs`] traits.

pub mod cluster;
pub mod config;
pub mod dirs;
pub mod error;
pub mod join;
pub mod ports;
pub mod registry;
pub mod runtime;
pub mod secret;
pub mod spec;
pub mod watcher;

pub use cluster::ClusterManager;
pub use config::OrchestratorConfig;
pub use dirs::{ClusterDirs, LocalClusterDirs};
pub use error::ClusterError;
pub use join::{derive_join_config, ApiHostResolver, EnvResolver, JoinConfig, NoFallback};
pub use registry::{discover, Cluster, Node};
pub use runtime::{
    ContainerConfig, ContainerDetails, ContainerRuntime, ContainerState, ContainerSummary,
    LabelFilter, LogStream, RuntimeError,
};
pub use spec::{
    check_cluster_name, node_names, parse_api_port, qualify_image, server_name, worker_name,
    ApiPort, ClusterSpec, NodeRole, PortBinding, Protocol,
};
pub use watcher::wait_for_log_message;
