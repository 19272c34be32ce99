//! Cluster lifecycle orchestrator.
//!
//! Sequences runtime resource operations (network, volume, server, workers)
//! for the five lifecycle operations: create, delete, start, stop, add-node.
//! No cluster state is held between calls; every entry point re-derives the
//! world from the runtime via the registry. Create unwinds a stack of
//! compensating delete actions on failure; delete, stop and start are
//! best-effort for everything except the server, which is the authoritative
//! resource for a cluster's identity.
//!
//! All orchestration is sequential within one call and there is no locking
//! over cluster names: two concurrent invocations targeting the same name can
//! race. Accepted limitation.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::OrchestratorConfig;
use crate::dirs::ClusterDirs;
use crate::error::ClusterError;
use crate::join::{derive_join_config, ApiHostResolver, NoFallback};
use crate::registry::{component_filter, discover, Cluster};
use crate::runtime::{ContainerConfig, ContainerRuntime};
use crate::spec::{
    check_cluster_name, image_volume_name, network_name, qualify_image, server_name,
    worker_name, worker_suffix, ClusterSpec, NodeRole, PortBinding, Protocol, APP_NAME,
    API_PORT_FLAG, IMAGE_VOLUME_MOUNT, LABEL_APP, LABEL_CLUSTER, LABEL_COMPONENT,
    SERVER_URL_VAR,
};
use crate::watcher::wait_for_log_message;

/// A provisioned resource, recorded so create can roll back what it made.
/// Each entry is the compensating half of a create/delete pair; rollback
/// unwinds the stack in reverse, ignoring sub-errors.
enum Provisioned {
    Network(String),
    Volume(String),
    ClusterDir(String),
    Container { id: String, name: String },
}

/// Cluster lifecycle orchestrator.
pub struct ClusterManager {
    runtime: Arc<dyn ContainerRuntime>,
    dirs: Arc<dyn ClusterDirs>,
    config: OrchestratorConfig,
    api_host: Box<dyn ApiHostResolver>,
}

impl ClusterManager {
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        dirs: Arc<dyn ClusterDirs>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            runtime,
            dirs,
            config,
            api_host: Box::new(NoFallback),
        }
    }

    /// Build a manager whose cluster directories live under the configured
    /// base directory.
    pub fn from_config(runtime: Arc<dyn ContainerRuntime>, config: OrchestratorConfig) -> Self {
        let dirs = Arc::new(crate::dirs::LocalClusterDirs::new(config.base_dir.clone()));
        Self::new(runtime, dirs, config)
    }

    /// Install a fallback strategy for the external API host. Nothing is
    /// consulted implicitly; the default never resolves.
    pub fn with_api_host_resolver(mut self, resolver: Box<dyn ApiHostResolver>) -> Self {
        self.api_host = resolver;
        self
    }

    /// Check that the container runtime is responding; returns its version.
    pub async fn check_runtime(&self) -> Result<String, ClusterError> {
        let version = self.runtime.ping().await?;
        tracing::info!("[Orchestrator] Container runtime responding (API: v{})", version);
        Ok(version)
    }

    /// List every cluster discoverable from runtime state.
    pub async fn list_clusters(&self) -> Result<Vec<Cluster>, ClusterError> {
        discover(&*self.runtime, true, "").await
    }

    /// Where the named cluster's kubeconfig is expected on the host.
    pub fn kubeconfig_path(&self, cluster: &str) -> PathBuf {
        self.dirs.kubeconfig_path(cluster)
    }

    /// Create a cluster: network, image volume, artifact directory, server,
    /// optional readiness wait, then workers in ordinal order. Any failure
    /// after the first resource exists rolls everything back.
    pub async fn create(&self, spec: &ClusterSpec) -> Result<(), ClusterError> {
        check_cluster_name(&spec.name)?;
        if !discover(&*self.runtime, false, &spec.name).await?.is_empty() {
            return Err(ClusterError::Validation(format!(
                "cluster {} already exists",
                spec.name
            )));
        }

        tracing::info!("[Orchestrator] Creating cluster [{}]", spec.name);
        let mut created: Vec<Provisioned> = Vec::new();
        match self.provision_cluster(spec, &mut created).await {
            Ok(()) => {
                tracing::info!("[Orchestrator] SUCCESS: created cluster [{}]", spec.name);
                Ok(())
            }
            Err(e) => {
                tracing::warn!(
                    "[Orchestrator] Cluster creation failed, rolling back: {}",
                    e
                );
                self.rollback(&created).await;
                Err(e)
            }
        }
    }

    async fn provision_cluster(
        &self,
        spec: &ClusterSpec,
        created: &mut Vec<Provisioned>,
    ) -> Result<(), ClusterError> {
        let mut spec = spec.clone();
        if spec.image.is_empty() {
            spec.image = self.config.default_image.clone();
        }
        spec.image = qualify_image(&spec.image);
        if spec.api_port.host.is_none() {
            if let Some(host) = self.api_host.resolve() {
                tracing::info!("[Orchestrator] Using fallback API host {}", host);
                spec.api_port.host = Some(host);
            }
        }

        let labels = cluster_labels(&spec.name);

        let network = network_name(&spec.name);
        self.runtime.create_network(&network, &labels).await?;
        created.push(Provisioned::Network(network.clone()));
        tracing::info!("[Orchestrator] Created cluster network {}", network);

        let volume = image_volume_name(&spec.name);
        self.runtime.create_volume(&volume, &labels).await?;
        created.push(Provisioned::Volume(volume.clone()));
        tracing::info!("[Orchestrator] Created image volume {}", volume);
        spec.volumes.push(format!("{volume}:{IMAGE_VOLUME_MOUNT}"));

        self.dirs.create_cluster_dir(&spec.name)?;
        created.push(Provisioned::ClusterDir(spec.name.clone()));

        let server_id = self.create_node(&spec, NodeRole::Server, 0, created).await?;
        tracing::info!("[Orchestrator] Created server with ID {}", server_id);

        if let Some(timeout) = spec.wait_timeout {
            wait_for_log_message(
                &*self.runtime,
                &server_id,
                &self.config.ready_log_message,
                timeout,
            )
            .await?;
        }

        if spec.workers > 0 {
            tracing::info!(
                "[Orchestrator] Booting {} workers for cluster {}",
                spec.workers,
                spec.name
            );
            for i in 0..spec.workers as u64 {
                let worker_id = self.create_node(&spec, NodeRole::Worker, i, created).await?;
                tracing::info!("[Orchestrator] Created worker with ID {}", worker_id);
            }
        }

        Ok(())
    }

    /// Create and start one node container. Shared by create and add-node:
    /// both paths build the runtime config the same way.
    async fn create_node(
        &self,
        spec: &ClusterSpec,
        role: NodeRole,
        suffix: u64,
        created: &mut Vec<Provisioned>,
    ) -> Result<String, ClusterError> {
        let config = node_config(spec, role, suffix);
        let id = self.runtime.create_container(&config).await?;
        created.push(Provisioned::Container {
            id: id.clone(),
            name: config.name.clone(),
        });
        self.runtime.start_container(&id).await?;
        Ok(id)
    }

    /// Best-effort unwind of everything created so far, newest first.
    /// Sub-errors are logged and ignored: partially rolled-back state is
    /// still preferable to a half-created cluster.
    async fn rollback(&self, created: &[Provisioned]) {
        for resource in created.iter().rev() {
            match resource {
                Provisioned::Container { id, name } => {
                    if let Err(e) = self.runtime.remove_container(id).await {
                        tracing::warn!(
                            "[Orchestrator] Rollback: couldn't remove container {}: {}",
                            name,
                            e
                        );
                    }
                }
                Provisioned::ClusterDir(name) => {
                    if let Err(e) = self.dirs.delete_cluster_dir(name) {
                        tracing::warn!(
                            "[Orchestrator] Rollback: couldn't remove cluster dir for {}: {}",
                            name,
                            e
                        );
                    }
                }
                Provisioned::Volume(name) => {
                    if let Err(e) = self.runtime.remove_volume(name).await {
                        tracing::warn!(
                            "[Orchestrator] Rollback: couldn't remove volume {}: {}",
                            name,
                            e
                        );
                    }
                }
                Provisioned::Network(name) => {
                    if let Err(e) = self.runtime.remove_network(name).await {
                        tracing::warn!(
                            "[Orchestrator] Rollback: couldn't remove network {}: {}",
                            name,
                            e
                        );
                    }
                }
            }
        }
    }

    /// Delete clusters. Workers, artifact directory, network and volume are
    /// removed best-effort; a server removal failure is fatal for that
    /// cluster (and the operation's result), but remaining clusters are still
    /// processed. Deleting a name with no containers is a no-op.
    pub async fn delete(&self, all: bool, name: &str) -> Result<(), ClusterError> {
        let clusters = discover(&*self.runtime, all, name).await?;
        let mut first_fatal: Option<ClusterError> = None;

        for cluster in clusters {
            tracing::info!("[Orchestrator] Removing cluster [{}]", cluster.name);

            if !cluster.workers.is_empty() {
                tracing::info!(
                    "[Orchestrator] ...Removing {} workers",
                    cluster.workers.len()
                );
                for worker in &cluster.workers {
                    if let Err(e) = self.runtime.remove_container(&worker.id).await {
                        tracing::warn!(
                            "[Orchestrator] Couldn't remove worker {}: {}",
                            worker.name,
                            e
                        );
                    }
                }
            }

            if let Err(e) = self.dirs.delete_cluster_dir(&cluster.name) {
                tracing::warn!(
                    "[Orchestrator] Couldn't remove cluster dir for {}: {}",
                    cluster.name,
                    e
                );
            }

            if let Some(server) = &cluster.server {
                tracing::info!("[Orchestrator] ...Removing server");
                if let Err(e) = self.runtime.remove_container(&server.id).await {
                    tracing::warn!(
                        "[Orchestrator] Couldn't remove server for cluster {}: {}",
                        cluster.name,
                        e
                    );
                    first_fatal.get_or_insert(e.into());
                    continue;
                }
            }

            if let Err(e) = self.runtime.remove_network(&network_name(&cluster.name)).await {
                tracing::warn!(
                    "[Orchestrator] Couldn't delete network for cluster {}: {}",
                    cluster.name,
                    e
                );
            }
            if let Err(e) = self
                .runtime
                .remove_volume(&image_volume_name(&cluster.name))
                .await
            {
                tracing::warn!(
                    "[Orchestrator] Couldn't delete image volume for cluster {}: {}",
                    cluster.name,
                    e
                );
            }

            tracing::info!("[Orchestrator] SUCCESS: removed cluster [{}]", cluster.name);
        }

        match first_fatal {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Stop clusters, workers first so they don't thrash reconnecting while
    /// the server goes down. Per-worker failures are logged and skipped;
    /// a server stop failure is fatal for that cluster.
    pub async fn stop(&self, all: bool, name: &str) -> Result<(), ClusterError> {
        let clusters = discover(&*self.runtime, all, name).await?;
        let mut first_fatal: Option<ClusterError> = None;

        for cluster in clusters {
            tracing::info!("[Orchestrator] Stopping cluster [{}]", cluster.name);

            if !cluster.workers.is_empty() {
                tracing::info!(
                    "[Orchestrator] ...Stopping {} workers",
                    cluster.workers.len()
                );
                for worker in &cluster.workers {
                    if let Err(e) = self.runtime.stop_container(&worker.id).await {
                        tracing::warn!(
                            "[Orchestrator] Couldn't stop worker {}: {}",
                            worker.name,
                            e
                        );
                    }
                }
            }

            if let Some(server) = &cluster.server {
                tracing::info!("[Orchestrator] ...Stopping server");
                if let Err(e) = self.runtime.stop_container(&server.id).await {
                    tracing::warn!(
                        "[Orchestrator] Couldn't stop server for cluster {}: {}",
                        cluster.name,
                        e
                    );
                    first_fatal.get_or_insert(e.into());
                    continue;
                }
            }

            tracing::info!("[Orchestrator] SUCCESS: stopped cluster [{}]", cluster.name);
        }

        match first_fatal {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Start clusters, server first so workers find it when they rejoin.
    /// A server start failure is fatal for that cluster and its workers are
    /// left alone; per-worker failures are logged and skipped.
    pub async fn start(&self, all: bool, name: &str) -> Result<(), ClusterError> {
        let clusters = discover(&*self.runtime, all, name).await?;
        let mut first_fatal: Option<ClusterError> = None;

        for cluster in clusters {
            tracing::info!("[Orchestrator] Starting cluster [{}]", cluster.name);

            if let Some(server) = &cluster.server {
                tracing::info!("[Orchestrator] ...Starting server");
                if let Err(e) = self.runtime.start_container(&server.id).await {
                    tracing::warn!(
                        "[Orchestrator] Couldn't start server for cluster {}: {}",
                        cluster.name,
                        e
                    );
                    first_fatal.get_or_insert(e.into());
                    continue;
                }
            }

            if !cluster.workers.is_empty() {
                tracing::info!(
                    "[Orchestrator] ...Starting {} workers",
                    cluster.workers.len()
                );
                for worker in &cluster.workers {
                    if let Err(e) = self.runtime.start_container(&worker.id).await {
                        tracing::warn!(
                            "[Orchestrator] Couldn't start worker {}: {}",
                            worker.name,
                            e
                        );
                    }
                }
            }

            tracing::info!("[Orchestrator] SUCCESS: started cluster [{}]", cluster.name);
        }

        match first_fatal {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Add worker nodes to an existing cluster.
    ///
    /// The join configuration is derived from the running server container,
    /// not from stored state. New ordinals continue above the highest
    /// existing worker suffix, never reusing gaps left by deletions. There is
    /// no rollback here: workers created before a failing one remain, a
    /// deliberate asymmetry with create, since they joined a healthy cluster
    /// and are individually deletable.
    pub async fn add_node(
        &self,
        cluster: &str,
        role: NodeRole,
        count: usize,
        image: &str,
    ) -> Result<Vec<String>, ClusterError> {
        if role != NodeRole::Worker {
            return Err(ClusterError::Validation(
                "adding server nodes is not supported".to_string(),
            ));
        }

        // The server must be running: its env and command line are the join
        // protocol.
        let server_filter = component_filter(cluster, NodeRole::Server);
        let servers = self.runtime.list_containers(&server_filter, false).await?;
        let server = servers.first().ok_or_else(|| {
            ClusterError::NotFound(format!(
                "no running server container for cluster {cluster}"
            ))
        })?;
        let details = self.runtime.inspect_container(&server.id).await?;
        let join = derive_join_config(&details)?;

        let worker_filter = component_filter(cluster, NodeRole::Worker);
        let workers = self.runtime.list_containers(&worker_filter, true).await?;
        let mut highest: u64 = 0;
        for worker in &workers {
            let suffix = worker_suffix(&worker.name).ok_or_else(|| {
                ClusterError::Consistency(format!(
                    "worker container {} has no numeric name suffix",
                    worker.name
                ))
            })?;
            highest = highest.max(suffix);
        }

        let image = if image.is_empty() {
            self.config.default_image.as_str()
        } else {
            image
        };
        let spec = ClusterSpec::joining(cluster, &qualify_image(image), join.agent_env());

        tracing::info!(
            "[Orchestrator] Adding {} worker node(s) to cluster {}...",
            count,
            cluster
        );
        let mut ids = Vec::with_capacity(count);
        let mut created = Vec::new();
        for suffix in highest + 1..=highest + count as u64 {
            let id = self
                .create_node(&spec, NodeRole::Worker, suffix, &mut created)
                .await?;
            tracing::info!("[Orchestrator] Created worker node with ID {}", id);
            ids.push(id);
        }
        Ok(ids)
    }
}

/// Labels identifying a cluster's resources (network, volume).
fn cluster_labels(cluster: &str) -> HashMap<String, String> {
    HashMap::from([
        (LABEL_APP.to_string(), APP_NAME.to_string()),
        (LABEL_CLUSTER.to_string(), cluster.to_string()),
    ])
}

/// Labels identifying one node container.
fn node_labels(cluster: &str, role: NodeRole) -> HashMap<String, String> {
    let mut labels = cluster_labels(cluster);
    labels.insert(LABEL_COMPONENT.to_string(), role.as_str().to_string());
    labels
}

/// Build the runtime container config for one node. Used identically by
/// create and add-node.
fn node_config(spec: &ClusterSpec, role: NodeRole, suffix: u64) -> ContainerConfig {
    let name = match role {
        NodeRole::Server => server_name(&spec.name),
        NodeRole::Worker => worker_name(&spec.name, suffix),
    };

    let (cmd, env, extra_port) = match role {
        NodeRole::Server => {
            let mut cmd = vec![
                "server".to_string(),
                API_PORT_FLAG.to_string(),
                spec.api_port.port.to_string(),
            ];
            if let Some(host) = &spec.api_port.host {
                cmd.push("--tls-san".to_string());
                cmd.push(host.clone());
            }
            cmd.extend(spec.server_args.iter().cloned());

            // Publish the API port from the server so kubectl can reach it
            // from the host, unless the port map already covers it.
            let already_mapped = spec
                .port_map
                .get(&name)
                .is_some_and(|bindings| bindings.iter().any(|b| b.host_port == spec.api_port.port));
            let api_binding = (!already_mapped).then(|| PortBinding {
                host_ip: spec.api_port.host.clone(),
                host_port: spec.api_port.port,
                container_port: spec.api_port.port,
                protocol: Protocol::Tcp,
            });
            (cmd, spec.env.clone(), api_binding)
        }
        NodeRole::Worker => {
            let mut cmd = vec!["agent".to_string()];
            cmd.extend(spec.agent_args.iter().cloned());

            // Joining specs already carry a derived server URL; cluster
            // creation points workers at the server's DNS name on the
            // cluster network.
            let mut env = spec.env.clone();
            let has_url = env
                .iter()
                .any(|e| e.starts_with(&format!("{SERVER_URL_VAR}=")));
            if !has_url {
                env.push(format!(
                    "{SERVER_URL_VAR}=https://{}:{}",
                    server_name(&spec.name),
                    spec.api_port.port
                ));
            }
            (cmd, env, None)
        }
    };

    let mut ports = spec.port_map.get(&name).cloned().unwrap_or_default();
    ports.extend(extra_port);

    ContainerConfig {
        name: name.clone(),
        image: spec.image.clone(),
        env,
        cmd,
        ports,
        volumes: spec.volumes.clone(),
        labels: node_labels(&spec.name, role),
        network: network_name(&spec.name),
        hostname: name,
        auto_restart: spec.auto_restart,
        privileged: true,
    }
}
