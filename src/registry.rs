//! Cluster discovery from runtime state.
//!
//! There is no metadata store: the labels on node containers are the only
//! durable record of cluster membership. Discovery is a pure query (label
//! filters in, typed cluster views out) re-run on every orchestrator entry
//! point, never cached.

use std::collections::BTreeMap;

use crate::error::ClusterError;
use crate::runtime::{ContainerRuntime, ContainerState, LabelFilter};
use crate::spec::{
    worker_suffix, NodeRole, APP_NAME, LABEL_APP, LABEL_CLUSTER, LABEL_COMPONENT,
};

/// A realized node container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub id: String,
    pub name: String,
    pub role: NodeRole,
    pub state: ContainerState,
}

/// Discovered view of one cluster. Reconstructed from container labels on
/// every query; never persisted. A cluster with zero matching containers
/// does not exist, whatever filesystem artifacts remain for its name.
#[derive(Debug, Clone)]
pub struct Cluster {
    pub name: String,
    pub server: Option<Node>,
    /// Workers ordered by ascending name suffix.
    pub workers: Vec<Node>,
}

impl Cluster {
    /// All nodes, server first.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.server.iter().chain(self.workers.iter())
    }
}

/// Base filter matching every node container managed by this crate.
pub fn app_filter() -> LabelFilter {
    LabelFilter::new().label(LABEL_APP, APP_NAME)
}

/// Filter matching one cluster's containers of one component.
pub fn component_filter(cluster: &str, role: NodeRole) -> LabelFilter {
    app_filter()
        .label(LABEL_CLUSTER, cluster)
        .label(LABEL_COMPONENT, role.as_str())
}

/// Discover clusters from runtime state.
///
/// With `all` set, every cluster is returned and `name` is ignored; otherwise
/// results are restricted to `name`. A name with no matching containers is
/// simply absent from the result, never an error. Stopped containers are
/// included so stopped clusters remain discoverable.
pub async fn discover(
    runtime: &dyn ContainerRuntime,
    all: bool,
    name: &str,
) -> Result<Vec<Cluster>, ClusterError> {
    let mut filter = app_filter();
    if !all && !name.is_empty() {
        filter = filter.label(LABEL_CLUSTER, name);
    }
    let containers = runtime.list_containers(&filter, true).await?;

    // BTreeMap keeps the output ordered by cluster name.
    let mut clusters: BTreeMap<String, Cluster> = BTreeMap::new();

    for summary in containers {
        let Some(cluster_name) = summary.labels.get(LABEL_CLUSTER) else {
            tracing::warn!(
                "[Registry] Container {} carries app={} but no cluster label, skipping",
                summary.name,
                APP_NAME
            );
            continue;
        };
        let role = match summary.labels.get(LABEL_COMPONENT).map(String::as_str) {
            Some("server") => NodeRole::Server,
            Some("worker") => NodeRole::Worker,
            other => {
                tracing::warn!(
                    "[Registry] Container {} has unknown component label {:?}, skipping",
                    summary.name,
                    other
                );
                continue;
            }
        };
        let node = Node {
            id: summary.id,
            name: summary.name,
            role,
            state: summary.state,
        };

        let entry = clusters
            .entry(cluster_name.clone())
            .or_insert_with(|| Cluster {
                name: cluster_name.clone(),
                server: None,
                workers: Vec::new(),
            });
        match role {
            NodeRole::Server => {
                if let Some(existing) = &entry.server {
                    return Err(ClusterError::Consistency(format!(
                        "cluster {cluster_name} has multiple server containers \
                         ({} and {})",
                        existing.name, node.name
                    )));
                }
                entry.server = Some(node);
            }
            NodeRole::Worker => entry.workers.push(node),
        }
    }

    for cluster in clusters.values_mut() {
        cluster
            .workers
            .sort_by_key(|w| (worker_suffix(&w.name).unwrap_or(u64::MAX), w.name.clone()));
    }

    Ok(clusters.into_values().collect())
}
