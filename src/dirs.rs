//! Per-cluster artifact directories.
//!
//! Each cluster gets a local directory for config artifacts (the kubeconfig
//! written by the server). Opaque to the orchestrator: directory presence is
//! never consulted for cluster existence; labels on containers are the only
//! membership record.

use std::path::{Path, PathBuf};

use crate::error::ClusterError;

/// Filesystem collaborator for cluster artifact bookkeeping.
pub trait ClusterDirs: Send + Sync {
    fn create_cluster_dir(&self, cluster: &str) -> Result<(), ClusterError>;

    /// Remove a cluster's artifact directory. Removing a directory that does
    /// not exist is not an error.
    fn delete_cluster_dir(&self, cluster: &str) -> Result<(), ClusterError>;

    /// Where the cluster's kubeconfig is expected on the host.
    fn kubeconfig_path(&self, cluster: &str) -> PathBuf;
}

/// Cluster directories under a single base directory on the local filesystem.
pub struct LocalClusterDirs {
    base: PathBuf,
}

impl LocalClusterDirs {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    fn cluster_dir(&self, cluster: &str) -> PathBuf {
        self.base.join(cluster)
    }

    pub fn base(&self) -> &Path {
        &self.base
    }
}

impl ClusterDirs for LocalClusterDirs {
    fn create_cluster_dir(&self, cluster: &str) -> Result<(), ClusterError> {
        let dir = self.cluster_dir(cluster);
        std::fs::create_dir_all(&dir)?;
        tracing::debug!("[ClusterDirs] Created cluster directory {:?}", dir);
        Ok(())
    }

    fn delete_cluster_dir(&self, cluster: &str) -> Result<(), ClusterError> {
        let dir = self.cluster_dir(cluster);
        if dir.exists() {
            std::fs::remove_dir_all(&dir)?;
            tracing::debug!("[ClusterDirs] Removed cluster directory {:?}", dir);
        }
        Ok(())
    }

    fn kubeconfig_path(&self, cluster: &str) -> PathBuf {
        self.cluster_dir(cluster).join("kubeconfig.yaml")
    }
}
