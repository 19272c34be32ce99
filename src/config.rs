//! Orchestrator configuration.
//! Loaded from k3d.toml when present, defaults otherwise.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::spec::DEFAULT_IMAGE;

/// Tunable defaults for the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Image used when a spec names none.
    #[serde(default = "default_image")]
    pub default_image: String,

    /// Base directory for per-cluster artifact directories.
    #[serde(default = "default_base_dir")]
    pub base_dir: PathBuf,

    /// Log line marking the server as done bootstrapping.
    #[serde(default = "default_ready_log_message")]
    pub ready_log_message: String,
}

fn default_image() -> String {
    DEFAULT_IMAGE.to_string()
}

fn default_base_dir() -> PathBuf {
    let home = std::env::var_os("HOME").map(PathBuf::from).unwrap_or_default();
    home.join(".config").join("k3d")
}

fn default_ready_log_message() -> String {
    "Running kubelet".to_string()
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            default_image: default_image(),
            base_dir: default_base_dir(),
            ready_log_message: default_ready_log_message(),
        }
    }
}

impl OrchestratorConfig {
    /// Load configuration, probing the working directory and the base config
    /// directory. Falls back to defaults when no file is found.
    pub fn load() -> Self {
        let config_paths = vec![
            PathBuf::from("k3d.toml"),
            default_base_dir().join("k3d.toml"),
        ];

        for path in config_paths {
            if path.exists() {
                match std::fs::read_to_string(&path) {
                    Ok(content) => match toml::from_str(&content) {
                        Ok(config) => {
                            tracing::info!("Loaded orchestrator config from {:?}", path);
                            return config;
                        }
                        Err(e) => {
                            tracing::warn!("Failed to parse config file {:?}: {}", path, e);
                        }
                    },
                    Err(e) => {
                        tracing::warn!("Failed to read config file {:?}: {}", path, e);
                    }
                }
            }
        }

        Self::default()
    }
}
