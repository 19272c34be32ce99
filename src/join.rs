//! Join configuration derived from a live server container.
//!
//! Joining agents need the cluster secret and the server's API endpoint.
//! Neither is stored anywhere: both are recovered by inspecting the running
//! server container: the secret from its env, the listen port from its
//! command line. This couples the join path to how the server was originally
//! launched, which is the deliberate price of keeping no cluster metadata.

use crate::error::ClusterError;
use crate::runtime::ContainerDetails;
use crate::spec::{API_PORT_FLAG, CLUSTER_SECRET_VAR, SERVER_URL_VAR};

/// Everything a new worker needs to authenticate with an existing cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinConfig {
    /// The server's `K3S_CLUSTER_SECRET=...` env entry, reused verbatim.
    pub secret_env: String,
    /// API endpoint reachable over the cluster network, by the server's
    /// runtime-assigned DNS name, not a host-exposed address.
    pub url: String,
}

impl JoinConfig {
    /// The `K3S_URL=...` env entry for a joining agent.
    pub fn url_env(&self) -> String {
        format!("{SERVER_URL_VAR}={}", self.url)
    }

    /// Env list for a joining agent: server URL, then the shared secret.
    pub fn agent_env(&self) -> Vec<String> {
        vec![self.url_env(), self.secret_env.clone()]
    }
}

/// Recover the join configuration from an inspected server container.
///
/// Fails with `NotFound` when the secret variable or the listen-port flag is
/// absent; that indicates a server container not created by this system, or
/// an incompatible version of it.
pub fn derive_join_config(server: &ContainerDetails) -> Result<JoinConfig, ClusterError> {
    let secret_env = server
        .env
        .iter()
        .find(|entry| {
            entry
                .split_once('=')
                .is_some_and(|(key, _)| key == CLUSTER_SECRET_VAR)
        })
        .cloned()
        .ok_or_else(|| {
            ClusterError::NotFound(format!(
                "{CLUSTER_SECRET_VAR} not set on server container {}",
                server.name
            ))
        })?;

    let port = api_listen_port(&server.cmd).ok_or_else(|| {
        ClusterError::NotFound(format!(
            "{API_PORT_FLAG} not found in command of server container {}",
            server.name
        ))
    })?;

    Ok(JoinConfig {
        secret_env,
        url: format!("https://{}:{}", server.name, port),
    })
}

/// Positional scan for the API listen port: the argument following the flag.
fn api_listen_port(cmd: &[String]) -> Option<&str> {
    let index = cmd.iter().position(|arg| arg == API_PORT_FLAG)?;
    cmd.get(index + 1).map(String::as_str)
}

/// Strategy for resolving the external API host when the caller supplies
/// none. The legacy behavior of reading a machine IP from the environment is
/// kept available but never wired in implicitly.
pub trait ApiHostResolver: Send + Sync {
    fn resolve(&self) -> Option<String>;
}

/// Default strategy: never resolve a fallback host.
#[derive(Debug, Default)]
pub struct NoFallback;

impl ApiHostResolver for NoFallback {
    fn resolve(&self) -> Option<String> {
        None
    }
}

/// Resolve the API host from an environment variable. Must be passed to the
/// orchestrator explicitly; nothing consults the ambient environment on its
/// own.
#[derive(Debug)]
pub struct EnvResolver {
    var: String,
}

impl EnvResolver {
    pub fn new(var: &str) -> Self {
        Self {
            var: var.to_string(),
        }
    }
}

impl ApiHostResolver for EnvResolver {
    fn resolve(&self) -> Option<String> {
        std::env::var(&self.var).ok().filter(|v| !v.is_empty())
    }
}
