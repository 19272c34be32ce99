//! Readiness watcher: tail a container's log stream until a marker line
//! appears or a deadline passes.

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::Duration;

use crate::error::ClusterError;
use crate::runtime::ContainerRuntime;

/// Block until a line containing `marker` shows up in the container's
/// combined output.
///
/// The stream starts at the moment of the call, not at container start, so
/// this must be invoked promptly after starting the container or the marker
/// can be missed. Single-shot: a `Timeout` or `Stream` error is returned to
/// the caller, which decides whether it is fatal; there are no retries.
pub async fn wait_for_log_message(
    runtime: &dyn ContainerRuntime,
    container_id: &str,
    marker: &str,
    timeout_secs: u64,
) -> Result<(), ClusterError> {
    tracing::info!(
        "[Watcher] Waiting up to {}s for \"{}\" in logs of {}",
        timeout_secs,
        marker,
        container_id
    );

    let stream = runtime.container_logs(container_id).await?;
    let scan = async {
        let mut lines = BufReader::new(stream).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if line.contains(marker) {
                        tracing::info!("[Watcher] Marker found for {}", container_id);
                        return Ok(());
                    }
                }
                Ok(None) => {
                    return Err(ClusterError::Stream(format!(
                        "log stream of {container_id} closed before \"{marker}\" appeared"
                    )))
                }
                Err(e) => return Err(ClusterError::Stream(e.to_string())),
            }
        }
    };

    match tokio::time::timeout(Duration::from_secs(timeout_secs), scan).await {
        Ok(result) => result,
        Err(_) => Err(ClusterError::Timeout {
            marker: marker.to_string(),
            seconds: timeout_secs,
        }),
    }
}
