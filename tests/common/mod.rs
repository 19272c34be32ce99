//! In-memory container runtime double shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::Mutex;
use tokio::io::AsyncWriteExt;

use k3d::runtime::{
    ContainerConfig, ContainerDetails, ContainerRuntime, ContainerState, ContainerSummary,
    LabelFilter, LogStream, RuntimeError,
};

/// Server log used when a test doesn't supply one. Contains the readiness
/// marker so waits succeed by default.
pub const DEFAULT_SERVER_LOG: &str = "\
time=\"2019-05-27T08:37:21Z\" level=info msg=\"Starting k3s\"\n\
time=\"2019-05-27T08:37:29Z\" level=info msg=\"Listening on :6443\"\n\
time=\"2019-05-27T08:37:42Z\" level=info msg=\"Running kubelet\"\n";

#[derive(Clone)]
pub struct FakeContainer {
    pub id: String,
    pub config: ContainerConfig,
    pub state: ContainerState,
}

enum LogSource {
    /// Fixed content; the stream closes when it is exhausted.
    Closed(String),
    /// Fixed content followed by a stream that stays open forever.
    Open(String),
}

struct Inner {
    next_id: u64,
    networks: HashMap<String, HashMap<String, String>>,
    volumes: HashMap<String, HashMap<String, String>>,
    containers: Vec<FakeContainer>,
    logs: HashMap<String, LogSource>,
    fail_create: Option<String>,
    // Writer halves kept alive so "open" log streams never see EOF.
    open_writers: Vec<tokio::io::DuplexStream>,
}

/// In-memory `ContainerRuntime` recording networks, volumes and containers.
pub struct FakeRuntime {
    inner: Mutex<Inner>,
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                next_id: 0,
                networks: HashMap::new(),
                volumes: HashMap::new(),
                containers: Vec::new(),
                logs: HashMap::new(),
                fail_create: None,
                open_writers: Vec::new(),
            }),
        }
    }

    /// Make `create_container` fail when asked for this container name.
    pub fn fail_on_create(&self, name: &str) {
        self.inner.lock().unwrap().fail_create = Some(name.to_string());
    }

    /// Serve this log content for the named container; the stream closes at
    /// the end of the content.
    pub fn set_log(&self, name: &str, content: &str) {
        self.inner
            .lock()
            .unwrap()
            .logs
            .insert(name.to_string(), LogSource::Closed(content.to_string()));
    }

    /// Serve this log content for the named container and then keep the
    /// stream open indefinitely, so readers block instead of seeing EOF.
    pub fn set_log_open(&self, name: &str, content: &str) {
        self.inner
            .lock()
            .unwrap()
            .logs
            .insert(name.to_string(), LogSource::Open(content.to_string()));
    }

    pub fn network_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.lock().unwrap().networks.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn volume_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.lock().unwrap().volumes.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn container_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .inner
            .lock()
            .unwrap()
            .containers
            .iter()
            .map(|c| c.config.name.clone())
            .collect();
        names.sort();
        names
    }

    pub fn container(&self, name: &str) -> Option<FakeContainer> {
        self.inner
            .lock()
            .unwrap()
            .containers
            .iter()
            .find(|c| c.config.name == name)
            .cloned()
    }

    pub fn container_id(&self, name: &str) -> Option<String> {
        self.container(name).map(|c| c.id)
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn ping(&self) -> Result<String, RuntimeError> {
        Ok("1.40-fake".to_string())
    }

    async fn create_network(
        &self,
        name: &str,
        labels: &HashMap<String, String>,
    ) -> Result<String, RuntimeError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.networks.contains_key(name) {
            return Err(RuntimeError::Api(format!("network {name} already exists")));
        }
        inner.networks.insert(name.to_string(), labels.clone());
        Ok(format!("net-{name}"))
    }

    async fn remove_network(&self, name: &str) -> Result<(), RuntimeError> {
        self.inner
            .lock()
            .unwrap()
            .networks
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| RuntimeError::NotFound(format!("network {name}")))
    }

    async fn create_volume(
        &self,
        name: &str,
        labels: &HashMap<String, String>,
    ) -> Result<String, RuntimeError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.volumes.contains_key(name) {
            return Err(RuntimeError::Api(format!("volume {name} already exists")));
        }
        inner.volumes.insert(name.to_string(), labels.clone());
        Ok(name.to_string())
    }

    async fn remove_volume(&self, name: &str) -> Result<(), RuntimeError> {
        self.inner
            .lock()
            .unwrap()
            .volumes
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| RuntimeError::NotFound(format!("volume {name}")))
    }

    async fn create_container(&self, config: &ContainerConfig) -> Result<String, RuntimeError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.fail_create.as_deref() == Some(config.name.as_str()) {
            return Err(RuntimeError::Api(format!(
                "injected failure creating {}",
                config.name
            )));
        }
        if inner.containers.iter().any(|c| c.config.name == config.name) {
            return Err(RuntimeError::Api(format!(
                "container name {} already in use",
                config.name
            )));
        }
        inner.next_id += 1;
        let id = format!("c{:04}", inner.next_id);
        inner.containers.push(FakeContainer {
            id: id.clone(),
            config: config.clone(),
            state: ContainerState::Created,
        });
        Ok(id)
    }

    async fn start_container(&self, id: &str) -> Result<(), RuntimeError> {
        let mut inner = self.inner.lock().unwrap();
        let container = inner
            .containers
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| RuntimeError::NotFound(format!("container {id}")))?;
        container.state = ContainerState::Running;
        Ok(())
    }

    async fn stop_container(&self, id: &str) -> Result<(), RuntimeError> {
        let mut inner = self.inner.lock().unwrap();
        let container = inner
            .containers
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| RuntimeError::NotFound(format!("container {id}")))?;
        container.state = ContainerState::Stopped;
        Ok(())
    }

    async fn remove_container(&self, id: &str) -> Result<(), RuntimeError> {
        let mut inner = self.inner.lock().unwrap();
        let index = inner
            .containers
            .iter()
            .position(|c| c.id == id)
            .ok_or_else(|| RuntimeError::NotFound(format!("container {id}")))?;
        inner.containers.remove(index);
        Ok(())
    }

    async fn inspect_container(&self, id: &str) -> Result<ContainerDetails, RuntimeError> {
        let inner = self.inner.lock().unwrap();
        let container = inner
            .containers
            .iter()
            .find(|c| c.id == id)
            .ok_or_else(|| RuntimeError::NotFound(format!("container {id}")))?;
        Ok(ContainerDetails {
            id: container.id.clone(),
            name: container.config.name.clone(),
            env: container.config.env.clone(),
            cmd: container.config.cmd.clone(),
            state: container.state,
        })
    }

    async fn list_containers(
        &self,
        filter: &LabelFilter,
        all: bool,
    ) -> Result<Vec<ContainerSummary>, RuntimeError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .containers
            .iter()
            .filter(|c| filter.matches(&c.config.labels))
            .filter(|c| all || c.state == ContainerState::Running)
            .map(|c| ContainerSummary {
                id: c.id.clone(),
                name: c.config.name.clone(),
                labels: c.config.labels.clone(),
                state: c.state,
            })
            .collect())
    }

    async fn container_logs(&self, id: &str) -> Result<LogStream, RuntimeError> {
        let (open, content) = {
            let inner = self.inner.lock().unwrap();
            let container = inner
                .containers
                .iter()
                .find(|c| c.id == id)
                .ok_or_else(|| RuntimeError::NotFound(format!("container {id}")))?;
            match inner.logs.get(&container.config.name) {
                Some(LogSource::Closed(content)) => (false, content.clone()),
                Some(LogSource::Open(content)) => (true, content.clone()),
                None => (false, DEFAULT_SERVER_LOG.to_string()),
            }
        };

        if open {
            let (mut writer, reader) = tokio::io::duplex(64 * 1024);
            writer
                .write_all(content.as_bytes())
                .await
                .map_err(|e| RuntimeError::Api(e.to_string()))?;
            self.inner.lock().unwrap().open_writers.push(writer);
            Ok(Box::pin(reader))
        } else {
            Ok(Box::pin(Cursor::new(content.into_bytes())))
        }
    }
}
