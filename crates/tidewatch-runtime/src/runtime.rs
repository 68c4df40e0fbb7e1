//! Container runtime abstraction.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::RuntimeError;

/// A running container as seen by the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerSummary {
    pub id: String,
    /// Name without the leading `/`.
    pub name: String,
    /// Content id of the image the container runs.
    pub image_id: String,
    /// Tags currently pointing at that image.
    pub image_tags: Vec<String>,
}

/// A bind or named-volume mount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mount {
    pub source: String,
    pub target: String,
    pub read_only: bool,
}

impl Mount {
    pub fn read_only(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            read_only: true,
        }
    }

    pub fn read_write(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            read_only: false,
        }
    }

    /// Docker bind string, `source:target:ro|rw`.
    pub fn to_bind(&self) -> String {
        let mode = if self.read_only { "ro" } else { "rw" };
        format!("{}:{}:{}", self.source, self.target, mode)
    }
}

/// Parameters for starting a detached container.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSpec {
    pub image: String,
    pub name: Option<String>,
    pub cmd: Vec<String>,
    pub mounts: Vec<Mount>,
    pub env: Vec<String>,
    /// Remove the container once it exits.
    pub auto_remove: bool,
}

impl RunSpec {
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            ..Default::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_cmd<I, S>(mut self, cmd: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.cmd = cmd.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_mount(mut self, mount: Mount) -> Self {
        self.mounts.push(mount);
        self
    }

    pub fn with_auto_remove(mut self, auto_remove: bool) -> Self {
        self.auto_remove = auto_remove;
        self
    }
}

/// Captured result of a command run inside a container.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    pub exit_code: i64,
    pub stdout: String,
    pub stderr: String,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// What a prune reclaimed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PruneReport {
    pub containers_deleted: usize,
    pub images_deleted: usize,
    pub volumes_deleted: usize,
    pub networks_deleted: usize,
    pub space_reclaimed: u64,
}

/// Operations the orchestrator consumes from a container runtime.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Local content id for a reference, `None` when the image is absent.
    async fn image_id(&self, reference: &str) -> Result<Option<String>, RuntimeError>;

    /// Pull a reference from its registry and return the resulting content id.
    async fn pull_image(&self, reference: &str) -> Result<String, RuntimeError>;

    /// Running containers with the tags of their images.
    async fn list_running(&self) -> Result<Vec<ContainerSummary>, RuntimeError>;

    /// Create and start a detached container, returning its id.
    async fn run_container(&self, spec: RunSpec) -> Result<String, RuntimeError>;

    /// Run a command inside a running container and capture its output.
    async fn exec(&self, container: &str, argv: Vec<String>) -> Result<ExecOutput, RuntimeError>;

    /// Raw contents of a file inside a running container, `None` when it
    /// cannot be read.
    async fn read_file(&self, container: &str, path: &str) -> Result<Option<Vec<u8>>, RuntimeError>;

    /// Create or replace a file inside a running container.
    async fn write_file(
        &self,
        container: &str,
        path: &str,
        contents: Vec<u8>,
    ) -> Result<(), RuntimeError>;

    /// Stop a container, killing it after `timeout`.
    async fn stop_container(&self, container: &str, timeout: Duration) -> Result<(), RuntimeError>;

    /// Force-remove a container.
    async fn remove_container(&self, container: &str) -> Result<(), RuntimeError>;

    /// Prune stopped containers, dangling images, unused volumes and networks.
    async fn prune(&self) -> Result<PruneReport, RuntimeError>;

    /// Prune dangling images only.
    async fn prune_images(&self) -> Result<PruneReport, RuntimeError>;
}
