//! Docker Engine implementation of [`ContainerRuntime`].

use std::time::Duration;

use async_trait::async_trait;
use bollard::Docker;
use bollard::container::{
    Config, CreateContainerOptions, ListContainersOptions, LogOutput, PruneContainersOptions,
    RemoveContainerOptions, StopContainerOptions,
};
use bollard::exec::{CreateExecOptions, StartExecResults};
use bollard::image::{CreateImageOptions, PruneImagesOptions};
use bollard::models::HostConfig;
use bollard::network::PruneNetworksOptions;
use bollard::volume::PruneVolumesOptions;
use futures::{StreamExt, TryStreamExt};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::error::RuntimeError;
use crate::reference;
use crate::runtime::{ContainerRuntime, ContainerSummary, ExecOutput, PruneReport, RunSpec};

/// Seconds bollard waits on a single API request.
const REQUEST_TIMEOUT_SECS: u64 = 120;

/// Exec output before any text decoding.
struct RawExec {
    exit_code: i64,
    stdout: Vec<u8>,
    stderr: Vec<u8>,
}

/// Runtime backed by the local Docker daemon.
#[derive(Clone)]
pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    /// Connect to the daemon listening on `socket`.
    pub fn connect(socket: &str) -> Result<Self, RuntimeError> {
        let docker = Docker::connect_with_unix(socket, REQUEST_TIMEOUT_SECS, bollard::API_DEFAULT_VERSION)
            .map_err(|e| RuntimeError::TransientInfra(format!("connect {}: {}", socket, e)))?;
        debug!(socket = %socket, "Connected to Docker");
        Ok(Self { docker })
    }

    /// Wrap an existing client.
    pub fn from_client(docker: Docker) -> Self {
        Self { docker }
    }

    /// Check that the daemon answers.
    pub async fn ping(&self) -> Result<(), RuntimeError> {
        self.docker
            .ping()
            .await
            .map(|_| ())
            .map_err(|e| map_error("ping", e))
    }

    /// Run `argv` in `container`, optionally feeding `stdin`, and collect
    /// its output as raw bytes.
    async fn run_exec(
        &self,
        container: &str,
        argv: Vec<String>,
        stdin: Option<Vec<u8>>,
    ) -> Result<RawExec, RuntimeError> {
        let options = CreateExecOptions {
            cmd: Some(argv),
            attach_stdin: Some(stdin.is_some()),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            ..Default::default()
        };
        let exec = self
            .docker
            .create_exec(container, options)
            .await
            .map_err(|e| map_error(container, e))?;

        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        match self
            .docker
            .start_exec(&exec.id, None)
            .await
            .map_err(|e| map_error(container, e))?
        {
            StartExecResults::Attached {
                mut output,
                mut input,
            } => {
                if let Some(bytes) = stdin {
                    let io_error =
                        |e: std::io::Error| RuntimeError::TransientInfra(format!("{}: {}", container, e));
                    input.write_all(&bytes).await.map_err(io_error)?;
                    // EOF on stdin lets the command finish.
                    input.shutdown().await.map_err(io_error)?;
                }
                while let Some(chunk) = output.next().await {
                    match chunk.map_err(|e| map_error(container, e))? {
                        LogOutput::StdOut { message } | LogOutput::Console { message } => {
                            stdout.extend_from_slice(&message);
                        }
                        LogOutput::StdErr { message } => {
                            stderr.extend_from_slice(&message);
                        }
                        LogOutput::StdIn { .. } => {}
                    }
                }
            }
            StartExecResults::Detached => {}
        }

        let inspect = self
            .docker
            .inspect_exec(&exec.id)
            .await
            .map_err(|e| map_error(container, e))?;

        Ok(RawExec {
            exit_code: inspect.exit_code.unwrap_or(-1),
            stdout,
            stderr,
        })
    }

    async fn image_tags(&self, image_id: &str) -> Vec<String> {
        match self.docker.inspect_image(image_id).await {
            Ok(image) => image.repo_tags.unwrap_or_default(),
            Err(e) => {
                debug!(image_id = %image_id, error = %e, "Could not inspect container image");
                Vec::new()
            }
        }
    }
}

fn map_error(context: &str, e: bollard::errors::Error) -> RuntimeError {
    match e {
        bollard::errors::Error::DockerResponseServerError {
            status_code: 404,
            message,
        } => RuntimeError::NotFound(format!("{}: {}", context, message)),
        bollard::errors::Error::DockerResponseServerError {
            status_code: 400,
            message,
        } => RuntimeError::Validation(format!("{}: {}", context, message)),
        other => RuntimeError::TransientInfra(format!("{}: {}", context, other)),
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn image_id(&self, reference: &str) -> Result<Option<String>, RuntimeError> {
        match self.docker.inspect_image(reference).await {
            Ok(image) => Ok(image.id),
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => Ok(None),
            Err(e) => Err(map_error(reference, e)),
        }
    }

    async fn pull_image(&self, reference: &str) -> Result<String, RuntimeError> {
        if reference.is_empty() {
            return Err(RuntimeError::Validation("empty image reference".to_string()));
        }

        let (repo, tag) = reference::split_for_pull(reference);
        let options = CreateImageOptions {
            from_image: repo,
            tag,
            ..Default::default()
        };

        debug!(reference = %reference, "Pulling image");
        self.docker
            .create_image(Some(options), None, None)
            .try_collect::<Vec<_>>()
            .await
            .map_err(|e| map_error(reference, e))?;

        self.image_id(reference)
            .await?
            .ok_or_else(|| RuntimeError::NotFound(format!("{} missing after pull", reference)))
    }

    async fn list_running(&self) -> Result<Vec<ContainerSummary>, RuntimeError> {
        let options = ListContainersOptions::<String> {
            all: false,
            ..Default::default()
        };
        let containers = self
            .docker
            .list_containers(Some(options))
            .await
            .map_err(|e| map_error("list containers", e))?;

        let mut summaries = Vec::with_capacity(containers.len());
        for container in containers {
            let Some(id) = container.id else { continue };
            let name = container
                .names
                .unwrap_or_default()
                .into_iter()
                .next()
                .map(|n| n.trim_start_matches('/').to_string())
                .unwrap_or_default();
            let image_id = container.image_id.unwrap_or_default();
            let image_tags = if image_id.is_empty() {
                Vec::new()
            } else {
                self.image_tags(&image_id).await
            };
            summaries.push(ContainerSummary {
                id,
                name,
                image_id,
                image_tags,
            });
        }
        Ok(summaries)
    }

    async fn run_container(&self, spec: RunSpec) -> Result<String, RuntimeError> {
        let binds: Vec<String> = spec.mounts.iter().map(|m| m.to_bind()).collect();
        let host_config = HostConfig {
            binds: if binds.is_empty() { None } else { Some(binds) },
            auto_remove: Some(spec.auto_remove),
            ..Default::default()
        };

        let config = Config {
            image: Some(spec.image.clone()),
            cmd: if spec.cmd.is_empty() { None } else { Some(spec.cmd.clone()) },
            env: if spec.env.is_empty() { None } else { Some(spec.env.clone()) },
            host_config: Some(host_config),
            ..Default::default()
        };

        let options = spec.name.clone().map(|name| CreateContainerOptions {
            name,
            ..Default::default()
        });

        let response = self
            .docker
            .create_container(options, config)
            .await
            .map_err(|e| map_error(&spec.image, e))?;
        let container_id = response.id;

        if let Err(e) = self
            .docker
            .start_container::<String>(&container_id, None)
            .await
        {
            // Created but never started; auto-remove will not fire.
            if let Err(remove_err) = self.remove_container(&container_id).await {
                warn!(container = %container_id, error = %remove_err, "Failed to remove unstarted container");
            }
            return Err(map_error(&spec.image, e));
        }

        info!(image = %spec.image, container = %container_id, "Started container");
        Ok(container_id)
    }

    async fn exec(&self, container: &str, argv: Vec<String>) -> Result<ExecOutput, RuntimeError> {
        let raw = self.run_exec(container, argv, None).await?;
        Ok(ExecOutput {
            exit_code: raw.exit_code,
            stdout: String::from_utf8_lossy(&raw.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&raw.stderr).into_owned(),
        })
    }

    async fn read_file(&self, container: &str, path: &str) -> Result<Option<Vec<u8>>, RuntimeError> {
        let raw = self
            .run_exec(container, vec!["cat".to_string(), path.to_string()], None)
            .await?;
        if raw.exit_code != 0 {
            debug!(
                container = %container,
                path = %path,
                stderr = %String::from_utf8_lossy(&raw.stderr).trim(),
                "File not readable"
            );
            return Ok(None);
        }
        Ok(Some(raw.stdout))
    }

    async fn write_file(
        &self,
        container: &str,
        path: &str,
        contents: Vec<u8>,
    ) -> Result<(), RuntimeError> {
        let argv = vec![
            "sh".to_string(),
            "-c".to_string(),
            "cat > \"$0\"".to_string(),
            path.to_string(),
        ];
        let raw = self.run_exec(container, argv, Some(contents)).await?;
        if raw.exit_code != 0 {
            return Err(RuntimeError::Exec {
                container: container.to_string(),
                exit_code: raw.exit_code,
                stderr: String::from_utf8_lossy(&raw.stderr).trim().to_string(),
            });
        }
        Ok(())
    }

    async fn stop_container(&self, container: &str, timeout: Duration) -> Result<(), RuntimeError> {
        self.docker
            .stop_container(
                container,
                Some(StopContainerOptions {
                    t: timeout.as_secs() as i64,
                }),
            )
            .await
            .map_err(|e| map_error(container, e))
    }

    async fn remove_container(&self, container: &str) -> Result<(), RuntimeError> {
        self.docker
            .remove_container(
                container,
                Some(RemoveContainerOptions {
                    force: true,
                    ..Default::default()
                }),
            )
            .await
            .map_err(|e| map_error(container, e))
    }

    async fn prune(&self) -> Result<PruneReport, RuntimeError> {
        let containers = self
            .docker
            .prune_containers(None::<PruneContainersOptions<String>>)
            .await
            .map_err(|e| map_error("prune containers", e))?;
        let images = self
            .docker
            .prune_images(None::<PruneImagesOptions<String>>)
            .await
            .map_err(|e| map_error("prune images", e))?;
        let volumes = self
            .docker
            .prune_volumes(None::<PruneVolumesOptions<String>>)
            .await
            .map_err(|e| map_error("prune volumes", e))?;
        let networks = self
            .docker
            .prune_networks(None::<PruneNetworksOptions<String>>)
            .await
            .map_err(|e| map_error("prune networks", e))?;

        let space = containers.space_reclaimed.unwrap_or(0)
            + images.space_reclaimed.unwrap_or(0)
            + volumes.space_reclaimed.unwrap_or(0);

        Ok(PruneReport {
            containers_deleted: containers.containers_deleted.map_or(0, |v| v.len()),
            images_deleted: images.images_deleted.map_or(0, |v| v.len()),
            volumes_deleted: volumes.volumes_deleted.map_or(0, |v| v.len()),
            networks_deleted: networks.networks_deleted.map_or(0, |v| v.len()),
            space_reclaimed: space.max(0) as u64,
        })
    }

    async fn prune_images(&self) -> Result<PruneReport, RuntimeError> {
        let images = self
            .docker
            .prune_images(None::<PruneImagesOptions<String>>)
            .await
            .map_err(|e| map_error("prune images", e))?;
        Ok(PruneReport {
            images_deleted: images.images_deleted.map_or(0, |v| v.len()),
            space_reclaimed: images.space_reclaimed.unwrap_or(0).max(0) as u64,
            ..Default::default()
        })
    }
}
