//! Restart delegation to the one-shot updater container.

use std::sync::Arc;
use std::time::Duration;

use tidewatch_config::OrchestratorConfig;
use tracing::info;

use crate::error::RuntimeError;
use crate::runtime::{ContainerRuntime, Mount, RunSpec};

/// What the delegate removes after replacing a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CleanupPolicy {
    pub remove_old_images: bool,
    pub remove_volumes: bool,
}

impl Default for CleanupPolicy {
    fn default() -> Self {
        Self {
            remove_old_images: true,
            remove_volumes: true,
        }
    }
}

/// How the delegate is scoped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestartScope {
    /// Exactly the given containers.
    Named,
    /// Every running container except the orchestrator, which is excluded
    /// explicitly so the delegate never restarts it mid-sweep.
    Sweep,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestartOutcome {
    NothingToDo,
    Delegated {
        container_id: String,
        targets: Vec<String>,
    },
}

/// Runs the delegate updater for confirmed changes.
pub struct UpdateExecutor {
    runtime: Arc<dyn ContainerRuntime>,
    delegate_image: String,
    docker_socket: String,
    own_container: String,
    stop_timeout: Duration,
    cleanup: CleanupPolicy,
}

impl UpdateExecutor {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, config: &OrchestratorConfig) -> Self {
        Self {
            runtime,
            delegate_image: config.delegate_image.clone(),
            docker_socket: config.docker_socket.clone(),
            own_container: config.self_container.clone(),
            stop_timeout: Duration::from_secs(config.stop_timeout_secs),
            cleanup: CleanupPolicy {
                remove_old_images: config.cleanup,
                remove_volumes: config.remove_volumes,
            },
        }
    }

    pub fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }

    pub fn with_cleanup(mut self, cleanup: CleanupPolicy) -> Self {
        self.cleanup = cleanup;
        self
    }

    pub fn delegate_image(&self) -> &str {
        &self.delegate_image
    }

    /// Restart `targets` through the delegate. An empty set is a no-op.
    pub async fn restart_for_change(
        &self,
        targets: &[String],
        scope: RestartScope,
    ) -> Result<RestartOutcome, RuntimeError> {
        if targets.is_empty() {
            return Ok(RestartOutcome::NothingToDo);
        }

        let socket = self.docker_socket.trim_start_matches("unix://");
        let spec = RunSpec::new(&self.delegate_image)
            .with_cmd(self.delegate_args(targets, &scope))
            .with_mount(Mount::read_write(socket, "/var/run/docker.sock"))
            .with_auto_remove(true);

        info!(
            delegate = %self.delegate_image,
            scope = ?scope,
            targets = ?targets,
            "Delegating restart"
        );
        let container_id = self.runtime.run_container(spec).await?;

        Ok(RestartOutcome::Delegated {
            container_id,
            targets: targets.to_vec(),
        })
    }

    fn delegate_args(&self, targets: &[String], scope: &RestartScope) -> Vec<String> {
        let mut args = vec!["--run-once".to_string()];
        if self.cleanup.remove_old_images {
            args.push("--cleanup".to_string());
        }
        if self.cleanup.remove_volumes {
            args.push("--remove-volumes".to_string());
        }
        args.push("--no-pull".to_string());
        args.push("--stop-timeout".to_string());
        args.push(format!("{}s", self.stop_timeout.as_secs()));

        match scope {
            RestartScope::Named => args.extend(targets.iter().cloned()),
            RestartScope::Sweep => {
                args.push("--disable-containers".to_string());
                args.push(self.own_container.clone());
            }
        }
        args
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeRuntime, RuntimeCall};

    fn executor(fake: Arc<FakeRuntime>) -> UpdateExecutor {
        let config = OrchestratorConfig {
            self_container: "self".to_string(),
            ..Default::default()
        };
        UpdateExecutor::new(fake, &config)
    }

    #[tokio::test]
    async fn test_empty_targets_never_delegate() {
        let fake = Arc::new(FakeRuntime::new());
        let outcome = executor(fake.clone())
            .restart_for_change(&[], RestartScope::Sweep)
            .await
            .unwrap();
        assert_eq!(outcome, RestartOutcome::NothingToDo);
        assert!(fake.calls().is_empty());
    }

    #[tokio::test]
    async fn test_named_restart_command() {
        let fake = Arc::new(FakeRuntime::new());
        let targets = vec!["worker".to_string(), "api".to_string()];
        let outcome = executor(fake.clone())
            .restart_for_change(&targets, RestartScope::Named)
            .await
            .unwrap();
        assert!(matches!(outcome, RestartOutcome::Delegated { .. }));

        let runs = fake.runs();
        assert_eq!(runs.len(), 1);
        let spec = &runs[0];
        assert_eq!(spec.image, "containrrr/watchtower");
        assert!(spec.auto_remove);
        assert_eq!(
            spec.cmd,
            vec![
                "--run-once",
                "--cleanup",
                "--remove-volumes",
                "--no-pull",
                "--stop-timeout",
                "30s",
                "worker",
                "api",
            ]
        );
        assert_eq!(
            spec.mounts,
            vec![Mount::read_write("/var/run/docker.sock", "/var/run/docker.sock")]
        );
    }

    #[tokio::test]
    async fn test_sweep_excludes_self() {
        let fake = Arc::new(FakeRuntime::new());
        let targets = vec!["worker".to_string()];
        executor(fake.clone())
            .with_cleanup(CleanupPolicy {
                remove_old_images: false,
                remove_volumes: false,
            })
            .with_stop_timeout(Duration::from_secs(5))
            .restart_for_change(&targets, RestartScope::Sweep)
            .await
            .unwrap();

        let runs = fake.runs();
        assert_eq!(
            runs[0].cmd,
            vec![
                "--run-once",
                "--no-pull",
                "--stop-timeout",
                "5s",
                "--disable-containers",
                "self",
            ]
        );
        assert!(!fake.calls().iter().any(|c| matches!(c, RuntimeCall::Pull(_))));
    }
}
