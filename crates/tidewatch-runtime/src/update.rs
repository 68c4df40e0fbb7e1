//! Update service: probe, filter and delegate for one job target.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tidewatch_config::OrchestratorConfig;
use tracing::{debug, info, warn};

use crate::error::RuntimeError;
use crate::executor::{RestartOutcome, RestartScope, UpdateExecutor};
use crate::guard::{SelfIdentity, SelfProtectionFilter};
use crate::probe::ImageProbe;
use crate::reference;
use crate::runtime::{ContainerRuntime, ContainerSummary, PruneReport};

/// What a scheduled update acts on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum UpdateTarget {
    /// Sweep over every running container except the orchestrator.
    AllContainers,
    /// Refresh every managed image in use and restart what changed.
    AllImages,
    SingleContainer { reference: String },
    SingleImage { reference: String },
    /// Reclaim unused containers, images, volumes and networks.
    Prune,
    /// Refresh the delegate and replace the orchestrator's own container.
    SelfUpdate,
}

impl UpdateTarget {
    pub fn validate(&self) -> Result<(), RuntimeError> {
        match self {
            UpdateTarget::SingleContainer { reference } | UpdateTarget::SingleImage { reference }
                if reference.trim().is_empty() =>
            {
                Err(RuntimeError::Validation(
                    "target reference cannot be empty".to_string(),
                ))
            }
            _ => Ok(()),
        }
    }
}

impl std::fmt::Display for UpdateTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UpdateTarget::AllContainers => write!(f, "all-containers"),
            UpdateTarget::AllImages => write!(f, "all-images"),
            UpdateTarget::SingleContainer { reference } => write!(f, "container:{}", reference),
            UpdateTarget::SingleImage { reference } => write!(f, "image:{}", reference),
            UpdateTarget::Prune => write!(f, "prune"),
            UpdateTarget::SelfUpdate => write!(f, "self-update"),
        }
    }
}

/// Result of running one target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "kebab-case")]
pub enum UpdateOutcome {
    Unchanged,
    Restarted { targets: Vec<String> },
    Skipped { reason: String },
    Pruned { report: PruneReport },
}

/// Composes probe, filter and executor.
pub struct UpdateService {
    runtime: Arc<dyn ContainerRuntime>,
    probe: ImageProbe,
    executor: UpdateExecutor,
    config: OrchestratorConfig,
}

impl UpdateService {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, config: &OrchestratorConfig) -> Self {
        Self {
            probe: ImageProbe::new(runtime.clone()),
            executor: UpdateExecutor::new(runtime.clone(), config),
            runtime,
            config: config.clone(),
        }
    }

    pub fn runtime(&self) -> &Arc<dyn ContainerRuntime> {
        &self.runtime
    }

    pub fn probe(&self) -> &ImageProbe {
        &self.probe
    }

    /// Run a single target to completion.
    pub async fn run(&self, target: &UpdateTarget) -> Result<UpdateOutcome, RuntimeError> {
        target.validate()?;
        match target {
            UpdateTarget::AllContainers => self.update_all_containers().await,
            UpdateTarget::AllImages => self.update_all_images().await,
            UpdateTarget::SingleContainer { reference } => self.update_container(reference).await,
            UpdateTarget::SingleImage { reference } => self.update_image(reference).await,
            UpdateTarget::Prune => self.prune().await,
            UpdateTarget::SelfUpdate => self.update_self().await,
        }
    }

    /// Fresh filter for this sweep; the own identity can change between sweeps.
    async fn filter(&self) -> Result<SelfProtectionFilter, RuntimeError> {
        let identity = SelfIdentity::resolve(self.runtime.as_ref(), &self.config).await?;
        Ok(identity.filter(&self.config.managed_prefix))
    }

    /// Names of `containers` whose managed tags now resolve to a different id.
    ///
    /// Probe failures are logged and skipped; if nothing changed and any
    /// probe failed, the first failure is returned.
    async fn changed_containers(
        &self,
        containers: &[ContainerSummary],
        filter: &SelfProtectionFilter,
    ) -> Result<Vec<String>, RuntimeError> {
        let mut pulled: HashMap<String, String> = HashMap::new();
        let mut changed = Vec::new();
        let mut first_error = None;

        for container in containers {
            if !filter.allows_container(&container.name) {
                continue;
            }
            for tag in filter.filter_images(&container.image_tags) {
                let cached = pulled.get(&tag).cloned();
                let new_id = match cached {
                    Some(id) => id,
                    None => match self.probe.pull(&tag).await {
                        Ok(outcome) => {
                            pulled.insert(tag.clone(), outcome.new_id.clone());
                            outcome.new_id
                        }
                        Err(e) => {
                            warn!(container = %container.name, tag = %tag, error = %e, "Probe failed, skipping");
                            first_error.get_or_insert(e);
                            continue;
                        }
                    },
                };
                if new_id != container.image_id {
                    debug!(container = %container.name, tag = %tag, "Running image is stale");
                    if !changed.contains(&container.name) {
                        changed.push(container.name.clone());
                    }
                }
            }
        }

        match first_error {
            Some(e) if changed.is_empty() => Err(e),
            _ => Ok(changed),
        }
    }

    async fn restart(
        &self,
        targets: Vec<String>,
        scope: RestartScope,
    ) -> Result<UpdateOutcome, RuntimeError> {
        match self.executor.restart_for_change(&targets, scope).await? {
            RestartOutcome::NothingToDo => Ok(UpdateOutcome::Unchanged),
            RestartOutcome::Delegated { targets, .. } => Ok(UpdateOutcome::Restarted { targets }),
        }
    }

    /// Update one container by name.
    pub async fn update_container(&self, name: &str) -> Result<UpdateOutcome, RuntimeError> {
        let filter = self.filter().await?;
        if !filter.allows_container(name) {
            return Ok(UpdateOutcome::Skipped {
                reason: format!("container '{}' is protected", name),
            });
        }

        let running = self.runtime.list_running().await?;
        let Some(container) = running.into_iter().find(|c| c.name == name) else {
            return Ok(UpdateOutcome::Skipped {
                reason: format!("container '{}' is not running", name),
            });
        };

        let changed = self.changed_containers(&[container], &filter).await?;
        self.restart(changed, RestartScope::Named).await
    }

    /// Sweep over every running container.
    pub async fn update_all_containers(&self) -> Result<UpdateOutcome, RuntimeError> {
        let filter = self.filter().await?;
        let running = self.runtime.list_running().await?;
        let changed = self.changed_containers(&running, &filter).await?;
        info!(changed = changed.len(), "Container sweep probed");
        self.restart(changed, RestartScope::Sweep).await
    }

    /// Refresh one image and restart the containers running a stale copy.
    pub async fn update_image(&self, image: &str) -> Result<UpdateOutcome, RuntimeError> {
        let filter = self.filter().await?;
        if !filter.allows_image(image) {
            return Ok(UpdateOutcome::Skipped {
                reason: format!("image '{}' is protected or unmanaged", image),
            });
        }

        // A pull moves the tag off the old image, so the users of `image`
        // are identified before pulling.
        let previous_id = self.runtime.image_id(image).await?;
        let users: Vec<ContainerSummary> = self
            .runtime
            .list_running()
            .await?
            .into_iter()
            .filter(|c| filter.allows_container(&c.name))
            .filter(|c| {
                c.image_tags.iter().any(|t| same_reference(t, image))
                    || previous_id.as_deref() == Some(c.image_id.as_str())
            })
            .collect();

        let outcome = self.probe.pull(image).await?;
        let stale: Vec<String> = users
            .into_iter()
            .filter(|c| c.image_id != outcome.new_id)
            .map(|c| c.name)
            .collect();
        self.restart(stale, RestartScope::Named).await
    }

    /// Refresh every managed image in use and restart stale containers.
    pub async fn update_all_images(&self) -> Result<UpdateOutcome, RuntimeError> {
        let filter = self.filter().await?;
        let running = self.runtime.list_running().await?;
        let changed = self.changed_containers(&running, &filter).await?;
        self.restart(changed, RestartScope::Named).await
    }

    pub async fn prune(&self) -> Result<UpdateOutcome, RuntimeError> {
        let report = self.runtime.prune().await?;
        info!(
            containers = report.containers_deleted,
            images = report.images_deleted,
            volumes = report.volumes_deleted,
            networks = report.networks_deleted,
            bytes = report.space_reclaimed,
            "Pruned"
        );
        Ok(UpdateOutcome::Pruned { report })
    }

    /// Remove dangling images left behind by a refresh.
    pub async fn prune_images(&self) -> Result<UpdateOutcome, RuntimeError> {
        let report = self.runtime.prune_images().await?;
        info!(
            images = report.images_deleted,
            bytes = report.space_reclaimed,
            "Pruned dangling images"
        );
        Ok(UpdateOutcome::Pruned { report })
    }

    /// Refresh the delegate image, then replace the own container if its
    /// image moved. The delegate does the replacement from outside.
    pub async fn update_self(&self) -> Result<UpdateOutcome, RuntimeError> {
        match self.probe.pull(self.executor.delegate_image()).await {
            Ok(outcome) if outcome.changed => {
                if let Err(e) = self.prune_images().await {
                    warn!(error = %e, "Prune after delegate refresh failed");
                }
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "Could not refresh delegate image"),
        }

        let outcome = self.probe.pull(&self.config.self_image).await?;
        if !outcome.changed {
            return Ok(UpdateOutcome::Unchanged);
        }

        info!(image = %self.config.self_image, "New orchestrator image, handing over to delegate");
        self.restart(vec![self.config.self_container.clone()], RestartScope::Named)
            .await
    }
}

/// `repo` and `repo:latest` name the same image.
fn same_reference(a: &str, b: &str) -> bool {
    reference::split_for_pull(a) == reference::split_for_pull(b)
}

#[cfg(test)]
#[path = "update_tests.rs"]
mod tests;
