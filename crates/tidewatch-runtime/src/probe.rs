//! Image change detection.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::RuntimeError;
use crate::runtime::ContainerRuntime;

/// Result of pulling one reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullOutcome {
    /// The local content id differs from the one recorded before the pull.
    pub changed: bool,
    pub new_id: String,
}

/// Pulls references and reports whether the local copy changed.
///
/// Concurrent pulls of the same reference are serialised; the second caller
/// compares against the id the first one already fetched.
pub struct ImageProbe {
    runtime: Arc<dyn ContainerRuntime>,
    in_flight: DashMap<String, Arc<Mutex<()>>>,
}

impl ImageProbe {
    pub fn new(runtime: Arc<dyn ContainerRuntime>) -> Self {
        Self {
            runtime,
            in_flight: DashMap::new(),
        }
    }

    pub fn runtime(&self) -> &Arc<dyn ContainerRuntime> {
        &self.runtime
    }

    /// Pull `reference` and compare content ids before and after.
    pub async fn pull(&self, reference: &str) -> Result<PullOutcome, RuntimeError> {
        if reference.is_empty() {
            return Err(RuntimeError::Validation("empty image reference".to_string()));
        }

        let lock = self
            .in_flight
            .entry(reference.to_string())
            .or_default()
            .clone();
        let _guard = lock.lock().await;

        let old_id = self.runtime.image_id(reference).await?;
        let new_id = self.runtime.pull_image(reference).await.map_err(|e| match e {
            RuntimeError::NotFound(msg) => {
                RuntimeError::TransientInfra(format!("pull {}: {}", reference, msg))
            }
            other => other,
        })?;
        let changed = old_id.as_deref() != Some(new_id.as_str());

        if changed {
            info!(reference = %reference, old = ?old_id, new = %new_id, "Image changed");
        } else {
            debug!(reference = %reference, id = %new_id, "Image unchanged");
        }

        Ok(PullOutcome { changed, new_id })
    }
}
