//! Sandboxed extraction pipeline.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use serde::Serialize;
use serde_json::Value;
use tidewatch_config::{ExtractionConfig, MountMode};
use tidewatch_runtime::{ContainerRuntime, ImageProbe, Mount, RunSpec, RuntimeError};
use tracing::{debug, info, warn};

use crate::cache::ModCache;
use crate::error::ExtractError;
use crate::script::ProbeScript;

/// Payload cached for a mod whose schema could not be extracted.
pub fn empty_result() -> Value {
    Value::Array(Vec::new())
}

/// Grace period given to the sandbox on teardown.
const TEARDOWN_STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// One id in a batch that degraded to the empty sentinel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartialExtractionFailure {
    pub mod_id: String,
    pub reason: String,
}

/// Result of a refresh batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExtractionReport {
    /// Ids written to the cache, in request order.
    pub refreshed: Vec<String>,
    pub failures: Vec<PartialExtractionFailure>,
}

/// Extracts mod configuration schemas in a disposable sandbox.
pub struct ExtractionPipeline {
    runtime: Arc<dyn ContainerRuntime>,
    probe: ImageProbe,
    cache: Arc<ModCache>,
    config: ExtractionConfig,
    script: ProbeScript,
    timeout: Duration,
}

impl ExtractionPipeline {
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        cache: Arc<ModCache>,
        config: &ExtractionConfig,
    ) -> Self {
        Self {
            probe: ImageProbe::new(runtime.clone()),
            runtime,
            cache,
            script: ProbeScript::from_config(config),
            timeout: Duration::from_secs(config.timeout_secs),
            config: config.clone(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn cache(&self) -> &Arc<ModCache> {
        &self.cache
    }

    /// Extract and cache the schema of every id in one sandbox.
    pub async fn refresh(&self, ids: &[String]) -> Result<ExtractionReport, ExtractError> {
        let mut report = ExtractionReport::default();
        let mut batch: Vec<String> = Vec::new();
        for id in ids {
            if !is_valid_id(id) {
                report.failures.push(PartialExtractionFailure {
                    mod_id: id.clone(),
                    reason: "invalid mod id".to_string(),
                });
            } else if !batch.contains(id) {
                batch.push(id.clone());
            }
        }
        if batch.is_empty() {
            return Ok(report);
        }

        if self.config.pull_sandbox_image {
            self.refresh_sandbox_image().await;
        }

        let container = self.launch().await?;
        info!(container = %container, count = batch.len(), "Sandbox launched");

        let body = AssertUnwindSafe(self.extract_all(&container, &batch)).catch_unwind();
        let results = body.await;
        self.teardown(&container).await;
        let results = match results {
            Ok(results) => results,
            Err(panic) => std::panic::resume_unwind(panic),
        };

        let mut entries = Vec::with_capacity(results.len());
        for (id, result) in results {
            match result {
                Ok(value) => entries.push((id.clone(), value)),
                Err(reason) => {
                    warn!(mod_id = %id, reason = %reason, "Extraction degraded to empty result");
                    entries.push((id.clone(), empty_result()));
                    report.failures.push(PartialExtractionFailure {
                        mod_id: id.clone(),
                        reason,
                    });
                }
            }
            report.refreshed.push(id);
        }

        self.cache.upsert_many(entries).await?;
        info!(
            refreshed = report.refreshed.len(),
            failures = report.failures.len(),
            "Extraction batch cached"
        );
        Ok(report)
    }

    /// Pull the sandbox image and prune if it moved. Failures are logged; a
    /// local copy may still be usable.
    async fn refresh_sandbox_image(&self) {
        match self.probe.pull(&self.config.sandbox_image).await {
            Ok(outcome) if outcome.changed => {
                if let Err(e) = self.runtime.prune_images().await {
                    warn!(error = %e, "Prune after sandbox image refresh failed");
                }
            }
            Ok(_) => {}
            Err(e) => warn!(image = %self.config.sandbox_image, error = %e, "Sandbox image refresh failed"),
        }
    }

    async fn launch(&self) -> Result<String, ExtractError> {
        let mut spec = RunSpec::new(&self.config.sandbox_image)
            .with_cmd(["tail", "-f", "/dev/null"])
            .with_auto_remove(true);
        for volume in &self.config.volumes {
            let mount = match self.config.mount_mode {
                MountMode::ReadOnly => Mount::read_only(&volume.source, &volume.target),
                MountMode::ReadWrite => Mount::read_write(&volume.source, &volume.target),
            };
            spec = spec.with_mount(mount);
        }

        self.bounded("launch sandbox", self.runtime.run_container(spec))
            .await
            .map_err(|e| ExtractError::SandboxLifecycle(e.to_string()))
    }

    /// Stop and remove the sandbox. Failures are logged, never raised.
    async fn teardown(&self, container: &str) {
        if let Err(e) = self
            .bounded(
                "stop sandbox",
                self.runtime.stop_container(container, TEARDOWN_STOP_TIMEOUT),
            )
            .await
        {
            warn!(container = %container, error = %e, "Failed to stop sandbox");
        }
        match self
            .bounded("remove sandbox", self.runtime.remove_container(container))
            .await
        {
            // Auto-remove may already have reaped it.
            Ok(()) | Err(RuntimeError::NotFound(_)) => {
                debug!(container = %container, "Sandbox torn down");
            }
            Err(e) => warn!(container = %container, error = %e, "Failed to remove sandbox"),
        }
    }

    async fn extract_all(
        &self,
        container: &str,
        ids: &[String],
    ) -> Vec<(String, Result<Value, String>)> {
        let mut results = Vec::with_capacity(ids.len());
        for id in ids {
            let result = self.extract_one(container, id).await;
            results.push((id.clone(), result));
        }
        results
    }

    async fn extract_one(&self, container: &str, id: &str) -> Result<Value, String> {
        let descriptor = self.read_descriptor(container, id).await?;
        let document = self.script.render(&descriptor);
        let script_path = format!(
            "{}/{}.lua",
            self.config.script_dir.trim_end_matches('/'),
            id
        );

        self.bounded(
            "write probe script",
            self.runtime.write_file(container, &script_path, document),
        )
        .await
        .map_err(|e| format!("write probe script: {}", e))?;

        let run = self
            .exec(
                container,
                vec![self.config.interpreter.clone(), script_path],
            )
            .await?;
        if !run.success() {
            return Err(format!("interpreter failed: {}", run.stderr.trim()));
        }

        serde_json::from_str(run.stdout.trim()).map_err(|e| format!("malformed output: {}", e))
    }

    /// First layout whose descriptor can be read.
    async fn read_descriptor(&self, container: &str, id: &str) -> Result<Vec<u8>, String> {
        for layout in &self.config.descriptor_layouts {
            let path = layout.replace("{id}", id);
            let contents = self
                .bounded("read descriptor", self.runtime.read_file(container, &path))
                .await
                .map_err(|e| e.to_string())?;
            if let Some(contents) = contents {
                debug!(mod_id = %id, path = %path, "Descriptor found");
                return Ok(contents);
            }
        }
        Err("descriptor not found".to_string())
    }

    async fn exec(
        &self,
        container: &str,
        argv: Vec<String>,
    ) -> Result<tidewatch_runtime::ExecOutput, String> {
        self.bounded("exec", self.runtime.exec(container, argv))
            .await
            .map_err(|e| e.to_string())
    }

    async fn bounded<T>(
        &self,
        what: &str,
        fut: impl Future<Output = Result<T, RuntimeError>>,
    ) -> Result<T, RuntimeError> {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(RuntimeError::Timeout(format!(
                "{} after {:?}",
                what, self.timeout
            ))),
        }
    }
}

/// Ids end up in file paths and shell arguments inside the sandbox.
fn is_valid_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 128
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
        && !id.starts_with('.')
}

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod tests;
