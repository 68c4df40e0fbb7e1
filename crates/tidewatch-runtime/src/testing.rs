//! Scripted in-memory runtime for tests.
//!
//! Images live in two maps: `local` (what `image_id` sees) and `registry`
//! (what a pull fetches). Running containers report the tags that point at
//! their image in `local`, so a pull that moves a tag hides it from containers
//! still on the old image. Files are shared by every container, and `exec`
//! treats its last argument as a script path whose stdout is scripted.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::RuntimeError;
use crate::reference;
use crate::runtime::{ContainerRuntime, ContainerSummary, ExecOutput, PruneReport, RunSpec};

/// A call observed by the fake runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeCall {
    ImageId(String),
    Pull(String),
    ListRunning,
    Run(RunSpec),
    Exec { container: String, argv: Vec<String> },
    ReadFile { container: String, path: String },
    WriteFile { container: String, path: String },
    Stop { container: String },
    Remove { container: String },
    Prune,
    PruneImages,
}

#[derive(Default)]
struct FakeState {
    local: HashMap<String, String>,
    registry: HashMap<String, String>,
    failing_pulls: HashSet<String>,
    containers: Vec<ContainerSummary>,
    files: HashMap<String, Vec<u8>>,
    script_outputs: HashMap<String, String>,
    fail_run: bool,
    fail_list: bool,
    exec_delay: Option<Duration>,
    started: Vec<String>,
    next_id: u64,
    calls: Vec<RuntimeCall>,
}

/// In-memory [`ContainerRuntime`] that records every call.
#[derive(Default)]
pub struct FakeRuntime {
    state: Mutex<FakeState>,
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// `repo` and `repo:latest` share one entry.
    fn key(reference: &str) -> String {
        let (repo, tag) = reference::split_for_pull(reference);
        if tag.is_empty() {
            repo
        } else {
            format!("{}:{}", repo, tag)
        }
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut FakeState) -> R) -> R {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut state)
    }

    /// Make `reference` present locally with `id`.
    pub fn set_local_image(&self, reference: &str, id: &str) {
        self.with_state(|s| s.local.insert(Self::key(reference), id.to_string()));
    }

    /// Make a pull of `reference` yield `id`.
    pub fn publish(&self, reference: &str, id: &str) {
        self.with_state(|s| s.registry.insert(Self::key(reference), id.to_string()));
    }

    /// Make pulls of `reference` fail as if the registry were down.
    pub fn fail_pull(&self, reference: &str) {
        self.with_state(|s| s.failing_pulls.insert(Self::key(reference)));
    }

    pub fn local_image(&self, reference: &str) -> Option<String> {
        self.with_state(|s| s.local.get(&Self::key(reference)).cloned())
    }

    /// Register a running container whose image carries `tags`.
    pub fn add_container<I, S>(&self, name: &str, image_id: &str, tags: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let tags: Vec<String> = tags.into_iter().map(Into::into).collect();
        self.with_state(|s| {
            for tag in &tags {
                s.local.entry(Self::key(tag)).or_insert_with(|| image_id.to_string());
            }
            s.containers.push(ContainerSummary {
                id: format!("id-{}", name),
                name: name.to_string(),
                image_id: image_id.to_string(),
                image_tags: tags,
            });
        });
    }

    /// Place a file visible in every container.
    pub fn put_file(&self, path: &str, contents: impl AsRef<[u8]>) {
        self.with_state(|s| s.files.insert(path.to_string(), contents.as_ref().to_vec()));
    }

    pub fn file(&self, path: &str) -> Option<Vec<u8>> {
        self.with_state(|s| s.files.get(path).cloned())
    }

    /// Stdout produced when the interpreter runs `script_path`.
    pub fn set_script_output(&self, script_path: &str, stdout: &str) {
        self.with_state(|s| {
            s.script_outputs
                .insert(script_path.to_string(), stdout.to_string())
        });
    }

    pub fn fail_run(&self, fail: bool) {
        self.with_state(|s| s.fail_run = fail);
    }

    pub fn fail_list(&self, fail: bool) {
        self.with_state(|s| s.fail_list = fail);
    }

    /// Delay every `exec`, `read_file` and `write_file` by `delay`.
    pub fn set_exec_delay(&self, delay: Duration) {
        self.with_state(|s| s.exec_delay = Some(delay));
    }

    pub fn calls(&self) -> Vec<RuntimeCall> {
        self.with_state(|s| s.calls.clone())
    }

    /// Every container started, in order.
    pub fn runs(&self) -> Vec<RunSpec> {
        self.with_state(|s| {
            s.calls
                .iter()
                .filter_map(|c| match c {
                    RuntimeCall::Run(spec) => Some(spec.clone()),
                    _ => None,
                })
                .collect()
        })
    }

    /// Containers started and not yet removed.
    pub fn live_containers(&self) -> Vec<String> {
        self.with_state(|s| s.started.clone())
    }

    fn run_exec(state: &FakeState, argv: &[String]) -> ExecOutput {
        match argv.last().and_then(|p| state.script_outputs.get(p)) {
            Some(stdout) => ExecOutput {
                exit_code: 0,
                stdout: stdout.clone(),
                stderr: String::new(),
            },
            None => ExecOutput {
                exit_code: 1,
                stdout: String::new(),
                stderr: "script error".to_string(),
            },
        }
    }

    async fn sandbox_delay(&self) {
        let delay = self.with_state(|s| s.exec_delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    fn ensure_started(state: &FakeState, container: &str) -> Result<(), RuntimeError> {
        if state.started.iter().any(|c| c == container) {
            Ok(())
        } else {
            Err(RuntimeError::NotFound(container.to_string()))
        }
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn image_id(&self, reference: &str) -> Result<Option<String>, RuntimeError> {
        self.with_state(|s| {
            s.calls.push(RuntimeCall::ImageId(reference.to_string()));
            Ok(s.local.get(&Self::key(reference)).cloned())
        })
    }

    async fn pull_image(&self, reference: &str) -> Result<String, RuntimeError> {
        // Yield so concurrent pulls interleave.
        tokio::task::yield_now().await;
        self.with_state(|s| {
            s.calls.push(RuntimeCall::Pull(reference.to_string()));
            let key = Self::key(reference);
            if s.failing_pulls.contains(&key) {
                return Err(RuntimeError::TransientInfra(format!(
                    "registry unreachable for {}",
                    reference
                )));
            }
            let id = s
                .registry
                .get(&key)
                .cloned()
                .ok_or_else(|| RuntimeError::NotFound(reference.to_string()))?;
            s.local.insert(key, id.clone());
            Ok(id)
        })
    }

    async fn list_running(&self) -> Result<Vec<ContainerSummary>, RuntimeError> {
        self.with_state(|s| {
            s.calls.push(RuntimeCall::ListRunning);
            if s.fail_list {
                return Err(RuntimeError::TransientInfra("daemon unreachable".to_string()));
            }
            let containers = s
                .containers
                .iter()
                .map(|c| {
                    let mut image_tags: Vec<String> = s
                        .local
                        .iter()
                        .filter(|(_, id)| **id == c.image_id)
                        .map(|(tag, _)| tag.clone())
                        .collect();
                    image_tags.sort();
                    ContainerSummary {
                        image_tags,
                        ..c.clone()
                    }
                })
                .collect();
            Ok(containers)
        })
    }

    async fn run_container(&self, spec: RunSpec) -> Result<String, RuntimeError> {
        self.with_state(|s| {
            s.calls.push(RuntimeCall::Run(spec.clone()));
            if s.fail_run {
                return Err(RuntimeError::TransientInfra(format!(
                    "cannot start {}",
                    spec.image
                )));
            }
            s.next_id += 1;
            let id = format!("fake-{}", s.next_id);
            s.started.push(id.clone());
            Ok(id)
        })
    }

    async fn exec(&self, container: &str, argv: Vec<String>) -> Result<ExecOutput, RuntimeError> {
        self.sandbox_delay().await;
        self.with_state(|s| {
            s.calls.push(RuntimeCall::Exec {
                container: container.to_string(),
                argv: argv.clone(),
            });
            Self::ensure_started(s, container)?;
            Ok(Self::run_exec(s, &argv))
        })
    }

    async fn read_file(&self, container: &str, path: &str) -> Result<Option<Vec<u8>>, RuntimeError> {
        self.sandbox_delay().await;
        self.with_state(|s| {
            s.calls.push(RuntimeCall::ReadFile {
                container: container.to_string(),
                path: path.to_string(),
            });
            Self::ensure_started(s, container)?;
            Ok(s.files.get(path).cloned())
        })
    }

    async fn write_file(
        &self,
        container: &str,
        path: &str,
        contents: Vec<u8>,
    ) -> Result<(), RuntimeError> {
        self.sandbox_delay().await;
        self.with_state(|s| {
            s.calls.push(RuntimeCall::WriteFile {
                container: container.to_string(),
                path: path.to_string(),
            });
            Self::ensure_started(s, container)?;
            s.files.insert(path.to_string(), contents);
            Ok(())
        })
    }

    async fn stop_container(&self, container: &str, _timeout: Duration) -> Result<(), RuntimeError> {
        self.with_state(|s| {
            s.calls.push(RuntimeCall::Stop {
                container: container.to_string(),
            });
            Ok(())
        })
    }

    async fn remove_container(&self, container: &str) -> Result<(), RuntimeError> {
        self.with_state(|s| {
            s.calls.push(RuntimeCall::Remove {
                container: container.to_string(),
            });
            s.started.retain(|c| c != container);
            Ok(())
        })
    }

    async fn prune(&self) -> Result<PruneReport, RuntimeError> {
        self.with_state(|s| {
            s.calls.push(RuntimeCall::Prune);
            Ok(PruneReport::default())
        })
    }

    async fn prune_images(&self) -> Result<PruneReport, RuntimeError> {
        self.with_state(|s| {
            s.calls.push(RuntimeCall::PruneImages);
            Ok(PruneReport::default())
        })
    }
}
