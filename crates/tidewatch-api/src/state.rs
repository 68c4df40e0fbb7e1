//! Process-scoped application context.
//!
//! Built once at startup, shared by every handler and the scheduler, and
//! torn down through [`AppContext::shutdown`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use tidewatch_config::Config;
use tidewatch_extract::{ExtractionPipeline, ModCache};
use tidewatch_runtime::{ContainerRuntime, DockerRuntime, UpdateService, UpdateTarget};
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::error::InterfaceError;
use crate::job::{FileJobStore, JobScheduler, JobStore, UpdateJobRunner};

/// Application state shared across handlers.
pub struct AppContext {
    pub config: Config,
    pub scheduler: Arc<JobScheduler>,
    pub updates: Arc<UpdateService>,
    pub pipeline: Arc<ExtractionPipeline>,
    pub cache: Arc<ModCache>,
    shutdown_tx: watch::Sender<bool>,
    scheduler_task: Mutex<Option<JoinHandle<()>>>,
    start_time: Instant,
}

impl AppContext {
    /// Wire the context from already-constructed collaborators.
    pub fn build(
        config: Config,
        runtime: Arc<dyn ContainerRuntime>,
        store: Arc<dyn JobStore>,
        cache: Arc<ModCache>,
    ) -> Self {
        let updates = Arc::new(UpdateService::new(runtime.clone(), &config.orchestrator));
        let runner = Arc::new(UpdateJobRunner::new(updates.clone()));
        let scheduler = Arc::new(JobScheduler::new(store, runner, &config.scheduler));
        let pipeline = Arc::new(ExtractionPipeline::new(
            runtime,
            cache.clone(),
            &config.extraction,
        ));
        let (shutdown_tx, _) = watch::channel(false);

        Self {
            config,
            scheduler,
            updates,
            pipeline,
            cache,
            shutdown_tx,
            scheduler_task: Mutex::new(None),
            start_time: Instant::now(),
        }
    }

    /// Connect to Docker and open the on-disk job stores and mod cache.
    pub async fn from_config(config: Config) -> Result<Self, InterfaceError> {
        let runtime = DockerRuntime::connect(&config.orchestrator.docker_socket)?;
        if let Err(e) = runtime.ping().await {
            warn!(socket = %config.orchestrator.docker_socket, error = %e, "Docker daemon not reachable yet");
        }

        let store = FileJobStore::new(config.jobs_path()).await?;
        let cache = ModCache::open(config.mod_cache_path()).await?;

        Ok(Self::build(
            config,
            Arc::new(runtime),
            Arc::new(store),
            Arc::new(cache),
        ))
    }

    /// Startup sequence: optional image prune and self-update check, reload jobs,
    /// start the timer, then install missing built-in jobs.
    pub async fn startup(&self) -> Result<(), InterfaceError> {
        if self.config.orchestrator.update_on_startup {
            match self.updates.prune_images().await {
                Ok(outcome) => info!(outcome = ?outcome, "Startup image prune"),
                Err(e) => warn!(error = %e, "Startup image prune failed"),
            }
            let target = UpdateTarget::SelfUpdate;
            match self.updates.run(&target).await {
                Ok(outcome) => info!(target = %target, outcome = ?outcome, "Startup update step"),
                Err(e) => warn!(target = %target, error = %e, "Startup update step failed"),
            }
        }

        self.scheduler.load().await?;
        self.start_scheduler().await;
        self.scheduler
            .reconcile_builtin_jobs(&self.config.orchestrator)
            .await?;
        Ok(())
    }

    async fn start_scheduler(&self) {
        let mut task = self.scheduler_task.lock().await;
        if task.is_some() {
            return;
        }
        let shutdown = self.shutdown_tx.subscribe();
        *task = Some(tokio::spawn(self.scheduler.clone().run(shutdown)));
    }

    /// Stop the timer and wait for in-flight firings.
    pub async fn shutdown(&self) {
        self.shutdown_tx.send_replace(true);
        let task = self.scheduler_task.lock().await.take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!("Scheduler task ended abnormally: {}", e);
            }
        }
        info!("Application context shut down");
    }

    /// Get uptime.
    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }
}
