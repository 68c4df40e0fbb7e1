//! Job scheduler: the single timer that fires stored jobs.
//!
//! All job state lives in one map behind one async mutex; every mutation
//! writes the affected store back through the [`JobStore`] before the lock
//! is released. Firings run on a bounded worker pool, and a job never
//! re-enters while a previous firing is still running.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use tidewatch_config::{OrchestratorConfig, SchedulerConfig};
use tokio::sync::{Mutex, Semaphore, watch};
use tokio::task::JoinSet;
use tokio::time::{self, Duration, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::definition::{Job, JobDefinition, JobKey, JobTarget, validate_name};
use super::runner::JobRunner;
use super::store::JobStore;
use super::trigger::{IntervalUnit, Trigger};
use crate::error::JobError;

/// Reserved id of the built-in prune job.
pub const PRUNE_JOB_ID: &str = "prune";

/// Reserved id of the built-in self-update job.
pub const SELF_UPDATE_JOB_ID: &str = "self-update";

/// Job scheduler that periodically checks for due jobs and dispatches them.
pub struct JobScheduler {
    store: Arc<dyn JobStore>,
    runner: Arc<dyn JobRunner>,
    jobs: Mutex<BTreeMap<JobKey, Job>>,
    in_flight: std::sync::Mutex<HashSet<JobKey>>,
    workers: Arc<Semaphore>,
    tasks: Mutex<JoinSet<()>>,
    check_interval: Duration,
    default_store: String,
    system_store: String,
}

impl JobScheduler {
    /// Create a new job scheduler.
    pub fn new(
        store: Arc<dyn JobStore>,
        runner: Arc<dyn JobRunner>,
        config: &SchedulerConfig,
    ) -> Self {
        Self {
            store,
            runner,
            jobs: Mutex::new(BTreeMap::new()),
            in_flight: std::sync::Mutex::new(HashSet::new()),
            workers: Arc::new(Semaphore::new(config.max_workers.max(1) as usize)),
            tasks: Mutex::new(JoinSet::new()),
            check_interval: Duration::from_secs(config.check_interval_secs.max(1)),
            default_store: config.default_store.clone(),
            system_store: config.system_store.clone(),
        }
    }

    /// Set the check interval.
    pub fn with_check_interval(mut self, interval: Duration) -> Self {
        self.check_interval = interval;
        self
    }

    /// Store used when a caller names none.
    pub fn default_store(&self) -> &str {
        &self.default_store
    }

    pub fn system_store(&self) -> &str {
        &self.system_store
    }

    /// Replace the in-memory state with every job from every store.
    pub async fn load(&self) -> Result<usize, JobError> {
        let loaded = self.store.load_all().await?;
        let mut jobs = self.jobs.lock().await;
        jobs.clear();
        for job in loaded {
            jobs.insert(job.key(), job);
        }
        info!(count = jobs.len(), "Loaded persisted jobs");
        Ok(jobs.len())
    }

    /// Create or replace `(store, definition.id)`.
    ///
    /// An existing job under the same key is removed before the new one is
    /// inserted; the store file is rewritten once. On a write failure the
    /// previous state is restored.
    pub async fn upsert(&self, store: &str, definition: JobDefinition) -> Result<Job, JobError> {
        validate_name("store name", store)?;
        let now = Utc::now();
        definition.validate(now)?;

        let job = Job::new(store, definition, now);
        let key = job.key();

        let mut jobs = self.jobs.lock().await;
        let previous = jobs.remove(&key);
        jobs.insert(key.clone(), job.clone());

        if let Err(e) = self.persist(&jobs, store).await {
            match previous {
                Some(previous) => jobs.insert(key, previous),
                None => jobs.remove(&key),
            };
            return Err(e);
        }

        info!(
            job = %key,
            trigger = %job.definition.trigger,
            replaced = previous.is_some(),
            "Job upserted"
        );
        Ok(job)
    }

    pub async fn get(&self, store: &str, id: &str) -> Option<Job> {
        let jobs = self.jobs.lock().await;
        jobs.get(&JobKey::new(store, id)).cloned()
    }

    /// Jobs ordered by `(store, id)`, optionally restricted to one store.
    pub async fn list(&self, store: Option<&str>) -> Vec<Job> {
        let jobs = self.jobs.lock().await;
        jobs.values()
            .filter(|job| store.is_none_or(|s| job.store == s))
            .cloned()
            .collect()
    }

    /// Remove a job. Returns `false` if it did not exist or could not be
    /// persisted; never errors. An in-flight firing still completes.
    pub async fn remove(&self, store: &str, id: &str) -> bool {
        let key = JobKey::new(store, id);
        let mut jobs = self.jobs.lock().await;
        let Some(previous) = jobs.remove(&key) else {
            debug!(job = %key, "Remove of unknown job");
            return false;
        };

        if let Err(e) = self.persist(&jobs, store).await {
            error!(job = %key, error = %e, "Failed to persist job removal");
            jobs.insert(key, previous);
            return false;
        }

        info!(job = %key, "Job removed");
        true
    }

    /// Install the built-in prune and self-update jobs if they are absent.
    ///
    /// Existing built-ins are left untouched, so restarts never duplicate
    /// or reset them. Returns the jobs that were installed.
    pub async fn reconcile_builtin_jobs(
        &self,
        config: &OrchestratorConfig,
    ) -> Result<Vec<Job>, JobError> {
        let builtins = [
            JobDefinition::new(
                PRUNE_JOB_ID,
                JobTarget::Prune,
                Trigger::interval(IntervalUnit::Minutes, config.prune_interval_minutes),
            )
            .with_description("Reclaim unused containers, images, volumes and networks"),
            JobDefinition::new(
                SELF_UPDATE_JOB_ID,
                JobTarget::SelfUpdate,
                Trigger::interval(IntervalUnit::Minutes, config.self_update_interval_minutes),
            )
            .with_description("Check for a new orchestrator image"),
        ];

        let mut installed = Vec::new();
        for definition in builtins {
            if self.get(&self.system_store, &definition.id).await.is_some() {
                debug!(job_id = %definition.id, "Built-in job already present");
                continue;
            }
            installed.push(self.upsert(&self.system_store, definition).await?);
        }

        if !installed.is_empty() {
            info!(count = installed.len(), "Installed built-in jobs");
        }
        Ok(installed)
    }

    /// Start the scheduler loop. Runs until `shutdown` changes or its sender
    /// is dropped, then waits for in-flight firings.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        info!(
            "Job scheduler started (check interval: {:?})",
            self.check_interval
        );

        let mut interval = time::interval(self.check_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.tick().await;
                }
                _ = shutdown.changed() => {
                    info!("Job scheduler shutting down");
                    break;
                }
            }
        }

        self.drain().await;
        info!("Job scheduler stopped");
    }

    pub async fn tick(self: &Arc<Self>) {
        self.tick_at(Utc::now()).await;
    }

    /// Fire every job due at `now`.
    pub async fn tick_at(self: &Arc<Self>, now: DateTime<Utc>) {
        let due = self.collect_due(now).await;
        if due.is_empty() {
            return;
        }

        let mut tasks = self.tasks.lock().await;
        while tasks.try_join_next().is_some() {}
        for job in due {
            self.dispatch(job, &mut tasks);
        }
    }

    /// Wait for every dispatched firing to finish.
    pub async fn drain(&self) {
        let mut tasks = std::mem::take(&mut *self.tasks.lock().await);
        while let Some(result) = tasks.join_next().await {
            if let Err(e) = result {
                error!("Job task failed to join: {}", e);
            }
        }
    }

    /// Advance or remove every due job and claim the ones not already firing.
    async fn collect_due(&self, now: DateTime<Utc>) -> Vec<Job> {
        let mut jobs = self.jobs.lock().await;
        let due: Vec<JobKey> = jobs
            .iter()
            .filter(|(_, job)| job.is_due(now))
            .map(|(key, _)| key.clone())
            .collect();

        let mut fired = Vec::new();
        let mut dirty = BTreeSet::new();
        for key in due {
            let Some(job) = jobs.get_mut(&key) else {
                continue;
            };
            let snapshot = job.clone();
            let next = job
                .next_run
                .and_then(|scheduled| job.definition.trigger.next_after(scheduled, now));
            match next {
                Some(next) => job.next_run = Some(next),
                None => {
                    jobs.remove(&key);
                }
            }
            dirty.insert(key.store.clone());

            if !self.claim(&key) {
                debug!(job = %key, "Job still firing, occurrence coalesced");
                continue;
            }
            fired.push(snapshot);
        }

        for store in dirty {
            if let Err(e) = self.persist(&jobs, &store).await {
                error!(store = %store, error = %e, "Failed to persist fired jobs");
            }
        }
        fired
    }

    fn dispatch(self: &Arc<Self>, job: Job, tasks: &mut JoinSet<()>) {
        let this = Arc::clone(self);
        tasks.spawn(async move {
            let key = job.key();
            let Ok(_permit) = this.workers.clone().acquire_owned().await else {
                this.release(&key);
                return;
            };

            debug!(job = %key, "Firing job");
            let started = Utc::now();
            let result = AssertUnwindSafe(this.runner.run(&job)).catch_unwind().await;
            let error = match result {
                Ok(Ok(_)) => None,
                Ok(Err(e)) => {
                    warn!(job = %key, error = %e, "Job failed");
                    Some(e.to_string())
                }
                Err(panic) => {
                    let message = panic_message(panic.as_ref());
                    error!(job = %key, panic = %message, "Job panicked");
                    Some(format!("job panicked: {}", message))
                }
            };

            this.record_run(&job, started, error).await;
            this.release(&key);
        });
    }

    /// Write the outcome back, unless the job was removed or replaced while
    /// it was firing.
    async fn record_run(&self, fired: &Job, started: DateTime<Utc>, error: Option<String>) {
        let key = fired.key();
        let mut jobs = self.jobs.lock().await;
        let Some(current) = jobs.get_mut(&key) else {
            return;
        };
        if current.created_at != fired.created_at {
            return;
        }
        current.record_run(started, error);

        if let Err(e) = self.persist(&jobs, &key.store).await {
            error!(job = %key, error = %e, "Failed to persist job run");
        }
    }

    fn claim(&self, key: &JobKey) -> bool {
        let mut in_flight = self
            .in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        in_flight.insert(key.clone())
    }

    fn release(&self, key: &JobKey) {
        let mut in_flight = self
            .in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        in_flight.remove(key);
    }

    async fn persist(&self, jobs: &BTreeMap<JobKey, Job>, store: &str) -> Result<(), JobError> {
        let snapshot: Vec<Job> = jobs
            .values()
            .filter(|job| job.store == store)
            .cloned()
            .collect();
        self.store.save_store(store, &snapshot).await
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
