use super::*;
use crate::job::store::{FileJobStore, MemoryJobStore};
use async_trait::async_trait;
use chrono::TimeDelta;
use serde_json::Value;
use tempfile::TempDir;

#[derive(Clone, Copy)]
enum Behaviour {
    Succeed,
    Fail,
    Panic,
}

struct TestRunner {
    behaviour: std::sync::Mutex<Behaviour>,
    calls: std::sync::Mutex<Vec<JobKey>>,
    gate: Option<Arc<Semaphore>>,
}

impl TestRunner {
    fn new(behaviour: Behaviour) -> Arc<Self> {
        Arc::new(Self {
            behaviour: std::sync::Mutex::new(behaviour),
            calls: std::sync::Mutex::new(Vec::new()),
            gate: None,
        })
    }

    fn gated(gate: Arc<Semaphore>) -> Arc<Self> {
        Arc::new(Self {
            behaviour: std::sync::Mutex::new(Behaviour::Succeed),
            calls: std::sync::Mutex::new(Vec::new()),
            gate: Some(gate),
        })
    }

    fn set(&self, behaviour: Behaviour) {
        *self.behaviour.lock().unwrap() = behaviour;
    }

    fn calls(&self) -> Vec<JobKey> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl JobRunner for TestRunner {
    async fn run(&self, job: &Job) -> Result<Value, JobError> {
        self.calls.lock().unwrap().push(job.key());
        if let Some(gate) = &self.gate {
            let _permit = gate.acquire().await;
        }
        let behaviour = *self.behaviour.lock().unwrap();
        match behaviour {
            Behaviour::Succeed => Ok(Value::Null),
            Behaviour::Fail => Err(JobError::Execution("registry unreachable".into())),
            Behaviour::Panic => panic!("boom"),
        }
    }
}

fn scheduler(store: Arc<dyn JobStore>, runner: Arc<dyn JobRunner>) -> Arc<JobScheduler> {
    Arc::new(JobScheduler::new(store, runner, &SchedulerConfig::default()))
}

fn every_minute(id: &str) -> JobDefinition {
    JobDefinition::new(
        id,
        JobTarget::AllContainers,
        Trigger::interval(IntervalUnit::Minutes, 1),
    )
}

fn later(minutes: i64) -> DateTime<Utc> {
    Utc::now() + TimeDelta::minutes(minutes)
}

#[tokio::test]
async fn test_upsert_replaces_existing_key() {
    let scheduler = scheduler(Arc::new(MemoryJobStore::new()), TestRunner::new(Behaviour::Succeed));

    scheduler.upsert("default", every_minute("worker")).await.unwrap();
    let replacement = JobDefinition::new(
        "worker",
        JobTarget::SingleContainer {
            reference: "worker".into(),
        },
        Trigger::cron("0 4 * * *"),
    );
    scheduler.upsert("default", replacement.clone()).await.unwrap();

    let jobs = scheduler.list(Some("default")).await;
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].definition, replacement);
}

#[tokio::test]
async fn test_same_id_in_two_stores() {
    let scheduler = scheduler(Arc::new(MemoryJobStore::new()), TestRunner::new(Behaviour::Succeed));
    scheduler.upsert("default", every_minute("sweep")).await.unwrap();
    scheduler.upsert("fleet", every_minute("sweep")).await.unwrap();

    assert_eq!(scheduler.list(None).await.len(), 2);
    assert_eq!(scheduler.list(Some("fleet")).await.len(), 1);
}

#[tokio::test]
async fn test_invalid_definitions_rejected_before_persistence() {
    let store = Arc::new(MemoryJobStore::new());
    let scheduler = scheduler(store.clone(), TestRunner::new(Behaviour::Succeed));

    let bad_cron = JobDefinition::new("x", JobTarget::Prune, Trigger::cron("every day"));
    assert!(matches!(
        scheduler.upsert("default", bad_cron).await,
        Err(JobError::Validation(_))
    ));

    let past = JobDefinition::new("y", JobTarget::Prune, Trigger::date(later(-1)));
    assert!(matches!(
        scheduler.upsert("default", past).await,
        Err(JobError::Validation(_))
    ));

    assert!(matches!(
        scheduler.upsert("bad/store", every_minute("z")).await,
        Err(JobError::Validation(_))
    ));

    assert!(store.store_names().await.unwrap().is_empty());
    assert!(scheduler.list(None).await.is_empty());
}

#[tokio::test]
async fn test_remove_absent_returns_false() {
    let scheduler = scheduler(Arc::new(MemoryJobStore::new()), TestRunner::new(Behaviour::Succeed));
    assert!(!scheduler.remove("default", "ghost").await);

    scheduler.upsert("default", every_minute("real")).await.unwrap();
    assert!(scheduler.remove("default", "real").await);
    assert!(!scheduler.remove("default", "real").await);
    assert!(scheduler.get("default", "real").await.is_none());
}

#[tokio::test]
async fn test_restart_reloads_every_store() {
    let temp_dir = TempDir::new().unwrap();
    let runner = TestRunner::new(Behaviour::Succeed);

    let before = {
        let store = Arc::new(FileJobStore::new(temp_dir.path()).await.unwrap());
        let scheduler = scheduler(store, runner.clone());
        scheduler.upsert("default", every_minute("a")).await.unwrap();
        scheduler
            .upsert(
                "fleet",
                JobDefinition::new(
                    "b",
                    JobTarget::SingleImage {
                        reference: "myorg/worker:latest".into(),
                    },
                    Trigger::cron("*/5 * * * *"),
                ),
            )
            .await
            .unwrap();
        scheduler
            .upsert(
                "fleet",
                JobDefinition::new("c", JobTarget::Prune, Trigger::date(later(60))),
            )
            .await
            .unwrap();
        scheduler.list(None).await
    };

    let store = Arc::new(FileJobStore::new(temp_dir.path()).await.unwrap());
    let restarted = scheduler(store, runner);
    assert_eq!(restarted.load().await.unwrap(), 3);

    let tuples = |jobs: Vec<Job>| -> Vec<(String, String, Trigger, JobTarget)> {
        jobs.into_iter()
            .map(|j| {
                (
                    j.store,
                    j.definition.id,
                    j.definition.trigger,
                    j.definition.target,
                )
            })
            .collect()
    };
    assert_eq!(tuples(restarted.list(None).await), tuples(before));
}

#[tokio::test]
async fn test_due_job_fires_and_advances() {
    let runner = TestRunner::new(Behaviour::Succeed);
    let scheduler = scheduler(Arc::new(MemoryJobStore::new()), runner.clone());
    let job = scheduler.upsert("default", every_minute("sweep")).await.unwrap();
    let first = job.next_run.unwrap();

    // Nothing is due yet.
    scheduler.tick_at(Utc::now()).await;
    scheduler.drain().await;
    assert!(runner.calls().is_empty());

    // Ten minutes of missed occurrences collapse into one firing.
    let now = first + TimeDelta::minutes(9) + TimeDelta::seconds(30);
    scheduler.tick_at(now).await;
    scheduler.drain().await;

    assert_eq!(runner.calls(), vec![JobKey::new("default", "sweep")]);
    let job = scheduler.get("default", "sweep").await.unwrap();
    assert_eq!(job.run_count, 1);
    assert!(job.last_error.is_none());
    assert_eq!(job.next_run, Some(first + TimeDelta::minutes(10)));
    assert!(job.next_run.unwrap() > now);
}

#[tokio::test]
async fn test_firing_job_is_not_reentered() {
    let gate = Arc::new(Semaphore::new(0));
    let runner = TestRunner::gated(gate.clone());
    let scheduler = scheduler(Arc::new(MemoryJobStore::new()), runner.clone());
    scheduler.upsert("default", every_minute("slow")).await.unwrap();

    scheduler.tick_at(later(2)).await;
    // Due again while the first firing is blocked.
    scheduler.tick_at(later(30)).await;

    gate.add_permits(10);
    scheduler.drain().await;

    assert_eq!(runner.calls().len(), 1);
    assert_eq!(scheduler.get("default", "slow").await.unwrap().run_count, 1);

    // Once released, the next occurrence fires normally.
    scheduler.tick_at(later(60)).await;
    scheduler.drain().await;
    assert_eq!(runner.calls().len(), 2);
}

#[tokio::test]
async fn test_failure_and_panic_recorded_job_stays_pending() {
    let runner = TestRunner::new(Behaviour::Fail);
    let scheduler = scheduler(Arc::new(MemoryJobStore::new()), runner.clone());
    scheduler.upsert("default", every_minute("flaky")).await.unwrap();

    scheduler.tick_at(later(2)).await;
    scheduler.drain().await;
    let job = scheduler.get("default", "flaky").await.unwrap();
    assert!(job.last_error.unwrap().contains("registry unreachable"));
    assert!(job.next_run.is_some());

    runner.set(Behaviour::Panic);
    scheduler.tick_at(later(10)).await;
    scheduler.drain().await;
    let job = scheduler.get("default", "flaky").await.unwrap();
    assert!(job.last_error.unwrap().contains("boom"));
    assert_eq!(job.run_count, 2);

    runner.set(Behaviour::Succeed);
    scheduler.tick_at(later(20)).await;
    scheduler.drain().await;
    let job = scheduler.get("default", "flaky").await.unwrap();
    assert!(job.last_error.is_none());
    assert_eq!(job.run_count, 3);
}

#[tokio::test]
async fn test_date_job_fires_once_then_removed() {
    let temp_dir = TempDir::new().unwrap();
    let store = Arc::new(FileJobStore::new(temp_dir.path()).await.unwrap());
    let runner = TestRunner::new(Behaviour::Succeed);
    let scheduler = scheduler(store.clone(), runner.clone());
    scheduler
        .upsert(
            "default",
            JobDefinition::new("once", JobTarget::Prune, Trigger::date(later(5))),
        )
        .await
        .unwrap();

    scheduler.tick_at(later(6)).await;
    scheduler.drain().await;
    scheduler.tick_at(later(7)).await;
    scheduler.drain().await;

    assert_eq!(runner.calls().len(), 1);
    assert!(scheduler.get("default", "once").await.is_none());
    assert!(store.load_store("default").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_removed_while_firing_stays_removed() {
    let gate = Arc::new(Semaphore::new(0));
    let runner = TestRunner::gated(gate.clone());
    let scheduler = scheduler(Arc::new(MemoryJobStore::new()), runner.clone());
    scheduler.upsert("default", every_minute("gone")).await.unwrap();

    scheduler.tick_at(later(2)).await;
    assert!(scheduler.remove("default", "gone").await);
    gate.add_permits(1);
    scheduler.drain().await;

    assert_eq!(runner.calls().len(), 1);
    assert!(scheduler.get("default", "gone").await.is_none());
}

#[tokio::test]
async fn test_reconcile_builtin_jobs_is_idempotent() {
    let temp_dir = TempDir::new().unwrap();
    let config = OrchestratorConfig::default();

    {
        let store = Arc::new(FileJobStore::new(temp_dir.path()).await.unwrap());
        let scheduler = scheduler(store, TestRunner::new(Behaviour::Succeed));
        scheduler.load().await.unwrap();
        let installed = scheduler.reconcile_builtin_jobs(&config).await.unwrap();
        assert_eq!(installed.len(), 2);

        // Operator retunes the prune job; reconciliation must not reset it.
        scheduler
            .upsert(
                "system",
                JobDefinition::new(
                    PRUNE_JOB_ID,
                    JobTarget::Prune,
                    Trigger::interval(IntervalUnit::Hours, 6),
                ),
            )
            .await
            .unwrap();
    }

    let store = Arc::new(FileJobStore::new(temp_dir.path()).await.unwrap());
    let scheduler = scheduler(store, TestRunner::new(Behaviour::Succeed));
    scheduler.load().await.unwrap();
    let installed = scheduler.reconcile_builtin_jobs(&config).await.unwrap();
    assert!(installed.is_empty());

    let system = scheduler.list(Some("system")).await;
    assert_eq!(system.len(), 2);
    let prune = scheduler.get("system", PRUNE_JOB_ID).await.unwrap();
    assert_eq!(
        prune.definition.trigger,
        Trigger::interval(IntervalUnit::Hours, 6)
    );
    let self_update = scheduler.get("system", SELF_UPDATE_JOB_ID).await.unwrap();
    assert_eq!(self_update.definition.target, JobTarget::SelfUpdate);
    assert_eq!(
        self_update.definition.trigger,
        Trigger::interval(IntervalUnit::Minutes, config.self_update_interval_minutes)
    );
}

#[tokio::test]
async fn test_run_loop_stops_on_shutdown() {
    let runner = TestRunner::new(Behaviour::Succeed);
    let scheduler = Arc::new(
        JobScheduler::new(
            Arc::new(MemoryJobStore::new()),
            runner,
            &SchedulerConfig::default(),
        )
        .with_check_interval(Duration::from_millis(10)),
    );
    let (tx, rx) = watch::channel(false);
    let handle = tokio::spawn(scheduler.clone().run(rx));

    tokio::time::sleep(Duration::from_millis(30)).await;
    tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap();
}
