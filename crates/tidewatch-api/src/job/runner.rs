//! Job bodies.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tidewatch_runtime::UpdateService;
use tracing::info;

use super::definition::Job;
use crate::error::JobError;

/// Executes a fired job.
#[async_trait]
pub trait JobRunner: Send + Sync {
    /// Run the job body once, returning a JSON summary of the outcome.
    async fn run(&self, job: &Job) -> Result<Value, JobError>;
}

/// Runs update targets through the [`UpdateService`].
pub struct UpdateJobRunner {
    service: Arc<UpdateService>,
}

impl UpdateJobRunner {
    pub fn new(service: Arc<UpdateService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl JobRunner for UpdateJobRunner {
    async fn run(&self, job: &Job) -> Result<Value, JobError> {
        let outcome = self.service.run(&job.definition.target).await?;
        info!(
            job = %job.key(),
            target = %job.definition.target,
            outcome = ?outcome,
            "Update job finished"
        );
        serde_json::to_value(&outcome).map_err(|e| JobError::Execution(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::definition::{JobDefinition, JobTarget};
    use crate::job::trigger::{IntervalUnit, Trigger};
    use chrono::Utc;
    use tidewatch_config::OrchestratorConfig;
    use tidewatch_runtime::testing::FakeRuntime;

    fn job(target: JobTarget) -> Job {
        let def = JobDefinition::new("j", target, Trigger::interval(IntervalUnit::Minutes, 1));
        Job::new("default", def, Utc::now())
    }

    #[tokio::test]
    async fn test_prune_job_reports_outcome() {
        let fake = Arc::new(FakeRuntime::new());
        let service = Arc::new(UpdateService::new(fake, &OrchestratorConfig::default()));
        let runner = UpdateJobRunner::new(service);

        let value = runner.run(&job(JobTarget::Prune)).await.unwrap();
        assert_eq!(value["outcome"], "pruned");
    }

    #[tokio::test]
    async fn test_runtime_failure_is_execution_error() {
        let fake = Arc::new(FakeRuntime::new());
        fake.fail_list(true);
        let service = Arc::new(UpdateService::new(fake, &OrchestratorConfig::default()));
        let runner = UpdateJobRunner::new(service);

        let err = runner.run(&job(JobTarget::AllContainers)).await.unwrap_err();
        assert!(matches!(err, JobError::Execution(_)));
    }
}
