//! Job definition and runtime record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tidewatch_runtime::UpdateTarget;

use super::trigger::Trigger;
use crate::error::JobError;

/// What a job acts on.
pub type JobTarget = UpdateTarget;

/// Identity of a job: unique within its store only.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct JobKey {
    pub store: String,
    pub id: String,
}

impl JobKey {
    pub fn new(store: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            store: store.into(),
            id: id.into(),
        }
    }
}

impl std::fmt::Display for JobKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.store, self.id)
    }
}

/// Job definition as submitted by a caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobDefinition {
    /// Job ID, unique within its store.
    pub id: String,
    pub target: JobTarget,
    pub trigger: Trigger,
    /// Optional description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl JobDefinition {
    pub fn new(id: impl Into<String>, target: JobTarget, trigger: Trigger) -> Self {
        Self {
            id: id.into(),
            target,
            trigger,
            description: None,
        }
    }

    /// Add a description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn validate(&self, now: DateTime<Utc>) -> Result<(), JobError> {
        validate_name("job id", &self.id)?;
        self.target.validate()?;
        self.trigger.validate(now)
    }
}

/// Runtime job instance, as persisted in its store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub store: String,
    pub definition: JobDefinition,
    /// Next scheduled fire time; `None` once a job can never fire again.
    pub next_run: Option<DateTime<Utc>>,
    pub last_run: Option<DateTime<Utc>>,
    /// Number of completed firings.
    #[serde(default)]
    pub run_count: u64,
    /// Error from the most recent firing, cleared on success.
    #[serde(default)]
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Job {
    /// Create a job from a definition, scheduling its first run.
    pub fn new(store: impl Into<String>, definition: JobDefinition, now: DateTime<Utc>) -> Self {
        Self {
            store: store.into(),
            next_run: definition.trigger.first_run(now),
            definition,
            last_run: None,
            run_count: 0,
            last_error: None,
            created_at: now,
        }
    }

    pub fn key(&self) -> JobKey {
        JobKey::new(&self.store, &self.definition.id)
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.next_run.is_some_and(|next| next <= now)
    }

    /// Record a finished firing.
    pub fn record_run(&mut self, started: DateTime<Utc>, error: Option<String>) {
        self.last_run = Some(started);
        self.run_count += 1;
        self.last_error = error;
    }
}

/// Body of `POST /scheduler/jobs`.
#[derive(Debug, Clone, Deserialize)]
pub struct UpsertJobRequest {
    /// Target store; the default store when omitted.
    #[serde(default)]
    pub store: Option<String>,
    #[serde(flatten)]
    pub definition: JobDefinition,
}

/// Store names and job ids end up in file names and URL paths.
pub fn validate_name(what: &str, name: &str) -> Result<(), JobError> {
    if name.is_empty() || name.len() > 128 {
        return Err(JobError::Validation(format!(
            "{} must be 1 to 128 characters",
            what
        )));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
        || name.starts_with('.')
    {
        return Err(JobError::Validation(format!(
            "{} '{}' may only contain letters, digits, '-', '_' and '.'",
            what, name
        )));
    }
    Ok(())
}
