//! Job scheduling module.
//!
//! Durable, named job stores fired by a single timer on a bounded worker
//! pool. Jobs run update targets through a [`JobRunner`].

mod definition;
pub mod routes;
mod runner;
mod scheduler;
mod store;
mod trigger;

pub use definition::{Job, JobDefinition, JobKey, JobTarget, UpsertJobRequest};
pub use runner::{JobRunner, UpdateJobRunner};
pub use scheduler::{JobScheduler, PRUNE_JOB_ID, SELF_UPDATE_JOB_ID};
pub use store::{FileJobStore, JobStore, MemoryJobStore};
pub use trigger::{IntervalUnit, Trigger, normalize_cron};
