//! # Tidewatch API
//!
//! Scheduled update jobs and the HTTP surface of the orchestrator.
//!
//! - **Job**: durable named job stores, triggers and the single-timer
//!   scheduler that fires them through the update service
//! - **Mods**: cached mod metadata lookups and sandboxed refreshes
//! - **HTTP**: axum router over a process-scoped [`AppContext`]

pub mod error;
pub mod http;
pub mod job;
pub mod mods;
pub mod server;
pub mod state;

pub use error::{InterfaceError, JobError};
pub use http::routes::create_router;
pub use server::ApiServer;
pub use state::AppContext;

// Job module exports
pub use job::{
    FileJobStore, IntervalUnit, Job, JobDefinition, JobKey, JobRunner, JobScheduler, JobStore,
    JobTarget, MemoryJobStore, Trigger, UpdateJobRunner,
};
