//! # Tidewatch Runtime
//!
//! Everything that touches the container runtime: the [`ContainerRuntime`]
//! seam and its Docker implementation, image change detection, the
//! self-protection filter, restart delegation and the update service that
//! composes them for a single job target.

pub mod docker;
pub mod error;
pub mod executor;
pub mod guard;
pub mod probe;
pub mod reference;
pub mod runtime;
pub mod update;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use docker::DockerRuntime;
pub use error::RuntimeError;
pub use executor::{CleanupPolicy, RestartOutcome, RestartScope, UpdateExecutor};
pub use guard::{SelfIdentity, SelfProtectionFilter};
pub use probe::{ImageProbe, PullOutcome};
pub use runtime::{ContainerRuntime, ContainerSummary, ExecOutput, Mount, PruneReport, RunSpec};
pub use update::{UpdateOutcome, UpdateService, UpdateTarget};
