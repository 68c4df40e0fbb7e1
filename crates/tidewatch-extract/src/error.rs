//! Extraction errors.

use thiserror::Error;
use tidewatch_runtime::RuntimeError;

/// Errors that abort an extraction batch or a cache access.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// The sandbox could not be started or torn down.
    #[error("Sandbox lifecycle error: {0}")]
    SandboxLifecycle(String),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    /// Cache read or write failed.
    #[error("Cache error: {0}")]
    Cache(String),
}

impl From<tokio_rusqlite::Error> for ExtractError {
    fn from(e: tokio_rusqlite::Error) -> Self {
        ExtractError::Cache(e.to_string())
    }
}
