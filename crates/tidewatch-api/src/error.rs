//! Job and interface error types.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tidewatch_extract::ExtractError;
use tidewatch_runtime::RuntimeError;

/// Job scheduling errors.
#[derive(Debug, Error)]
pub enum JobError {
    /// Rejected before persistence.
    #[error("Invalid job: {0}")]
    Validation(String),

    /// Job store I/O or (de)serialisation failed.
    #[error("Job store error: {0}")]
    Store(String),

    /// No job under this key.
    #[error("no such job")]
    NotFound,

    /// The job body failed.
    #[error("Job execution failed: {0}")]
    Execution(String),
}

impl From<RuntimeError> for JobError {
    fn from(e: RuntimeError) -> Self {
        match e {
            RuntimeError::Validation(msg) => JobError::Validation(msg),
            other => JobError::Execution(other.to_string()),
        }
    }
}

/// Errors surfaced by HTTP handlers.
#[derive(Debug, Error)]
pub enum InterfaceError {
    #[error(transparent)]
    Job(#[from] JobError),

    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    /// Generic error.
    #[error("{0}")]
    Custom(String),
}

impl InterfaceError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            InterfaceError::Job(JobError::Validation(_)) => StatusCode::UNPROCESSABLE_ENTITY,
            InterfaceError::Job(JobError::NotFound) => StatusCode::NOT_FOUND,
            InterfaceError::Extract(ExtractError::SandboxLifecycle(_)) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            InterfaceError::Extract(ExtractError::Runtime(e)) | InterfaceError::Runtime(e)
                if e.is_transient() =>
            {
                StatusCode::SERVICE_UNAVAILABLE
            }
            InterfaceError::Runtime(RuntimeError::Validation(_)) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for InterfaceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        (status, Json(serde_json::json!({"error": self.to_string()}))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let validation = InterfaceError::from(JobError::Validation("bad cron".into()));
        assert_eq!(validation.status_code(), StatusCode::UNPROCESSABLE_ENTITY);

        let missing = InterfaceError::from(JobError::NotFound);
        assert_eq!(missing.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(missing.to_string(), "no such job");

        let timeout =
            InterfaceError::from(ExtractError::Runtime(RuntimeError::Timeout("exec".into())));
        assert_eq!(timeout.status_code(), StatusCode::SERVICE_UNAVAILABLE);

        let sandbox = InterfaceError::from(ExtractError::SandboxLifecycle("no daemon".into()));
        assert_eq!(sandbox.status_code(), StatusCode::SERVICE_UNAVAILABLE);

        let transient =
            InterfaceError::from(ExtractError::Runtime(RuntimeError::TransientInfra("x".into())));
        assert_eq!(transient.status_code(), StatusCode::SERVICE_UNAVAILABLE);

        let cache = InterfaceError::from(ExtractError::Cache("disk full".into()));
        assert_eq!(cache.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_runtime_validation_maps_to_job_validation() {
        let err = JobError::from(RuntimeError::Validation("empty reference".into()));
        assert!(matches!(err, JobError::Validation(_)));

        let err = JobError::from(RuntimeError::TransientInfra("registry down".into()));
        assert!(matches!(err, JobError::Execution(_)));
    }
}
