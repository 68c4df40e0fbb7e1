//! Runtime errors.

use thiserror::Error;

/// Errors raised while talking to the container runtime.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// Registry or runtime unreachable; retry on the next cycle.
    #[error("Container runtime unavailable: {0}")]
    TransientInfra(String),

    /// Image or container does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Malformed reference or request.
    #[error("Invalid request: {0}")]
    Validation(String),

    /// A command inside a container exited unsuccessfully.
    #[error("Command failed in {container} (exit code {exit_code}): {stderr}")]
    Exec {
        container: String,
        exit_code: i64,
        stderr: String,
    },

    /// Operation did not complete in time.
    #[error("Timed out: {0}")]
    Timeout(String),
}

impl RuntimeError {
    /// Whether retrying later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, RuntimeError::TransientInfra(_) | RuntimeError::Timeout(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RuntimeError::NotFound("myorg/worker:latest".to_string());
        assert_eq!(err.to_string(), "Not found: myorg/worker:latest");

        let err = RuntimeError::Exec {
            container: "sandbox".to_string(),
            exit_code: 1,
            stderr: "boom".to_string(),
        };
        assert!(err.to_string().contains("exit code 1"));
    }

    #[test]
    fn test_is_transient() {
        assert!(RuntimeError::TransientInfra("down".into()).is_transient());
        assert!(RuntimeError::Timeout("pull".into()).is_transient());
        assert!(!RuntimeError::Validation("bad".into()).is_transient());
    }
}
