//! Configuration validation.

use crate::error::ConfigError;
use crate::schema::Config;

/// Validation result.
#[derive(Debug, Default)]
pub struct ValidationResult {
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, warning: ValidationWarning) {
        self.warnings.push(warning);
    }

    /// Convert the first error into a `ConfigError`, if any.
    pub fn into_result(self) -> Result<Vec<ValidationWarning>, ConfigError> {
        match self.errors.into_iter().next() {
            Some(error) => Err(ConfigError::InvalidValue {
                field: error.path,
                message: error.message,
            }),
            None => Ok(self.warnings),
        }
    }
}

/// A validation error.
#[derive(Debug)]
pub struct ValidationError {
    pub path: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// A validation warning.
#[derive(Debug)]
pub struct ValidationWarning {
    pub path: String,
    pub message: String,
}

impl ValidationWarning {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Configuration validator.
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration.
    pub fn validate(config: &Config) -> ValidationResult {
        let mut result = ValidationResult::default();

        Self::validate_server(config, &mut result);
        Self::validate_scheduler(config, &mut result);
        Self::validate_orchestrator(config, &mut result);
        Self::validate_extraction(config, &mut result);

        result
    }

    fn validate_server(config: &Config, result: &mut ValidationResult) {
        if config.server.port == 0 {
            result.add_error(ValidationError::new("server.port", "Port cannot be 0"));
        }

        if config.server.host.is_empty() {
            result.add_error(ValidationError::new("server.host", "Host cannot be empty"));
        }
    }

    fn validate_scheduler(config: &Config, result: &mut ValidationResult) {
        let scheduler = &config.scheduler;

        if scheduler.check_interval_secs == 0 {
            result.add_error(ValidationError::new(
                "scheduler.check_interval_secs",
                "check_interval_secs must be greater than 0",
            ));
        }

        if scheduler.max_workers == 0 {
            result.add_error(ValidationError::new(
                "scheduler.max_workers",
                "max_workers must be greater than 0",
            ));
        }

        if scheduler.default_store.is_empty() || scheduler.system_store.is_empty() {
            result.add_error(ValidationError::new(
                "scheduler",
                "store names cannot be empty",
            ));
        }

        if scheduler.default_store == scheduler.system_store {
            result.add_warning(ValidationWarning::new(
                "scheduler.system_store",
                "built-in jobs share a store with user jobs",
            ));
        }
    }

    fn validate_orchestrator(config: &Config, result: &mut ValidationResult) {
        let orch = &config.orchestrator;

        if orch.managed_prefix.is_empty() {
            result.add_error(ValidationError::new(
                "orchestrator.managed_prefix",
                "managed_prefix cannot be empty, it would allow updating every image",
            ));
        } else if !orch.managed_prefix.ends_with('/') {
            result.add_warning(ValidationWarning::new(
                "orchestrator.managed_prefix",
                "managed_prefix does not end with '/', it may match unrelated namespaces",
            ));
        }

        if orch.self_image.is_empty() {
            result.add_error(ValidationError::new(
                "orchestrator.self_image",
                "self_image cannot be empty",
            ));
        } else if !orch.self_image.starts_with(&orch.managed_prefix) {
            result.add_warning(ValidationWarning::new(
                "orchestrator.self_image",
                "self_image is outside managed_prefix, self-update will still run",
            ));
        }

        if orch.self_container.is_empty() {
            result.add_error(ValidationError::new(
                "orchestrator.self_container",
                "self_container cannot be empty",
            ));
        }

        if orch.delegate_image.is_empty() {
            result.add_error(ValidationError::new(
                "orchestrator.delegate_image",
                "delegate_image cannot be empty",
            ));
        }

        if orch.stop_timeout_secs == 0 {
            result.add_warning(ValidationWarning::new(
                "orchestrator.stop_timeout_secs",
                "containers will be killed without a grace period",
            ));
        }

        if orch.self_update_interval_minutes == 0 {
            result.add_error(ValidationError::new(
                "orchestrator.self_update_interval_minutes",
                "self_update_interval_minutes must be greater than 0",
            ));
        }

        if orch.prune_interval_minutes == 0 {
            result.add_error(ValidationError::new(
                "orchestrator.prune_interval_minutes",
                "prune_interval_minutes must be greater than 0",
            ));
        }
    }

    fn validate_extraction(config: &Config, result: &mut ValidationResult) {
        let extraction = &config.extraction;

        if extraction.sandbox_image.is_empty() {
            result.add_error(ValidationError::new(
                "extraction.sandbox_image",
                "sandbox_image cannot be empty",
            ));
        }

        if extraction.descriptor_layouts.is_empty() {
            result.add_error(ValidationError::new(
                "extraction.descriptor_layouts",
                "at least one descriptor layout is required",
            ));
        }

        for (i, layout) in extraction.descriptor_layouts.iter().enumerate() {
            if !layout.contains("{id}") {
                result.add_error(ValidationError::new(
                    format!("extraction.descriptor_layouts[{}]", i),
                    format!("layout '{}' has no {{id}} placeholder", layout),
                ));
            }
        }

        if extraction.timeout_secs == 0 {
            result.add_error(ValidationError::new(
                "extraction.timeout_secs",
                "timeout_secs must be greater than 0",
            ));
        }

        if extraction.interpreter.is_empty() {
            result.add_error(ValidationError::new(
                "extraction.interpreter",
                "interpreter cannot be empty",
            ));
        }

        for (i, volume) in extraction.volumes.iter().enumerate() {
            if !volume.target.starts_with('/') {
                result.add_error(ValidationError::new(
                    format!("extraction.volumes[{}].target", i),
                    "mount target must be an absolute path",
                ));
            }
        }
    }
}

#[cfg(test)]
#[path = "validator_tests.rs"]
mod tests;
