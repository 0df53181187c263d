//! Configuration validation.

use crate::error::ConfigError;
use crate::schema::{Config, StoreBackend};

#[cfg(test)]
#[path = "validator_tests.rs"]
mod tests;

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

    /// Turn the first error into a `ConfigError`.
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

        Self::validate_queue(config, &mut result);
        Self::validate_store(config, &mut result);
        Self::validate_worker(config, &mut result);

        result
    }

    fn validate_queue(config: &Config, result: &mut ValidationResult) {
        let queue = &config.queue;

        if queue.channel.trim().is_empty() {
            result.add_error(ValidationError::new(
                "queue.channel",
                "Channel cannot be empty",
            ));
        }

        if queue.ttr_secs == 0 {
            result.add_error(ValidationError::new(
                "queue.ttr_secs",
                "ttr_secs must be greater than 0",
            ));
        }

        if i64::try_from(queue.ttr_secs).is_err() {
            result.add_error(ValidationError::new(
                "queue.ttr_secs",
                format!("ttr_secs must not exceed {}", i64::MAX),
            ));
        }

        if queue.max_attempts == 0 {
            result.add_error(ValidationError::new(
                "queue.max_attempts",
                "max_attempts must be at least 1",
            ));
        }

        if queue.mutex_timeout_secs == 0 {
            result.add_warning(ValidationWarning::new(
                "queue.mutex_timeout_secs",
                "A zero lock timeout fails every reserve that meets a held lock",
            ));
        }
    }

    fn validate_store(config: &Config, result: &mut ValidationResult) {
        let store = &config.store;

        if store.backend == StoreBackend::Sqlite && store.path.trim().is_empty() {
            result.add_error(ValidationError::new(
                "store.path",
                "path is required for the sqlite backend",
            ));
        }

        if store.backend == StoreBackend::Memory {
            result.add_warning(ValidationWarning::new(
                "store.backend",
                "memory backend loses all messages when the process exits",
            ));
        }

        if i64::try_from(store.mutex_lease_secs).is_err() {
            result.add_error(ValidationError::new(
                "store.mutex_lease_secs",
                format!("mutex_lease_secs must not exceed {}", i64::MAX),
            ));
        }

        if store.mutex_lease_secs <= config.queue.mutex_timeout_secs {
            result.add_warning(ValidationWarning::new(
                "store.mutex_lease_secs",
                "lock lease is not longer than the lock timeout; a slow reserve may lose its lock",
            ));
        }
    }

    fn validate_worker(config: &Config, result: &mut ValidationResult) {
        if config.worker.listen_delay_secs > 3600 {
            result.add_warning(ValidationWarning::new(
                "worker.listen_delay_secs",
                "listen delay is over an hour, delayed jobs will start late",
            ));
        }
    }
}
