//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (capacity is a power of two, watermarks ordered)
//! - Check addresses parse before anything binds
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServerConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use crate::config::schema::ServerConfig;

/// A single semantic problem with a configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{field}: invalid socket address {value:?}")]
    InvalidAddress { field: &'static str, value: String },

    #[error("queue.capacity must be a power of two, got {0}")]
    CapacityNotPowerOfTwo(usize),

    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("pool.min_staged ({min}) exceeds pool.max_staged ({max})")]
    Watermarks { min: usize, max: usize },

    #[error("polling.base_ms ({base}) exceeds polling.max_ms ({max})")]
    Backoff { base: u64, max: u64 },

    #[error("access_control.canaries must not be empty")]
    NoCanaries,

    #[error("access_control.watch_file requires access_control.allow_file")]
    WatchWithoutFile,
}

/// Validate a parsed configuration.
pub fn validate_config(config: &ServerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field: "listener.bind_address",
            value: config.listener.bind_address.clone(),
        });
    }
    if config.listener.accept_timeout_ms == 0 {
        errors.push(ValidationError::Zero("listener.accept_timeout_ms"));
    }
    if config.listener.max_connections == 0 {
        errors.push(ValidationError::Zero("listener.max_connections"));
    }

    if !config.queue.capacity.is_power_of_two() {
        errors.push(ValidationError::CapacityNotPowerOfTwo(config.queue.capacity));
    }
    if config.queue.worker_threads == 0 {
        errors.push(ValidationError::Zero("queue.worker_threads"));
    }

    if config.pool.min_staged > config.pool.max_staged {
        errors.push(ValidationError::Watermarks {
            min: config.pool.min_staged,
            max: config.pool.max_staged,
        });
    }

    if config.routing.memo_capacity == 0 {
        errors.push(ValidationError::Zero("routing.memo_capacity"));
    }

    if config.polling.base_ms == 0 {
        errors.push(ValidationError::Zero("polling.base_ms"));
    }
    if config.polling.base_ms > config.polling.max_ms {
        errors.push(ValidationError::Backoff {
            base: config.polling.base_ms,
            max: config.polling.max_ms,
        });
    }

    let access = &config.access_control;
    if access.canaries.is_empty() {
        errors.push(ValidationError::NoCanaries);
    }
    if access.watch_file && access.allow_file.is_none() {
        errors.push(ValidationError::WatchWithoutFile);
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidAddress {
            field: "observability.metrics_address",
            value: config.observability.metrics_address.clone(),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert_eq!(validate_config(&ServerConfig::default()), Ok(()));
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = ServerConfig::default();
        config.queue.capacity = 3;
        config.queue.worker_threads = 0;
        config.pool.min_staged = 9;
        config.access_control.canaries.clear();

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 4);
        assert!(errors.contains(&ValidationError::CapacityNotPowerOfTwo(3)));
        assert!(errors.contains(&ValidationError::NoCanaries));
    }

    #[test]
    fn test_bad_bind_address() {
        let mut config = ServerConfig::default();
        config.listener.bind_address = "not-an-address".to_string();
        let errors = validate_config(&config).unwrap_err();
        assert!(matches!(
            errors[0],
            ValidationError::InvalidAddress { field: "listener.bind_address", .. }
        ));
    }
}
