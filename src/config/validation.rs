//! Configuration validation.
//!
//! Semantic checks only; serde already handled the syntax. Every problem is
//! collected so one failed start reports all of them.

use thiserror::Error;

use crate::config::schema::FrontendConfig;
use crate::observability::normalize::classify;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Validate a fully layered configuration.
pub fn validate_config(config: &FrontendConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let base = &config.routing.base_path;
    if !base.is_empty() && (!base.starts_with('/') || base.ends_with('/')) {
        errors.push(ValidationError::new(
            "routing.base_path",
            format!("'{}' must start with '/' and must not end with '/'", base),
        ));
    }

    let metrics_path = &config.observability.metrics_path;
    if !metrics_path.starts_with('/') || metrics_path.len() < 2 {
        errors.push(ValidationError::new(
            "observability.metrics_path",
            format!("'{}' must be an absolute path below '/'", metrics_path),
        ));
    } else if shadows_storefront_route(base, metrics_path) {
        errors.push(ValidationError::new(
            "observability.metrics_path",
            format!("'{}' collides with a storefront route", metrics_path),
        ));
    }

    let prefix = &config.session.cookie_prefix;
    if prefix.is_empty()
        || !prefix
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        errors.push(ValidationError::new(
            "session.cookie_prefix",
            "must be non-empty and contain only ASCII letters, digits, '_' or '-'",
        ));
    }

    if config.session.max_age_secs == 0 {
        errors.push(ValidationError::new("session.max_age_secs", "must be > 0"));
    }

    if config.timeouts.connect_secs == 0 {
        errors.push(ValidationError::new("timeouts.connect_secs", "must be > 0"));
    }

    if config.tracing.service_name.trim().is_empty() {
        errors.push(ValidationError::new("tracing.service_name", "must not be empty"));
    }

    if config.profiler.enabled {
        if config.profiler.max_attempts == 0 {
            errors.push(ValidationError::new("profiler.max_attempts", "must be > 0"));
        }
        if config.profiler.agent_address.trim().is_empty() {
            errors.push(ValidationError::new(
                "profiler.agent_address",
                "must not be empty when profiling is enabled",
            ));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Whether `path` would land on a route the dispatcher already serves.
fn shadows_storefront_route(base_path: &str, path: &str) -> bool {
    let under_base = base_path.is_empty()
        || path == base_path
        || path
            .strip_prefix(base_path)
            .is_some_and(|rest| rest.starts_with('/'));
    under_base && classify(base_path, path).is_some()
}
