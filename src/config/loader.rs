//! Configuration loading.
//!
//! Layers, lowest precedence first: schema defaults, an optional TOML file,
//! then the environment.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::env::EnvSource;
use crate::config::schema::{FrontendConfig, LogFormat};
use crate::config::validation::{validate_config, ValidationError};

pub const PORT: &str = "PORT";
pub const LISTEN_ADDR: &str = "LISTEN_ADDR";
pub const BASE_URL: &str = "BASE_URL";
pub const ENABLE_TRACING: &str = "ENABLE_TRACING";
pub const ENABLE_PROFILER: &str = "ENABLE_PROFILER";
pub const PROFILER_AGENT_ADDR: &str = "PROFILER_AGENT_ADDR";
pub const LOG_LEVEL: &str = "LOG_LEVEL";
pub const LOG_FORMAT: &str = "LOG_FORMAT";

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[source] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[source] toml::de::Error),

    #[error("Invalid value '{value}' for environment variable {var}")]
    InvalidEnv { var: &'static str, value: String },

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load, layer and validate configuration.
pub fn load_config(path: Option<&Path>, env: &dyn EnvSource) -> Result<FrontendConfig, ConfigError> {
    let mut config = match path {
        Some(path) => {
            let content = fs::read_to_string(path).map_err(ConfigError::Io)?;
            toml::from_str(&content).map_err(ConfigError::Parse)?
        }
        None => FrontendConfig::default(),
    };

    apply_env(&mut config, env)?;
    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

fn apply_env(config: &mut FrontendConfig, env: &dyn EnvSource) -> Result<(), ConfigError> {
    if let Some(port) = env.non_empty(PORT) {
        config.listener.port = port
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidEnv { var: PORT, value: port })?;
    }
    if let Some(addr) = env.var(LISTEN_ADDR) {
        config.listener.listen_addr = addr;
    }
    if let Some(base) = env.var(BASE_URL) {
        config.routing.base_path = base;
    }
    if let Some(enabled) = env.flag(ENABLE_TRACING) {
        config.tracing.enabled = enabled;
    }
    if let Some(enabled) = env.flag(ENABLE_PROFILER) {
        config.profiler.enabled = enabled;
    }
    if let Some(agent) = env.non_empty(PROFILER_AGENT_ADDR) {
        config.profiler.agent_address = agent;
    }
    if let Some(level) = env.non_empty(LOG_LEVEL) {
        config.observability.log_level = level;
    }
    if let Some(format) = env.non_empty(LOG_FORMAT) {
        config.observability.log_format = format
            .parse::<LogFormat>()
            .map_err(|_| ConfigError::InvalidEnv { var: LOG_FORMAT, value: format })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_environment_overrides_defaults() {
        let env = env(&[
            (PORT, "9090"),
            (BASE_URL, "/shop"),
            (ENABLE_TRACING, "1"),
            (ENABLE_PROFILER, "0"),
            (LOG_FORMAT, "text"),
        ]);

        let config = load_config(None, &env).unwrap();
        assert_eq!(config.listener.port, 9090);
        assert_eq!(config.routing.base_path, "/shop");
        assert!(config.tracing.enabled);
        assert!(!config.profiler.enabled);
        assert_eq!(config.observability.log_format, LogFormat::Text);
    }

    #[test]
    fn test_rejects_non_numeric_port() {
        let env = env(&[(PORT, "http")]);
        match load_config(None, &env) {
            Err(ConfigError::InvalidEnv { var, value }) => {
                assert_eq!(var, PORT);
                assert_eq!(value, "http");
            }
            other => panic!("expected InvalidEnv, got {:?}", other),
        }
    }

    #[test]
    fn test_invalid_base_path_fails_validation() {
        let env = env(&[(BASE_URL, "shop")]);
        assert!(matches!(
            load_config(None, &env),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let result = load_config(Some(Path::new("/nonexistent/frontend.toml")), &HashMap::new());
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_errors_render_and_chain() {
        let env = env(&[(BASE_URL, "shop")]);
        let message = load_config(None, &env).unwrap_err().to_string();
        assert!(message.starts_with("Validation failed: routing.base_path: 'shop'"));

        let error = load_config(Some(Path::new("/nonexistent/frontend.toml")), &HashMap::new()).unwrap_err();
        assert!(std::error::Error::source(&error).is_some());
    }
}
