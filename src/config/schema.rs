//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the frontend.
//! All types derive Serde traits for deserialization from config files.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the storefront frontend.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct FrontendConfig {
    /// Listener configuration (address, port).
    pub listener: ListenerConfig,

    /// Base path and static asset settings.
    pub routing: RoutingConfig,

    /// Session and preference cookies.
    pub session: SessionConfig,

    /// Startup timeouts.
    pub timeouts: TimeoutConfig,

    /// Distributed tracing export.
    pub tracing: TracingConfig,

    /// Continuous profiling agent.
    pub profiler: ProfilerConfig,

    /// Logging and metrics settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Interface to listen on. Empty means all interfaces.
    pub listen_addr: String,

    /// TCP port. `0` asks the OS for an ephemeral port.
    pub port: u16,
}

impl ListenerConfig {
    /// The `host:port` string handed to the TCP listener.
    pub fn bind_address(&self) -> String {
        let host = self.listen_addr.trim();
        if host.is_empty() {
            format!("0.0.0.0:{}", self.port)
        } else if host.contains(':') && !host.starts_with('[') {
            format!("[{}]:{}", host, self.port)
        } else {
            format!("{}:{}", host, self.port)
        }
    }
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            listen_addr: String::new(),
            port: 8080,
        }
    }
}

/// Route layout.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// Prefix every page route is mounted under (e.g. "/shop"). Empty by default.
    pub base_path: String,

    /// Directory served under `<base_path>/static/`.
    pub static_dir: PathBuf,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            base_path: String::new(),
            static_dir: PathBuf::from("./static"),
        }
    }
}

/// Cookie settings shared by the session and currency cookies.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Prefix for every cookie the frontend issues.
    pub cookie_prefix: String,

    /// Cookie lifetime in seconds.
    pub max_age_secs: u64,
}

impl SessionConfig {
    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_secs)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_prefix: "shop_".to_string(),
            max_age_secs: 60 * 60 * 48,
        }
    }
}

/// Timeout configuration for startup operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Connection setup timeout for backend channels, in seconds.
    pub connect_secs: u64,
}

impl TimeoutConfig {
    pub fn connect(&self) -> Duration {
        Duration::from_secs(self.connect_secs)
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { connect_secs: 3 }
    }
}

/// Trace export configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TracingConfig {
    /// Export spans to the collector.
    pub enabled: bool,

    /// `service.name` resource attribute.
    pub service_name: String,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            service_name: "frontend".to_string(),
        }
    }
}

/// Profiling agent configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProfilerConfig {
    /// Start the profiler in the background.
    pub enabled: bool,

    /// Service name reported to the agent.
    pub service_name: String,

    /// Service version reported to the agent.
    pub service_version: String,

    /// Address of the profiling agent.
    pub agent_address: String,

    /// Number of start attempts before giving up.
    pub max_attempts: u32,

    /// Wait after the n-th failed attempt is `n * retry_step_secs`.
    pub retry_step_secs: u64,
}

impl Default for ProfilerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            service_name: "frontend".to_string(),
            service_version: "1.0.0".to_string(),
            agent_address: "localhost:4040".to_string(),
            max_attempts: 3,
            retry_step_secs: 10,
        }
    }
}

impl ProfilerConfig {
    pub fn retry_step(&self) -> Duration {
        Duration::from_secs(self.retry_step_secs)
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// One JSON object per line.
    Json,
    /// Human-readable text.
    Text,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "text" | "pretty" => Ok(LogFormat::Text),
            other => Err(format!("unknown log format '{}'", other)),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error). `RUST_LOG` takes precedence.
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Path of the Prometheus exposition endpoint. Never prefixed by the base path.
    pub metrics_path: String,

    /// Fold paths outside the known route table into one label.
    pub fold_unmatched_paths: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "debug".to_string(),
            log_format: LogFormat::Json,
            metrics_path: "/metrics".to_string(),
            fold_unmatched_paths: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_address_defaults_to_all_interfaces() {
        let listener = ListenerConfig::default();
        assert_eq!(listener.bind_address(), "0.0.0.0:8080");
    }

    #[test]
    fn test_bind_address_brackets_ipv6_hosts() {
        let listener = ListenerConfig {
            listen_addr: "::1".into(),
            port: 9000,
        };
        assert_eq!(listener.bind_address(), "[::1]:9000");
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: FrontendConfig = toml::from_str(
            r#"
            [routing]
            base_path = "/shop"

            [observability]
            log_format = "text"
            "#,
        )
        .unwrap();

        assert_eq!(config.routing.base_path, "/shop");
        assert_eq!(config.observability.log_format, LogFormat::Text);
        assert_eq!(config.listener.port, 8080);
        assert_eq!(config.session.max_age_secs, 172_800);
        assert_eq!(config.profiler.max_attempts, 3);
    }
}
