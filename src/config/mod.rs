//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! defaults (schema.rs)
//!     → optional TOML file (loader.rs)
//!     → environment overrides (loader.rs, env.rs)
//!     → validation.rs (semantic checks)
//!     → FrontendConfig (validated, immutable)
//!     → shared by reference with every subsystem at startup
//! ```
//!
//! Backend service addresses are not part of the file schema. They are
//! resolved from the environment by the service bootstrapper, which treats a
//! missing address as fatal.

pub mod env;
pub mod loader;
pub mod schema;
pub mod validation;

pub use env::{EnvSource, ProcessEnv};
pub use loader::{load_config, ConfigError};
pub use schema::{
    FrontendConfig, ListenerConfig, LogFormat, ObservabilityConfig, ProfilerConfig,
    RoutingConfig, SessionConfig, TimeoutConfig, TracingConfig,
};
