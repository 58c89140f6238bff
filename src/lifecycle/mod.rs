//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     prepare: resolve addresses → tracer setup
//!     (caller installs the log subscriber)
//!     launch:  connect services → spawn profiler → compose pipeline → bind → serve
//!
//! Shutdown (shutdown.rs):
//!     Signal received → stop accepting → drain connections → flush spans → exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Fail fast: missing or malformed dependency addresses are fatal
//! - Nothing is bound until every fatal check has passed
//! - Optional subsystems degrade or retry in the background

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use startup::{prepare, Prepared, Running, StartupError};
