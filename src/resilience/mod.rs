//! Resilience helpers.
//!
//! # Data Flow
//! ```text
//! Background initialization (profiler):
//!     → attempt
//!     → On failure: backoff.rs (wait step × attempt, then retry)
//!     → Give up after the attempt budget
//! ```
//!
//! # Design Decisions
//! - Retries are bounded; nothing retries forever
//! - Request handling never retries, only background setup does

pub mod backoff;
