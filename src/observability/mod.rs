//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Every request produces:
//!     → tracing.rs (server span joined to the caller's trace)
//!     → logging.rs (one summary event per request)
//!     → metrics.rs (counters, histogram, in-flight gauge)
//!         → normalize.rs (path → bounded label)
//!
//! Background:
//!     → profiling.rs (agent connection, bounded retry)
//!
//! Consumers:
//!     → Log aggregation (stdout, JSON)
//!     → Metrics endpoint (Prometheus scrape)
//!     → Trace collector (OTLP over gRPC)
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for machine parsing
//! - Request ID and session ID flow into every request record
//! - Metric labels never carry raw ids
//! - Tracing and profiling are optional and never fatal once configured

pub mod logging;
pub mod metrics;
pub mod normalize;
pub mod profiling;
pub mod tracing;

pub use logging::RequestId;
pub use metrics::HttpMetrics;
pub use normalize::{normalize_path, PathNormalizer};
pub use profiling::{AgentProfiler, Profiler, ProfilerError, ProfilerOutcome, RetryPolicy};
pub use self::tracing::{propagator, SharedPropagator, TraceLayer, TracerSetup};
