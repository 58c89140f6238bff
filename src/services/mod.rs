//! Backend service bootstrap.
//!
//! # Data Flow
//! ```text
//! environment
//!     → registry.rs (ServiceAddresses::resolve, fail-fast on any missing var)
//!     → channel.rs (tonic Endpoint per address, trace-context interceptor)
//!     → ServiceRegistry (immutable, shared via Arc with page handlers)
//! ```
//!
//! Channels are created lazily by the transport; only address parsing happens
//! eagerly, so a malformed address still stops startup.

pub mod channel;
pub mod registry;

pub use channel::{TraceContextInterceptor, TracedChannel};
pub use registry::{BootstrapError, Dependency, ServiceAddresses, ServiceEndpoint, ServiceRegistry};
