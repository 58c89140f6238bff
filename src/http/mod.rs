//! HTTP edge of the storefront.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (axum serve, graceful shutdown)
//!     → pipeline.rs (trace, session, logging, metrics)
//!     → routes.rs (page table, built-ins, 404/405)
//!     → PageHandler
//! ```

pub mod pipeline;
pub mod routes;
pub mod server;
pub mod session;

pub use pipeline::{Pipeline, PipelineContext, Stage};
pub use routes::{dispatcher, Page, PageHandler, UnwiredPages};
pub use server::HttpServer;
pub use session::{SessionCookies, SessionId};
