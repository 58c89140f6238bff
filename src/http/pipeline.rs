//! Request pipeline composition.
//!
//! # Data Flow
//! ```text
//! Inbound request
//!     → Trace    (server span, parent from traceparent)
//!     → Session  (SessionId extension, Set-Cookie on the way out)
//!     → Logging  (RequestId extension, one summary record)
//!     → Metrics  (in-flight gauge, counters, histogram)
//!     → dispatcher (routes, built-ins, catch-panic)
//! ```
//!
//! The order is data: [`Pipeline::standard`] lists the stages outermost
//! first and [`Pipeline::compose`] is the only place they are applied.

use std::sync::Arc;

use axum::{middleware, Router};

use crate::http::session::{assign_session, SessionCookies};
use crate::observability::logging::log_requests;
use crate::observability::metrics::{record_metrics, HttpMetrics};
use crate::observability::tracing::{SharedPropagator, TraceLayer};

/// One middleware stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Trace,
    Session,
    Logging,
    Metrics,
}

/// Shared state the stages need.
#[derive(Clone)]
pub struct PipelineContext {
    pub metrics: Arc<HttpMetrics>,
    pub sessions: Arc<SessionCookies>,
    pub propagator: SharedPropagator,
}

impl Stage {
    fn apply(self, router: Router, context: &PipelineContext) -> Router {
        match self {
            Stage::Trace => router.layer(TraceLayer::new(context.propagator.clone())),
            Stage::Session => router.layer(middleware::from_fn_with_state(
                Arc::clone(&context.sessions),
                assign_session,
            )),
            Stage::Logging => router.layer(middleware::from_fn(log_requests)),
            Stage::Metrics => router.layer(middleware::from_fn_with_state(
                Arc::clone(&context.metrics),
                record_metrics,
            )),
        }
    }
}

/// Ordered list of stages, outermost first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pipeline {
    stages: Vec<Stage>,
}

impl Pipeline {
    pub fn new(stages: Vec<Stage>) -> Self {
        Self { stages }
    }

    /// Trace → Session → Logging → Metrics.
    pub fn standard() -> Self {
        Self::new(vec![Stage::Trace, Stage::Session, Stage::Logging, Stage::Metrics])
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// Wrap `dispatcher` so the first stage sees the request first.
    pub fn compose(&self, dispatcher: Router, context: &PipelineContext) -> Router {
        self.stages
            .iter()
            .rev()
            .fold(dispatcher, |router, stage| stage.apply(router, context))
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::standard()
    }
}
