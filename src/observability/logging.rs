//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the subscriber (JSON or text, plus the OpenTelemetry bridge)
//! - Assign every request an id
//! - Emit one summary event per request, including aborted ones
//!
//! # Design Decisions
//! - `RUST_LOG` overrides the configured level
//! - JSON records carry the severity under `level`, the key
//!   `tracing-subscriber`'s JSON formatter writes
//! - The summary is emitted from a drop guard so a cancelled request still
//!   leaves a record

use std::fmt;
use std::time::Instant;

use axum::{
    extract::Request,
    http::{header::CONTENT_LENGTH, Method, StatusCode},
    middleware::Next,
    response::Response,
};
use opentelemetry_sdk::trace::SdkTracer;
use tracing_subscriber::{
    fmt as fmt_layer, layer::SubscriberExt, util::SubscriberInitExt, util::TryInitError, EnvFilter,
};
use uuid::Uuid;

use crate::config::{LogFormat, ObservabilityConfig};
use crate::http::session::SessionId;
use crate::observability::tracing::current_trace_id;

/// Install the global subscriber.
pub fn init(config: &ObservabilityConfig, tracer: Option<SdkTracer>) -> Result<(), TryInitError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(format!("info,storefront_frontend={}", config.log_level)))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let otel = tracer.map(|tracer| tracing_opentelemetry::layer().with_tracer(tracer));

    let (json, text) = match config.log_format {
        LogFormat::Json => (
            Some(
                fmt_layer::layer()
                    .json()
                    .flatten_event(true)
                    .with_current_span(true)
                    .with_span_list(false),
            ),
            None,
        ),
        LogFormat::Text => (None, Some(fmt_layer::layer().with_target(false))),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(otel)
        .with(json)
        .with(text)
        .try_init()
}

/// Per-request correlation id, available to handlers as an extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestId(Uuid);

impl RequestId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

struct Outcome {
    status: StatusCode,
    bytes: Option<u64>,
}

/// Emits the request summary when dropped.
struct RequestRecord {
    id: RequestId,
    method: Method,
    path: String,
    session: Option<SessionId>,
    trace_id: Option<String>,
    start: Instant,
    outcome: Option<Outcome>,
}

impl Drop for RequestRecord {
    fn drop(&mut self) {
        let took_ms = self.start.elapsed().as_millis() as u64;
        let session = self.session.as_ref().map(SessionId::as_str);

        match &self.outcome {
            Some(outcome) => tracing::info!(
                http.req.id = %self.id,
                http.req.method = %self.method,
                http.req.path = %self.path,
                session,
                trace_id = self.trace_id.as_deref(),
                http.resp.status = outcome.status.as_u16(),
                http.resp.bytes = outcome.bytes,
                http.resp.took_ms = took_ms,
                "request complete"
            ),
            None => tracing::warn!(
                http.req.id = %self.id,
                http.req.method = %self.method,
                http.req.path = %self.path,
                session,
                trace_id = self.trace_id.as_deref(),
                http.resp.took_ms = took_ms,
                "request aborted"
            ),
        }
    }
}

fn content_length(response: &Response) -> Option<u64> {
    response
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse().ok())
}

/// Logging stage of the request pipeline.
pub async fn log_requests(mut request: Request, next: Next) -> Response {
    let id = RequestId::generate();
    request.extensions_mut().insert(id);

    let mut record = RequestRecord {
        id,
        method: request.method().clone(),
        path: request.uri().path().to_string(),
        session: request.extensions().get::<SessionId>().cloned(),
        trace_id: current_trace_id(),
        start: Instant::now(),
        outcome: None,
    };
    tracing::debug!(
        http.req.id = %record.id,
        http.req.method = %record.method,
        http.req.path = %record.path,
        "request started"
    );

    let response = next.run(request).await;
    record.outcome = Some(Outcome {
        status: response.status(),
        bytes: content_length(&response),
    });
    response
}
