//! Metrics collection and exposition.
//!
//! # Metrics
//! - `frontend_requests_total` (counter): requests by path, method, status
//! - `frontend_request_duration_seconds` (histogram): latency by path, method, status
//! - `frontend_request_errors_total` (counter): requests that ended with status >= 400
//! - `frontend_requests_in_flight` (gauge): requests currently inside the pipeline
//!
//! # Design Decisions
//! - The recorder is owned by [`HttpMetrics`], not installed globally; every
//!   update runs against it through `metrics::with_local_recorder`
//! - Paths are normalized before they become labels
//! - The exposition endpoint never records itself

use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{Request, State},
    http::{header, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle, PrometheusRecorder};

use crate::observability::normalize::PathNormalizer;

pub const REQUESTS_TOTAL: &str = "frontend_requests_total";
pub const REQUEST_DURATION_SECONDS: &str = "frontend_request_duration_seconds";
pub const REQUEST_ERRORS_TOTAL: &str = "frontend_request_errors_total";
pub const REQUESTS_IN_FLIGHT: &str = "frontend_requests_in_flight";

/// Prometheus client default buckets, in seconds.
pub const DURATION_BUCKETS: &[f64] = &[0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0];

/// Content type of the text exposition format.
pub const EXPOSITION_CONTENT_TYPE: &str = "text/plain; version=0.0.4";

/// Request metrics registry for the HTTP pipeline.
pub struct HttpMetrics {
    recorder: PrometheusRecorder,
    handle: PrometheusHandle,
    normalizer: PathNormalizer,
    exposition_path: String,
}

impl HttpMetrics {
    pub fn new(normalizer: PathNormalizer, exposition_path: impl Into<String>) -> Result<Self, BuildError> {
        let recorder = PrometheusBuilder::new()
            .set_buckets(DURATION_BUCKETS)?
            .build_recorder();
        let handle = recorder.handle();

        metrics::with_local_recorder(&recorder, || {
            describe_counter!(REQUESTS_TOTAL, Unit::Count, "Total HTTP requests processed");
            describe_histogram!(REQUEST_DURATION_SECONDS, Unit::Seconds, "Duration of HTTP requests");
            describe_counter!(REQUEST_ERRORS_TOTAL, Unit::Count, "HTTP requests answered with status >= 400");
            describe_gauge!(REQUESTS_IN_FLIGHT, Unit::Count, "HTTP requests currently being served");
        });

        Ok(Self {
            recorder,
            handle,
            normalizer,
            exposition_path: exposition_path.into(),
        })
    }

    pub fn exposition_path(&self) -> &str {
        &self.exposition_path
    }

    pub fn normalizer(&self) -> &PathNormalizer {
        &self.normalizer
    }

    /// Mark a request as in flight. The gauge is decremented when the guard drops.
    pub fn begin(self: &Arc<Self>) -> InFlight {
        metrics::with_local_recorder(&self.recorder, || gauge!(REQUESTS_IN_FLIGHT).increment(1.0));
        InFlight {
            metrics: Arc::clone(self),
            start: Instant::now(),
        }
    }

    fn record(&self, path: &str, method: &Method, status: StatusCode, elapsed_secs: f64) {
        let labels = [
            ("path", path.to_string()),
            ("method", method.as_str().to_string()),
            ("status", status.as_u16().to_string()),
        ];

        metrics::with_local_recorder(&self.recorder, || {
            counter!(REQUESTS_TOTAL, &labels).increment(1);
            histogram!(REQUEST_DURATION_SECONDS, &labels).record(elapsed_secs);
            if status.as_u16() >= 400 {
                counter!(REQUEST_ERRORS_TOTAL, &labels).increment(1);
            }
        });
    }

    /// Snapshot of every registered metric in the text exposition format.
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

impl std::fmt::Debug for HttpMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpMetrics")
            .field("normalizer", &self.normalizer)
            .field("exposition_path", &self.exposition_path)
            .finish()
    }
}

/// A request inside the pipeline.
#[derive(Debug)]
pub struct InFlight {
    metrics: Arc<HttpMetrics>,
    start: Instant,
}

impl InFlight {
    /// Record the outcome. The in-flight gauge is released on drop.
    pub fn complete(self, path: &str, method: &Method, status: StatusCode) {
        let elapsed = self.start.elapsed().as_secs_f64();
        self.metrics.record(path, method, status, elapsed);
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        metrics::with_local_recorder(&self.metrics.recorder, || {
            gauge!(REQUESTS_IN_FLIGHT).decrement(1.0)
        });
    }
}

/// Metrics stage of the request pipeline.
pub async fn record_metrics(
    State(metrics): State<Arc<HttpMetrics>>,
    request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path();
    if path == metrics.exposition_path() {
        return next.run(request).await;
    }

    let label = metrics.normalizer().label(path).into_owned();
    let method = request.method().clone();
    let in_flight = metrics.begin();

    let response = next.run(request).await;
    in_flight.complete(&label, &method, response.status());

    response
}

/// Handler for the exposition endpoint.
pub async fn render_metrics(State(metrics): State<Arc<HttpMetrics>>) -> Response {
    (
        [(header::CONTENT_TYPE, EXPOSITION_CONTENT_TYPE)],
        metrics.render(),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Value of the sample named `name` carrying every label in `labels`.
    fn sample(rendered: &str, name: &str, labels: &[(&str, &str)]) -> Option<f64> {
        rendered
            .lines()
            .filter(|line| !line.starts_with('#'))
            .filter(|line| {
                line.strip_prefix(name)
                    .is_some_and(|rest| rest.starts_with('{') || rest.starts_with(' '))
            })
            .find(|line| {
                labels
                    .iter()
                    .all(|(k, v)| line.contains(&format!("{}=\"{}\"", k, v)))
            })
            .and_then(|line| line.rsplit(' ').next())
            .and_then(|value| value.parse().ok())
    }

    fn metrics() -> Arc<HttpMetrics> {
        Arc::new(HttpMetrics::new(PathNormalizer::default(), "/metrics").unwrap())
    }

    #[test]
    fn test_records_counter_histogram_and_errors() {
        let metrics = metrics();

        metrics.begin().complete("/product/{id}", &Method::GET, StatusCode::OK);
        metrics.begin().complete("/product/{id}", &Method::GET, StatusCode::OK);
        metrics.begin().complete("/cart", &Method::POST, StatusCode::INTERNAL_SERVER_ERROR);

        let rendered = metrics.render();
        let ok = [("path", "/product/{id}"), ("method", "GET"), ("status", "200")];
        let failed = [("path", "/cart"), ("method", "POST"), ("status", "500")];

        assert_eq!(sample(&rendered, REQUESTS_TOTAL, &ok), Some(2.0));
        assert_eq!(sample(&rendered, REQUESTS_TOTAL, &failed), Some(1.0));
        assert_eq!(sample(&rendered, REQUEST_ERRORS_TOTAL, &failed), Some(1.0));
        assert_eq!(sample(&rendered, REQUEST_ERRORS_TOTAL, &ok), None);
        assert_eq!(
            sample(&rendered, &format!("{}_count", REQUEST_DURATION_SECONDS), &ok),
            Some(2.0)
        );
        assert_eq!(sample(&rendered, REQUESTS_IN_FLIGHT, &[]), Some(0.0));
    }

    #[test]
    fn test_not_modified_is_not_an_error() {
        let metrics = metrics();
        metrics.begin().complete("/static/*", &Method::GET, StatusCode::NOT_MODIFIED);

        let rendered = metrics.render();
        let labels = [("path", "/static/*"), ("status", "304")];
        assert_eq!(sample(&rendered, REQUESTS_TOTAL, &labels), Some(1.0));
        assert_eq!(sample(&rendered, REQUEST_ERRORS_TOTAL, &labels), None);
    }

    #[test]
    fn test_in_flight_tracks_open_guards() {
        let metrics = metrics();
        let first = metrics.begin();
        let second = metrics.begin();
        assert_eq!(sample(&metrics.render(), REQUESTS_IN_FLIGHT, &[]), Some(2.0));

        drop(first);
        second.complete("/", &Method::GET, StatusCode::OK);
        assert_eq!(sample(&metrics.render(), REQUESTS_IN_FLIGHT, &[]), Some(0.0));
    }

    #[test]
    fn test_registries_are_independent() {
        let a = metrics();
        let b = metrics();
        a.begin().complete("/", &Method::GET, StatusCode::OK);

        let labels = [("path", "/")];
        assert_eq!(sample(&a.render(), REQUESTS_TOTAL, &labels), Some(1.0));
        assert_eq!(sample(&b.render(), REQUESTS_TOTAL, &labels), None);
    }
}
