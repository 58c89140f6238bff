//! Distributed tracing support.
//!
//! # Responsibilities
//! - Extract W3C trace context (and baggage) from incoming requests
//! - Open the server span every request runs inside
//! - Propagate trace context to backend requests
//! - Build the span exporter that ships spans to the collector
//!
//! # Design Decisions
//! - Disabled by default; enabled with `ENABLE_TRACING`
//! - The propagator is passed explicitly rather than installed globally
//! - A broken exporter degrades tracing, it never stops the frontend

use std::fmt::Display;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use axum::http::{HeaderMap, HeaderName, HeaderValue, Request, Response, StatusCode};
use opentelemetry::propagation::{
    Extractor, Injector, TextMapCompositePropagator, TextMapPropagator,
};
use opentelemetry::trace::{TraceContextExt, TracerProvider as _};
use opentelemetry_otlp::{SpanExporter, WithTonicConfig};
use opentelemetry_sdk::propagation::{BaggagePropagator, TraceContextPropagator};
use opentelemetry_sdk::trace::{Sampler, SdkTracer, SdkTracerProvider};
use opentelemetry_sdk::Resource;
use tower::{Layer, Service};
use tracing::field::Empty;
use tracing::{Instrument, Span};
use tracing_opentelemetry::OpenTelemetrySpanExt;

use crate::config::TracingConfig;
use crate::services::channel::endpoint;
use crate::services::{BootstrapError, Dependency};

/// Propagator shared by the trace stage and every outbound client.
pub type SharedPropagator = Arc<dyn TextMapPropagator + Send + Sync>;

/// W3C trace-context plus baggage.
pub fn propagator() -> SharedPropagator {
    Arc::new(TextMapCompositePropagator::new(vec![
        Box::new(TraceContextPropagator::new()),
        Box::new(BaggagePropagator::new()),
    ]))
}

/// Read-only view of request headers for context extraction.
pub struct HeaderExtractor<'a>(pub &'a HeaderMap);

impl Extractor for HeaderExtractor<'_> {
    fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|value| value.to_str().ok())
    }

    fn keys(&self) -> Vec<&str> {
        self.0.keys().map(HeaderName::as_str).collect()
    }
}

/// Writable view of outbound request headers for context injection.
pub struct HeaderInjector<'a>(pub &'a mut HeaderMap);

impl Injector for HeaderInjector<'_> {
    fn set(&mut self, key: &str, value: String) {
        let Ok(key) = key.parse::<HeaderName>() else {
            tracing::debug!(%key, "failed to parse header name");
            return;
        };
        let Ok(value) = HeaderValue::from_str(&value) else {
            tracing::debug!(%value, "failed to parse header value");
            return;
        };
        self.0.insert(key, value);
    }
}

/// Parent context carried by `headers`, empty if there is none.
pub fn extract_context(propagator: &SharedPropagator, headers: &HeaderMap) -> opentelemetry::Context {
    propagator.extract(&HeaderExtractor(headers))
}

/// Write the current span's context into outbound HTTP headers.
pub fn inject_context(propagator: &SharedPropagator, headers: &mut HeaderMap) {
    let context = Span::current().context();
    propagator.inject_context(&context, &mut HeaderInjector(headers));
}

/// Hex trace id of the current span, if it carries a valid trace context.
pub fn current_trace_id() -> Option<String> {
    let context = Span::current().context();
    let span = context.span();
    let span_context = span.span_context();
    span_context
        .is_valid()
        .then(|| span_context.trace_id().to_string())
}

/// Trace stage of the request pipeline.
///
/// Must be the outermost stage so that every later stage, logging included,
/// runs inside the request span.
#[derive(Clone)]
pub struct TraceLayer {
    propagator: SharedPropagator,
}

impl TraceLayer {
    pub fn new(propagator: SharedPropagator) -> Self {
        Self { propagator }
    }
}

impl<S> Layer<S> for TraceLayer {
    type Service = TraceService<S>;

    fn layer(&self, service: S) -> Self::Service {
        TraceService {
            service,
            propagator: self.propagator.clone(),
        }
    }
}

#[derive(Clone)]
pub struct TraceService<S> {
    service: S,
    propagator: SharedPropagator,
}

/// Record the response status on the server span; 5xx marks it as an error.
fn record_status(span: &Span, status: StatusCode) {
    span.record("http.response.status_code", status.as_u16());
    if status.is_server_error() {
        span.record("otel.status_code", "ERROR");
    }
}

impl<S, B, ResBody> Service<Request<B>> for TraceService<S>
where
    S: Service<Request<B>, Response = Response<ResBody>>,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.service.poll_ready(cx)
    }

    fn call(&mut self, request: Request<B>) -> Self::Future {
        let parent = extract_context(&self.propagator, request.headers());
        let method = request.method();
        let path = request.uri().path();

        let span = tracing::info_span!(
            "http_request",
            otel.name = %format!("{} {}", method, path),
            otel.kind = "server",
            otel.status_code = Empty,
            http.request.method = %method,
            http.response.status_code = Empty,
            url.path = %path,
        );
        span.set_parent(parent);

        let inner = self.service.call(request);
        let recorder = span.clone();
        Box::pin(
            async move {
                let result = inner.await;
                if let Ok(response) = &result {
                    record_status(&recorder, response.status());
                }
                result
            }
            .instrument(span),
        )
    }
}

/// Outcome of tracer initialization.
#[derive(Debug)]
pub enum TracerSetup {
    Disabled,
    Exporting(SdkTracerProvider),
    /// Spans are created and propagated but never exported.
    Degraded {
        provider: SdkTracerProvider,
        error: String,
    },
}

impl TracerSetup {
    /// Build the provider around an exporter, or degrade if the exporter
    /// could not be created.
    pub fn from_exporter<E: Display>(config: &TracingConfig, exporter: Result<SpanExporter, E>) -> Self {
        let builder = SdkTracerProvider::builder()
            .with_sampler(Sampler::AlwaysOn)
            .with_resource(
                Resource::builder()
                    .with_service_name(config.service_name.clone())
                    .build(),
            );

        match exporter {
            Ok(exporter) => TracerSetup::Exporting(builder.with_batch_exporter(exporter).build()),
            Err(error) => TracerSetup::Degraded {
                provider: builder.build(),
                error: error.to_string(),
            },
        }
    }

    pub fn tracer(&self) -> Option<SdkTracer> {
        match self {
            TracerSetup::Disabled => None,
            TracerSetup::Exporting(provider) | TracerSetup::Degraded { provider, .. } => {
                Some(provider.tracer(env!("CARGO_PKG_NAME")))
            }
        }
    }

    pub fn is_enabled(&self) -> bool {
        !matches!(self, TracerSetup::Disabled)
    }

    /// Log the outcome. Call once the subscriber is installed.
    pub fn report(&self) {
        match self {
            TracerSetup::Disabled => tracing::info!("Tracing disabled."),
            TracerSetup::Exporting(_) => tracing::info!("Tracing enabled."),
            TracerSetup::Degraded { error, .. } => {
                tracing::info!("Tracing enabled.");
                tracing::warn!(error = %error, "Failed to create trace exporter, spans will not be exported");
            }
        }
    }

    /// Flush and stop the exporter.
    pub fn shutdown(&self) {
        let provider = match self {
            TracerSetup::Disabled => return,
            TracerSetup::Exporting(provider) | TracerSetup::Degraded { provider, .. } => provider,
        };
        if let Err(e) = provider.shutdown() {
            tracing::warn!(error = %e, "Tracer provider shutdown failed");
        }
    }
}

/// Set up span export to the collector.
///
/// The collector address is fatal when missing or unparseable. Any later
/// exporter failure only degrades tracing.
pub fn init_tracer(
    config: &TracingConfig,
    collector: Option<&str>,
    setup_timeout: Duration,
) -> Result<TracerSetup, BootstrapError> {
    if !config.enabled {
        return Ok(TracerSetup::Disabled);
    }

    let address = collector.ok_or_else(|| BootstrapError::MissingEnv(vec![Dependency::Collector.env_var()]))?;
    let channel = endpoint(address, setup_timeout)
        .map_err(|e| BootstrapError::InvalidAddress {
            dependency: Dependency::Collector,
            address: address.to_string(),
            reason: e.to_string(),
        })?
        .connect_lazy();

    let exporter = SpanExporter::builder().with_tonic().with_channel(channel).build();
    Ok(TracerSetup::from_exporter(config, exporter))
}

#[cfg(test)]
mod tests {
    use std::fmt;
    use std::sync::Mutex;

    use axum::{body::Body, routing::get, Router};
    use tower::ServiceExt;
    use tracing::field::{Field, Visit};
    use tracing::span::{Id, Record};
    use tracing_subscriber::layer::{self, SubscriberExt};

    use super::*;

    const TRACEPARENT: &str = "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01";

    fn enabled() -> TracingConfig {
        TracingConfig {
            enabled: true,
            ..TracingConfig::default()
        }
    }

    #[test]
    fn test_disabled_setup_has_no_tracer() {
        let setup = init_tracer(&TracingConfig::default(), None, Duration::from_secs(3)).unwrap();
        assert!(matches!(setup, TracerSetup::Disabled));
        assert!(setup.tracer().is_none());
    }

    #[test]
    fn test_missing_collector_is_fatal_when_enabled() {
        match init_tracer(&enabled(), None, Duration::from_secs(3)) {
            Err(BootstrapError::MissingEnv(vars)) => assert_eq!(vars, vec!["COLLECTOR_SERVICE_ADDR"]),
            other => panic!("expected MissingEnv, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_enabled_setup_exports_to_collector() {
        let setup = init_tracer(&enabled(), Some("otel-collector:4317"), Duration::from_secs(3)).unwrap();
        assert!(matches!(setup, TracerSetup::Exporting(_)));
        assert!(setup.tracer().is_some());
    }

    #[test]
    fn test_exporter_failure_degrades() {
        let setup = TracerSetup::from_exporter(&enabled(), Err::<SpanExporter, _>("connection refused"));
        match &setup {
            TracerSetup::Degraded { error, .. } => assert_eq!(error, "connection refused"),
            other => panic!("expected Degraded, got {:?}", other),
        }
        assert!(setup.is_enabled());
        assert!(setup.tracer().is_some());
    }

    #[test]
    fn test_extracts_incoming_traceparent() {
        let mut headers = HeaderMap::new();
        headers.insert("traceparent", HeaderValue::from_static(TRACEPARENT));

        let context = extract_context(&propagator(), &headers);
        let span = context.span();
        assert!(span.span_context().is_remote());
        assert_eq!(
            span.span_context().trace_id().to_string(),
            "4bf92f3577b34da6a3ce929d0e0e4736"
        );
    }

    #[test]
    fn test_request_span_joins_incoming_trace() {
        let setup = TracerSetup::from_exporter(&enabled(), Err::<SpanExporter, _>("no collector"));
        let subscriber = tracing_subscriber::registry()
            .with(tracing_opentelemetry::layer().with_tracer(setup.tracer().unwrap()));

        tracing::subscriber::with_default(subscriber, || {
            let mut incoming = HeaderMap::new();
            incoming.insert("traceparent", HeaderValue::from_static(TRACEPARENT));

            let span = tracing::info_span!("http_request");
            span.set_parent(extract_context(&propagator(), &incoming));
            let _entered = span.enter();

            assert_eq!(
                current_trace_id().as_deref(),
                Some("4bf92f3577b34da6a3ce929d0e0e4736")
            );

            let mut outbound = HeaderMap::new();
            inject_context(&propagator(), &mut outbound);
            let injected = outbound.get("traceparent").unwrap().to_str().unwrap();
            assert!(injected.contains("4bf92f3577b34da6a3ce929d0e0e4736"));
        });
    }

    #[test]
    fn test_no_trace_id_outside_a_trace() {
        assert!(current_trace_id().is_none());
    }

    /// Collects fields recorded on spans after creation.
    #[derive(Clone, Default)]
    struct RecordedFields(Arc<Mutex<Vec<(String, String)>>>);

    impl RecordedFields {
        fn get(&self, name: &str) -> Option<String> {
            self.0
                .lock()
                .unwrap()
                .iter()
                .find(|(field, _)| field == name)
                .map(|(_, value)| value.clone())
        }
    }

    impl Visit for RecordedFields {
        fn record_str(&mut self, field: &Field, value: &str) {
            self.0.lock().unwrap().push((field.name().to_string(), value.to_string()));
        }

        fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
            self.0.lock().unwrap().push((field.name().to_string(), format!("{:?}", value)));
        }
    }

    impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for RecordedFields {
        fn on_record(&self, _id: &Id, values: &Record<'_>, _ctx: layer::Context<'_, S>) {
            values.record(&mut self.clone());
        }
    }

    async fn traced_status(uri: &str) -> RecordedFields {
        let recorded = RecordedFields::default();
        let _guard = tracing::subscriber::set_default(tracing_subscriber::registry().with(recorded.clone()));

        let app = Router::new()
            .route("/ok", get(|| async { "ok" }))
            .route("/fail", get(|| async { StatusCode::BAD_GATEWAY }))
            .layer(TraceLayer::new(propagator()));
        app.oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        recorded
    }

    #[tokio::test]
    async fn test_server_span_records_response_status() {
        let recorded = traced_status("/ok").await;
        assert_eq!(recorded.get("http.response.status_code").as_deref(), Some("200"));
        assert!(recorded.get("otel.status_code").is_none());
    }

    #[tokio::test]
    async fn test_server_error_marks_span_as_error() {
        let recorded = traced_status("/fail").await;
        assert_eq!(recorded.get("http.response.status_code").as_deref(), Some("502"));
        assert_eq!(recorded.get("otel.status_code").as_deref(), Some("ERROR"));
    }
}
