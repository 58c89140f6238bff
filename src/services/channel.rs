//! Traced gRPC channels.
//!
//! Every backend channel is wrapped in [`TraceContextInterceptor`], which
//! writes the current span's OpenTelemetry context into the outbound gRPC
//! metadata so backend spans join the request's trace.

use std::time::Duration;

use opentelemetry::propagation::Injector;
use tonic::metadata::{Ascii, MetadataKey, MetadataMap, MetadataValue};
use tonic::service::interceptor::InterceptedService;
use tonic::service::Interceptor;
use tonic::transport::{Channel, Endpoint};
use tracing_opentelemetry::OpenTelemetrySpanExt;

use crate::observability::tracing::SharedPropagator;

/// A backend channel that propagates trace context on every call.
pub type TracedChannel = InterceptedService<Channel, TraceContextInterceptor>;

/// Adds the `http://` scheme tonic requires when the address is a bare `host:port`.
pub fn endpoint_uri(address: &str) -> String {
    let address = address.trim();
    if address.contains("://") {
        address.to_string()
    } else {
        format!("http://{}", address)
    }
}

/// Parse `address` into an endpoint with the given connection setup timeout.
pub fn endpoint(address: &str, setup_timeout: Duration) -> Result<Endpoint, tonic::transport::Error> {
    Ok(Endpoint::from_shared(endpoint_uri(address))?.connect_timeout(setup_timeout))
}

/// Build a lazily connected, traced channel.
///
/// Fails only if `address` cannot be parsed; the TCP connection itself is
/// established by the transport on first use.
pub fn connect_traced(
    address: &str,
    setup_timeout: Duration,
    propagator: SharedPropagator,
) -> Result<TracedChannel, tonic::transport::Error> {
    let channel = endpoint(address, setup_timeout)?.connect_lazy();
    Ok(InterceptedService::new(
        channel,
        TraceContextInterceptor::new(propagator),
    ))
}

/// Injects the current span context into outbound request metadata.
#[derive(Debug, Clone)]
pub struct TraceContextInterceptor {
    propagator: SharedPropagator,
}

impl TraceContextInterceptor {
    pub fn new(propagator: SharedPropagator) -> Self {
        Self { propagator }
    }
}

impl Interceptor for TraceContextInterceptor {
    fn call(&mut self, mut request: tonic::Request<()>) -> Result<tonic::Request<()>, tonic::Status> {
        let context = tracing::Span::current().context();
        self.propagator
            .inject_context(&context, &mut MetadataInjector(request.metadata_mut()));
        Ok(request)
    }
}

struct MetadataInjector<'a>(&'a mut MetadataMap);

impl Injector for MetadataInjector<'_> {
    fn set(&mut self, key: &str, value: String) {
        let Ok(key) = MetadataKey::<Ascii>::from_bytes(key.as_bytes()) else {
            tracing::debug!(%key, "failed to parse metadata key");
            return;
        };
        let Ok(value) = MetadataValue::<Ascii>::try_from(value.as_str()) else {
            tracing::debug!(%value, "failed to parse metadata value");
            return;
        };
        self.0.insert(key, value);
    }
}

#[cfg(test)]
mod tests {
    use opentelemetry::trace::TracerProvider as _;
    use opentelemetry_sdk::trace::SdkTracerProvider;
    use tracing_subscriber::layer::SubscriberExt;

    use super::*;
    use crate::observability::tracing::propagator;

    #[test]
    fn test_bare_addresses_get_http_scheme() {
        assert_eq!(endpoint_uri("cartservice:7070"), "http://cartservice:7070");
        assert_eq!(endpoint_uri("https://cart:443"), "https://cart:443");
    }

    #[test]
    fn test_malformed_address_is_rejected() {
        assert!(endpoint("cart service:7070", Duration::from_secs(3)).is_err());
    }

    #[test]
    fn test_interceptor_injects_traceparent_inside_span() {
        let provider = SdkTracerProvider::builder().build();
        let subscriber = tracing_subscriber::registry()
            .with(tracing_opentelemetry::layer().with_tracer(provider.tracer("test")));

        tracing::subscriber::with_default(subscriber, || {
            let span = tracing::info_span!("outbound");
            let _entered = span.enter();

            let mut interceptor = TraceContextInterceptor::new(propagator());
            let request = interceptor.call(tonic::Request::new(())).unwrap();
            let traceparent = request
                .metadata()
                .get("traceparent")
                .expect("traceparent injected")
                .to_str()
                .unwrap()
                .to_string();
            assert!(traceparent.starts_with("00-"));
        });
    }

    #[test]
    fn test_interceptor_is_a_noop_without_active_trace() {
        let mut interceptor = TraceContextInterceptor::new(propagator());
        let request = interceptor.call(tonic::Request::new(())).unwrap();
        assert!(request.metadata().get("traceparent").is_none());
    }
}
