//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::Request,
    http::StatusCode,
    response::{IntoResponse, Response},
    Router,
};
use storefront_frontend::config::FrontendConfig;
use storefront_frontend::http::{
    dispatcher, Page, PageHandler, Pipeline, PipelineContext, SessionCookies, SessionId,
};
use storefront_frontend::observability::{propagator, HttpMetrics, PathNormalizer};
use storefront_frontend::services::Dependency;

/// Every required dependency variable, pointing at a placeholder host.
pub fn required_env() -> HashMap<String, String> {
    Dependency::REQUIRED
        .iter()
        .map(|d| (d.env_var().to_string(), format!("{}:7000", d.name())))
        .collect()
}

/// Defaults, bound to an ephemeral loopback port.
pub fn test_config() -> FrontendConfig {
    let mut config = FrontendConfig::default();
    config.listener.listen_addr = "127.0.0.1".into();
    config.listener.port = 0;
    config
}

/// A loopback port that was free a moment ago.
pub fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

/// Page handlers with scripted behavior:
/// - product `boom` panics, other products echo the session id
/// - assistant answers 304
/// - everything else answers 200 with the page name
#[derive(Clone)]
pub struct ProbePages;

impl PageHandler for ProbePages {
    async fn handle(&self, page: Page, request: Request) -> Response {
        match page {
            Page::Product if request.uri().path().ends_with("/boom") => panic!("product handler failed"),
            Page::Product => request
                .extensions()
                .get::<SessionId>()
                .map(|session| session.to_string())
                .unwrap_or_default()
                .into_response(),
            Page::Assistant => StatusCode::NOT_MODIFIED.into_response(),
            other => other.name().into_response(),
        }
    }
}

/// The standard pipeline around the dispatcher, plus its metrics registry.
pub fn pipeline_app() -> (Router, Arc<HttpMetrics>) {
    let metrics = Arc::new(HttpMetrics::new(PathNormalizer::default(), "/metrics").unwrap());
    let context = PipelineContext {
        metrics: Arc::clone(&metrics),
        sessions: Arc::new(SessionCookies::new("shop_", Duration::from_secs(172_800))),
        propagator: propagator(),
    };
    let router = Pipeline::standard().compose(
        dispatcher("", ProbePages, std::path::Path::new("./static"), Arc::clone(&metrics)),
        &context,
    );
    (router, metrics)
}

/// Value of the sample named `name` carrying every label in `labels`.
pub fn sample(rendered: &str, name: &str, labels: &[(&str, &str)]) -> Option<f64> {
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
