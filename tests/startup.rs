//! Startup policies, exercised against a real listener.

use std::net::TcpStream;
use std::time::Duration;

use storefront_frontend::lifecycle::{prepare, Shutdown, StartupError};
use storefront_frontend::services::BootstrapError;
use storefront_frontend::UnwiredPages;

mod common;

use common::{free_port, required_env, sample, test_config};

#[tokio::test]
async fn test_missing_dependency_stops_before_binding() {
    let port = free_port();
    let mut config = test_config();
    config.listener.port = port;

    let mut env = required_env();
    env.remove("CART_SERVICE_ADDR");

    match prepare(config, &env) {
        Err(StartupError::Bootstrap(BootstrapError::MissingEnv(vars))) => {
            assert_eq!(vars, vec!["CART_SERVICE_ADDR"]);
        }
        other => panic!("expected MissingEnv, got {:?}", other),
    }
    assert!(TcpStream::connect(("127.0.0.1", port)).is_err());
}

#[tokio::test]
async fn test_malformed_address_is_fatal() {
    let mut env = required_env();
    env.insert("CURRENCY_SERVICE_ADDR".into(), "currency service:7000".into());

    let shutdown = Shutdown::new();
    let result = prepare(test_config(), &env)
        .unwrap()
        .launch(|_, _| UnwiredPages, &shutdown)
        .await;
    assert!(matches!(
        result,
        Err(StartupError::Bootstrap(BootstrapError::InvalidAddress { .. }))
    ));
}

#[tokio::test]
async fn test_tracing_without_collector_is_fatal() {
    let mut config = test_config();
    config.tracing.enabled = true;

    match prepare(config, &required_env()) {
        Err(StartupError::Bootstrap(BootstrapError::MissingEnv(vars))) => {
            assert_eq!(vars, vec!["COLLECTOR_SERVICE_ADDR"]);
        }
        other => panic!("expected MissingEnv, got {:?}", other),
    }
}

#[tokio::test]
async fn test_serves_while_profiler_retries() {
    let mut config = test_config();
    config.profiler.enabled = true;
    config.profiler.agent_address = "127.0.0.1:1".into();

    let shutdown = Shutdown::new();
    let running = prepare(config, &required_env())
        .unwrap()
        .launch(|_, _| UnwiredPages, &shutdown)
        .await
        .unwrap();
    let base = format!("http://{}", running.local_addr());

    let health = reqwest::get(format!("{}/_healthz", base)).await.unwrap();
    assert_eq!(health.status().as_u16(), 200);
    assert!(health.headers().get("set-cookie").is_some());
    assert_eq!(health.text().await.unwrap(), "ok");

    let home = reqwest::get(format!("{}/", base)).await.unwrap();
    assert_eq!(home.status().as_u16(), 501);

    let metrics = reqwest::get(format!("{}/metrics", base))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(
        sample(&metrics, "frontend_requests_total", &[("path", "/_healthz"), ("status", "200")]),
        Some(1.0)
    );
    assert_eq!(
        sample(&metrics, "frontend_request_errors_total", &[("path", "/"), ("status", "501")]),
        Some(1.0)
    );

    // The first attempt fails at once; the task is now waiting out its backoff.
    assert!(running.profiler_running());

    shutdown.trigger();
    tokio::time::timeout(Duration::from_secs(10), running.wait())
        .await
        .expect("shutdown completes promptly")
        .unwrap();
}
