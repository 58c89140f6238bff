//! Startup orchestration.
//!
//! # Responsibilities
//! - Resolve every dependency address and set up trace export
//! - Connect backend services and start the profiler
//! - Compose the request pipeline, bind the listener and begin serving
//!
//! # Design Decisions
//! - Fail fast: any error returned here is fatal to the process
//! - Split in two so the log subscriber can be installed with the tracer
//!   between [`prepare`] and [`Prepared::launch`]
//! - Listeners start last (traffic only when ready)

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use metrics_exporter_prometheus::BuildError;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing_subscriber::util::TryInitError;

use crate::config::{ConfigError, EnvSource, FrontendConfig};
use crate::http::{dispatcher, HttpServer, PageHandler, Pipeline, PipelineContext, SessionCookies};
use crate::lifecycle::shutdown::Shutdown;
use crate::observability::metrics::HttpMetrics;
use crate::observability::normalize::PathNormalizer;
use crate::observability::profiling::{spawn_profiler, AgentProfiler, RetryPolicy};
use crate::observability::tracing::{init_tracer, propagator, SharedPropagator, TracerSetup};
use crate::services::{BootstrapError, ServiceAddresses, ServiceRegistry};

/// Fatal startup errors.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Bootstrap(#[from] BootstrapError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to build metrics recorder: {0}")]
    Metrics(#[from] BuildError),

    #[error("failed to install log subscriber: {0}")]
    Telemetry(#[from] TryInitError),

    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: io::Error,
    },

    #[error("HTTP server failed: {0}")]
    Serve(#[source] io::Error),
}

/// Everything resolved before the first socket is bound.
#[derive(Debug)]
pub struct Prepared {
    config: FrontendConfig,
    addresses: ServiceAddresses,
    tracer: TracerSetup,
    propagator: SharedPropagator,
}

/// Resolve addresses and set up tracing.
///
/// Must run inside a Tokio runtime when tracing is enabled: the collector
/// channel is driven by a background task.
pub fn prepare(config: FrontendConfig, env: &dyn EnvSource) -> Result<Prepared, StartupError> {
    let addresses = ServiceAddresses::resolve(env, config.tracing.enabled)?;
    let tracer = init_tracer(&config.tracing, addresses.collector(), config.timeouts.connect())?;

    Ok(Prepared {
        config,
        addresses,
        tracer,
        propagator: propagator(),
    })
}

impl Prepared {
    pub fn config(&self) -> &FrontendConfig {
        &self.config
    }

    pub fn tracer_setup(&self) -> &TracerSetup {
        &self.tracer
    }

    /// Connect services, start the profiler and serve.
    ///
    /// `make_pages` builds the page handlers from the connected registry.
    pub async fn launch<P, F>(self, make_pages: F, shutdown: &Shutdown) -> Result<Running, StartupError>
    where
        P: PageHandler,
        F: FnOnce(Arc<ServiceRegistry>, Arc<SessionCookies>) -> P,
    {
        let Prepared {
            config,
            addresses,
            tracer,
            propagator,
        } = self;

        let setup_timeout = config.timeouts.connect();
        let registry = Arc::new(ServiceRegistry::connect(&addresses, setup_timeout, &propagator)?);

        let profiler = start_profiler(&config, shutdown);

        let metrics = Arc::new(HttpMetrics::new(
            PathNormalizer::new(
                config.routing.base_path.clone(),
                config.observability.fold_unmatched_paths,
            ),
            config.observability.metrics_path.clone(),
        )?);
        let sessions = Arc::new(SessionCookies::from_config(&config.session));
        let pages = make_pages(Arc::clone(&registry), Arc::clone(&sessions));

        let context = PipelineContext {
            metrics: Arc::clone(&metrics),
            sessions,
            propagator,
        };
        let router = Pipeline::standard().compose(
            dispatcher(&config.routing.base_path, pages, &config.routing.static_dir, metrics),
            &context,
        );

        let address = config.listener.bind_address();
        let listener = match TcpListener::bind(&address).await {
            Ok(listener) => listener,
            Err(source) => {
                if let Some(profiler) = &profiler {
                    profiler.abort();
                }
                return Err(StartupError::Bind { address, source });
            }
        };
        let local_addr = listener.local_addr().map_err(StartupError::Serve)?;
        tracing::info!(address = %local_addr, "starting server");

        let server = tokio::spawn(HttpServer::new(router).run(listener, shutdown.subscribe()));

        Ok(Running {
            local_addr,
            registry,
            tracer,
            shutdown: shutdown.clone(),
            server,
            profiler,
        })
    }
}

fn start_profiler(config: &FrontendConfig, shutdown: &Shutdown) -> Option<JoinHandle<()>> {
    if !config.profiler.enabled {
        tracing::info!("Profiling disabled.");
        return None;
    }
    tracing::info!("Profiling enabled.");

    match AgentProfiler::from_config(&config.profiler, config.timeouts.connect()) {
        Ok(profiler) => Some(spawn_profiler(
            profiler,
            RetryPolicy::from_config(&config.profiler),
            shutdown.subscribe(),
        )),
        Err(e) => {
            tracing::warn!(error = %e, "Profiler not started");
            None
        }
    }
}

/// A serving frontend.
#[derive(Debug)]
pub struct Running {
    local_addr: SocketAddr,
    registry: Arc<ServiceRegistry>,
    tracer: TracerSetup,
    shutdown: Shutdown,
    server: JoinHandle<Result<(), io::Error>>,
    profiler: Option<JoinHandle<()>>,
}

impl Running {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn registry(&self) -> &Arc<ServiceRegistry> {
        &self.registry
    }

    /// Whether the background profiler task is still running.
    pub fn profiler_running(&self) -> bool {
        self.profiler.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Wait for the server to stop, then stop the profiler and flush spans.
    pub async fn wait(self) -> Result<(), StartupError> {
        let served = match self.server.await {
            Ok(result) => result.map_err(StartupError::Serve),
            Err(e) => Err(StartupError::Serve(io::Error::other(e))),
        };

        self.shutdown.trigger();
        if let Some(profiler) = self.profiler {
            let _ = profiler.await;
        }
        self.tracer.shutdown();

        served
    }
}
