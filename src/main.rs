//! Storefront frontend gateway.
//!
//! The browser-facing edge of the storefront: every request passes through
//! the pipeline below before reaching a page handler, which talks to the
//! backend services over gRPC.
//!
//! # Architecture Overview
//!
//! ```text
//!                    ┌──────────────────────────────────────────────────────────┐
//!                    │                     FRONTEND GATEWAY                     │
//!                    │                                                          │
//!   Browser request  │  ┌───────┐  ┌─────────┐  ┌─────────┐  ┌─────────┐        │
//!   ─────────────────┼─▶│ trace │─▶│ session │─▶│ logging │─▶│ metrics │──┐     │
//!                    │  └───────┘  └─────────┘  └─────────┘  └─────────┘  │     │
//!                    │                                                    ▼     │
//!                    │                                           ┌────────────┐ │
//!                    │                                           │ dispatcher │ │
//!                    │                                           │ page table │ │
//!                    │                                           └─────┬──────┘ │
//!                    │                                                 ▼        │
//!                    │  ┌──────────────────┐                    ┌────────────┐  │   gRPC
//!                    │  │ service registry │◀───────────────────│   pages    │──┼──────▶ backends
//!                    │  │ (traced channels)│                    └────────────┘  │
//!                    │  └──────────────────┘                                    │
//!                    │                                                          │
//!                    │  background: profiler (bounded retry), span export (OTLP) │
//!                    └──────────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;

use storefront_frontend::config::{load_config, ProcessEnv};
use storefront_frontend::lifecycle::{prepare, signals, Shutdown};
use storefront_frontend::observability::logging;
use storefront_frontend::UnwiredPages;

#[derive(Debug, Parser)]
#[command(name = "storefront-frontend", version, about = "Storefront frontend gateway")]
struct Cli {
    /// Optional TOML configuration file.
    #[arg(long, env = "FRONTEND_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let env = ProcessEnv;

    let config = load_config(cli.config.as_deref(), &env)?;
    let observability = config.observability.clone();

    let prepared = match prepare(config, &env) {
        Ok(prepared) => prepared,
        Err(e) => {
            let _ = logging::init(&observability, None);
            tracing::error!(error = %e, "Startup failed");
            return Err(e.into());
        }
    };

    logging::init(&observability, prepared.tracer_setup().tracer())?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "storefront-frontend starting");
    prepared.tracer_setup().report();

    let shutdown = Shutdown::new();
    let running = match prepared.launch(|_, _| UnwiredPages, &shutdown).await {
        Ok(running) => running,
        Err(e) => {
            tracing::error!(error = %e, "Startup failed");
            return Err(e.into());
        }
    };

    let trigger = shutdown.clone();
    tokio::spawn(async move {
        signals::shutdown_signal().await;
        trigger.trigger();
    });

    running.wait().await?;
    tracing::info!("Shutdown complete");
    Ok(())
}
