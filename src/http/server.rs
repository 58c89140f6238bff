//! HTTP server.
//!
//! # Responsibilities
//! - Serve the composed router on a bound listener
//! - Stop accepting on shutdown and drain in-flight requests

use tokio::net::TcpListener;
use tokio::sync::broadcast;

use axum::Router;

/// HTTP server for the storefront frontend.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    pub fn new(router: Router) -> Self {
        Self { router }
    }

    /// Run until `shutdown` fires, then drain open connections.
    pub async fn run(self, listener: TcpListener, mut shutdown: broadcast::Receiver<()>) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received, draining connections");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}
