//! HTTP server for Prometheus metrics endpoint.

use crate::metrics::MetricRegistry;
use axum::{
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse},
    routing::get,
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;

/// Errors that can occur during metrics server operations.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind to address: {0}")]
    Bind(#[from] std::io::Error),

    #[error("server error: {0}")]
    Server(String),
}

/// Configuration for the metrics server.
#[derive(Debug, Clone)]
pub struct MetricsServerConfig {
    /// Address to bind the server to.
    pub bind_addr: SocketAddr,
    /// Path the scrape endpoint is served on.
    pub metrics_path: String,
}

impl Default for MetricsServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: ([0, 0, 0, 0], 9314).into(),
            metrics_path: "/metrics".to_string(),
        }
    }
}

/// HTTP server for exposing Prometheus metrics.
pub struct MetricsServer {
    config: MetricsServerConfig,
    registry: Arc<MetricRegistry>,
}

impl MetricsServer {
    /// Creates a new metrics server over a shared registry.
    pub fn new(config: MetricsServerConfig, registry: Arc<MetricRegistry>) -> Self {
        Self { config, registry }
    }

    /// Binds the listening socket.
    ///
    /// Once this returns, connections are accepted by the kernel and queue
    /// until [`MetricsServer::serve`] picks them up.
    pub async fn bind(&self) -> Result<TcpListener, ServerError> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;

        tracing::info!(
            addr = %listener.local_addr()?,
            path = %self.config.metrics_path,
            "Metrics server listening"
        );

        Ok(listener)
    }

    /// Serves requests on an already bound listener until the server fails.
    pub async fn serve(self, listener: TcpListener) -> Result<(), ServerError> {
        let app = create_router(self.registry, &self.config.metrics_path);

        axum::serve(listener, app)
            .await
            .map_err(|e| ServerError::Server(e.to_string()))?;

        Ok(())
    }
}

/// Creates the HTTP router.
fn create_router(registry: Arc<MetricRegistry>, metrics_path: &str) -> Router {
    let landing = landing_page(metrics_path);

    let mut router: Router<Arc<MetricRegistry>> =
        Router::new().route(metrics_path, get(metrics_handler));
    if metrics_path != "/" {
        router = router.route("/", get(move || async move { Html(landing) }));
    }

    router.layer(CorsLayer::permissive()).with_state(registry)
}

fn landing_page(metrics_path: &str) -> String {
    format!(
        "<html>\n\
         <head><title>Nuki Exporter</title></head>\n\
         <body>\n\
         <h1>Nuki Exporter</h1>\n\
         <p><a href='{}'>Metrics</a></p>\n\
         </body>\n\
         </html>\n",
        metrics_path
    )
}

/// Handler for the metrics endpoint.
async fn metrics_handler(State(registry): State<Arc<MetricRegistry>>) -> impl IntoResponse {
    match registry.encode() {
        Ok(output) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            output,
        ),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [("content-type", "text/plain; charset=utf-8")],
                format!("Failed to encode metrics: {}", e),
            )
        }
    }
}
