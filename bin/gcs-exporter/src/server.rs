//! Metrics HTTP endpoint

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    routing::get,
    Router,
};
use gcs_exporter_metrics::{MetricsRegistry, PrometheusExporter, CONTENT_TYPE};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::info;

struct MetricsState {
    registry: Arc<MetricsRegistry>,
    exporter: PrometheusExporter,
}

/// Routes: `/metrics` (Prometheus text) and `/health`
pub fn router(registry: Arc<MetricsRegistry>) -> Router {
    let state = Arc::new(MetricsState {
        registry,
        exporter: PrometheusExporter::new(),
    });
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn metrics_handler(State(state): State<Arc<MetricsState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, CONTENT_TYPE)],
        state.exporter.export(&state.registry),
    )
}

async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// Bind the metrics address; failure is fatal at startup
pub async fn bind_metrics_listener(addr: SocketAddr) -> Result<TcpListener> {
    TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind metrics listener on {addr}"))
}

/// Serve the registry on `listener` until `token` is cancelled
pub async fn start_metrics_server(
    listener: TcpListener,
    registry: Arc<MetricsRegistry>,
    token: CancellationToken,
) -> Result<()> {
    info!("Metrics available at http://{}/metrics", listener.local_addr()?);

    axum::serve(listener, router(registry))
        .with_graceful_shutdown(async move { token.cancelled().await })
        .await?;

    info!("Metrics server stopped");
    Ok(())
}
