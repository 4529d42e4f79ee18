// ABOUTME: Liveness and metrics HTTP endpoints for external monitoring.
// ABOUTME: GET /health reports process status and the live conversation count.

use anyhow::{Context, Result};
use axum::{extract::State, routing::get, Json, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;

use crate::config::HealthConfig;
use crate::registry::ConversationRegistry;

#[derive(Clone)]
struct HealthState {
    registry: Arc<ConversationRegistry>,
    metrics_handle: PrometheusHandle,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    conversations: usize,
}

/// Serve /health and /metrics until the shutdown signal flips
pub async fn serve(
    config: &HealthConfig,
    registry: Arc<ConversationRegistry>,
    metrics_handle: PrometheusHandle,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let state = HealthState {
        registry,
        metrics_handle,
    };

    let app = Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    let addr = format!("{}:{}", config.host, config.port);
    tracing::info!(addr = %addr, "Starting health server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind health server to {}", addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.changed().await;
        })
        .await
        .context("Health server failed")?;

    tracing::info!("Health server stopped");
    Ok(())
}

/// Read-only liveness report; never mutates the registry
async fn health_handler(State(state): State<HealthState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        conversations: state.registry.conversation_count().await,
    })
}

/// Prometheus text exposition
async fn metrics_handler(State(state): State<HealthState>) -> String {
    state.metrics_handle.render()
}
