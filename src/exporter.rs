//! HTTP endpoint exposing the refresh metrics
//!
//! ## Endpoints
//!
//! - `GET /metrics` - Prometheus text exposition of the registry
//! - `GET /healthz` - Loop state and time of the last target file write

use std::net::SocketAddr;

use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use prometheus::TEXT_FORMAT;
use serde::Serialize;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::actors::LoopState;
use crate::metrics::PrometheusMetrics;

/// Shared state of the exporter routes
#[derive(Clone)]
pub struct ExporterState {
    pub metrics: PrometheusMetrics,
    pub loop_state: watch::Receiver<LoopState>,
    pub last_write: watch::Receiver<Option<DateTime<Utc>>>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub loop_state: LoopState,
    pub last_write: Option<String>,
    pub timestamp: String,
}

pub fn router(state: ExporterState) -> Router {
    Router::new()
        .route("/metrics", get(metrics))
        .route("/healthz", get(health))
        .with_state(state)
}

/// Serve the exporter until `cancel` fires
///
/// Returns the bound address; the server itself runs in a background task.
pub async fn spawn_exporter(
    bind_addr: SocketAddr,
    state: ExporterState,
    cancel: CancellationToken,
) -> anyhow::Result<SocketAddr> {
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    let addr = listener.local_addr()?;

    info!("metrics endpoint listening on {}", addr);

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router(state))
            .with_graceful_shutdown(cancel.cancelled_owned())
            .await
        {
            error!("metrics endpoint error: {}", e);
        }
    });

    Ok(addr)
}

/// GET /metrics
async fn metrics(State(state): State<ExporterState>) -> Response {
    match state.metrics.gather_text() {
        Ok(body) => ([(header::CONTENT_TYPE, TEXT_FORMAT)], body).into_response(),
        Err(e) => {
            error!("failed to encode metrics: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// GET /healthz
///
/// Unavailable once the discovery loop has stopped.
async fn health(State(state): State<ExporterState>) -> (StatusCode, Json<HealthResponse>) {
    let loop_state = *state.loop_state.borrow();
    let last_write = state.last_write.borrow().map(|at| at.to_rfc3339());

    let (code, status) = match loop_state {
        LoopState::Stopped => (StatusCode::SERVICE_UNAVAILABLE, "stopped"),
        _ => (StatusCode::OK, "ok"),
    };

    (
        code,
        Json(HealthResponse {
            status,
            loop_state,
            last_write,
            timestamp: Utc::now().to_rfc3339(),
        }),
    )
}
