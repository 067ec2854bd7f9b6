//! Local HTTP surface: health, metrics and the log level switch

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, put},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::Result;
use crate::logging::LogLevelHandle;
use crate::metrics::Metrics;

const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Shared state of the handlers
#[derive(Clone)]
pub struct ServerState {
    pub metrics: Arc<Metrics>,
    pub log_level: Option<LogLevelHandle>,
    pub started_at: DateTime<Utc>,
}

impl ServerState {
    pub fn new(metrics: Arc<Metrics>, log_level: Option<LogLevelHandle>) -> Self {
        Self {
            metrics,
            log_level,
            started_at: Utc::now(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub started_at: DateTime<Utc>,
}

pub fn router(state: ServerState, metrics_path: &str) -> Router {
    Router::new()
        .route("/health", get(health))
        .route(metrics_path, get(metrics))
        .route("/log-level", put(set_log_level))
        .with_state(state)
}

async fn health(State(state): State<ServerState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        started_at: state.started_at,
    })
}

async fn metrics(State(state): State<ServerState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE)],
        state.metrics.render(),
    )
}

async fn set_log_level(State(state): State<ServerState>, body: String) -> (StatusCode, String) {
    let Some(handle) = state.log_level else {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            "log level is not adjustable in this process".to_string(),
        );
    };

    let level = body.trim();
    match handle.set(level) {
        Ok(()) => {
            info!("Log level changed to {}", level);
            (StatusCode::OK, format!("log level set to {}", level))
        }
        Err(e) => {
            warn!("Rejected log level change: {}", e);
            (StatusCode::BAD_REQUEST, e.to_string())
        }
    }
}

/// Serve on an already bound listener until `cancel` fires
pub async fn serve(listener: TcpListener, router: Router, cancel: CancellationToken) -> Result<()> {
    axum::serve(listener, router)
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await?;
    info!("HTTP server stopped");
    Ok(())
}

/// Bind the listener on `0.0.0.0:{port}`
pub async fn bind(port: u16) -> Result<TcpListener> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    info!("HTTP server listening on {}", addr);
    Ok(listener)
}
