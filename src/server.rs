//! Status server.
//!
//! Small HTTP surface exposing liveness, readiness, and the agent status
//! snapshot. This is the operator-visible health indicator; there is no
//! dashboard here.

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use serde::Serialize;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, TraceLayer},
};

use crate::health::{AgentHealth, HealthSnapshot};
use crate::storage::StorageBackend;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Health counters shared with the scheduler and sync engine.
    pub health: Arc<AgentHealth>,
    /// The selected storage backend.
    pub backend: Arc<StorageBackend>,
}

/// Health check response.
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    backend: Option<&'static str>,
}

/// Agent status response.
#[derive(Serialize)]
struct StatusResponse {
    mode: &'static str,
    printers_known: u64,
    #[serde(flatten)]
    health: HealthSnapshot,
}

/// Create the Axum router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz_handler))
        .route("/readyz", get(readyz_handler))
        .route("/api/status", get(status_handler))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::default().include_headers(false)),
        )
        .layer(CorsLayer::permissive())
        .with_state(Arc::new(state))
}

/// Liveness probe.
async fn healthz_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        backend: None,
    })
}

/// Readiness probe: checks the selected backend.
///
/// Degraded local durability reports 503 so supervisors notice; the agent
/// itself keeps polling.
async fn readyz_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let backend_ok = state.backend.health_check().await;
    let degraded = state.health.is_degraded();

    if backend_ok && !degraded {
        (
            StatusCode::OK,
            Json(HealthResponse {
                status: "ok",
                backend: Some("ready"),
            }),
        )
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(HealthResponse {
                status: if degraded { "degraded" } else { "unavailable" },
                backend: Some(if backend_ok { "ready" } else { "unreachable" }),
            }),
        )
    }
}

/// Agent status snapshot.
async fn status_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let printers_known = state
        .backend
        .local_store()
        .printer_count()
        .unwrap_or_default();

    Json(StatusResponse {
        mode: state.backend.mode(),
        printers_known,
        health: state.health.snapshot(),
    })
}
