use crate::error::ApiError;
use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use cdp_runtime::{DiameterEngine, PeerInfo, Statistics};
use serde_json::json;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Management router over a running engine
pub fn create_router(engine: Arc<DiameterEngine>) -> Router {
    Router::new()
        .route("/api/v1/peers", get(list_peers))
        .route("/api/v1/peers/:fqdn/enable", post(enable_peer))
        .route("/api/v1/peers/:fqdn/disable", post(disable_peer))
        .route("/api/v1/stats", get(statistics))
        .route("/metrics", get(metrics))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(engine)
}

// Handlers

async fn list_peers(State(engine): State<Arc<DiameterEngine>>) -> Json<Vec<PeerInfo>> {
    Json(engine.list_peers())
}

async fn enable_peer(
    Path(fqdn): Path<String>,
    State(engine): State<Arc<DiameterEngine>>,
) -> Result<StatusCode, ApiError> {
    engine.enable_peer(&fqdn)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn disable_peer(
    Path(fqdn): Path<String>,
    State(engine): State<Arc<DiameterEngine>>,
) -> Result<StatusCode, ApiError> {
    engine.disable_peer(&fqdn)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn statistics(State(engine): State<Arc<DiameterEngine>>) -> Json<Statistics> {
    Json(engine.statistics())
}

async fn metrics(State(engine): State<Arc<DiameterEngine>>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        engine.metrics().gather(),
    )
}

async fn health(State(engine): State<Arc<DiameterEngine>>) -> impl IntoResponse {
    if engine.is_shutting_down() {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "stopping" })),
        )
    } else {
        (
            StatusCode::OK,
            Json(json!({ "status": "ok", "fqdn": engine.config().fqdn })),
        )
    }
}
