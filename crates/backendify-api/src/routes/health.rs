//! Health and readiness endpoints

use axum::{
    Json, Router,
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Serialize;

use crate::state::AppState;

/// Health status response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Liveness check handler
async fn health() -> Json<HealthResponse> {
    metrics::counter!("backendify_health_checks_total").increment(1);

    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// GET /status - ready while at least one worker can take a job
async fn status(State(state): State<AppState>) -> Response {
    let idle = state.engine.idle_workers();
    metrics::gauge!("backendify_idle_workers").set(idle as f64);

    let cache = state.engine.cache().stats();
    metrics::gauge!("backendify_cache_entries").set(cache.entries as f64);
    metrics::gauge!("backendify_cache_capacity").set(cache.capacity as f64);
    metrics::gauge!("backendify_cache_hits").set(cache.hits as f64);
    metrics::gauge!("backendify_cache_misses").set(cache.misses as f64);
    metrics::gauge!("backendify_cache_evictions").set(cache.evictions as f64);

    if idle == 0 || state.engine.is_shut_down() {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain")],
        "OK",
    )
        .into_response()
}

/// Create health routes
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/healthz", get(health))
        .route("/status", get(status))
}
