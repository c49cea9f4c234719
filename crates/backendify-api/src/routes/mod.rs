//! API routes

mod company;
mod health;
pub mod metrics;

use axum::{Router, http::StatusCode, response::IntoResponse};
use std::sync::Arc;

use crate::state::{AppState, MetricsHandle};

async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "Not Found")
}

/// Create the main router
pub fn create_router(state: AppState, metrics_handle: Option<Arc<MetricsHandle>>) -> Router {
    let mut router = Router::new()
        // Liveness and readiness
        .merge(health::routes())
        // Company lookups
        .merge(company::routes())
        .with_state(state);

    // Add metrics endpoint if handle is provided
    if let Some(handle) = metrics_handle {
        router = router.merge(metrics::routes(handle));
    }

    router.fallback(not_found)
}
