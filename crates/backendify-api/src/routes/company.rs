//! Company lookup routes

use axum::{
    Json, Router,
    extract::{Query, State},
    routing::get,
};
use backendify_core::{Company, FetchError};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::error::ApiError;
use crate::state::AppState;

/// Query parameters for a company lookup
#[derive(Debug, Deserialize)]
pub struct CompanyQuery {
    id: Option<String>,
    country_iso: Option<String>,
}

/// GET /company?id=<id>&country_iso=<country>
async fn get_company(
    State(state): State<AppState>,
    Query(query): Query<CompanyQuery>,
) -> Result<Json<Company>, ApiError> {
    let id = query.id.filter(|id| !id.is_empty());
    let country = query.country_iso.filter(|c| !c.is_empty());
    let (Some(id), Some(country)) = (id, country) else {
        metrics::counter!("backendify_requests_total", "outcome" => "bad_request").increment(1);
        return Err(ApiError::NotFound(
            "Both id and country_iso are required".to_string(),
        ));
    };

    let Some(origin) = state.backends.resolve(&country) else {
        metrics::counter!("backendify_requests_total", "outcome" => "unknown_country").increment(1);
        return Err(ApiError::NotFound(format!(
            "No backend for country: {}",
            country
        )));
    };

    debug!("GET company: {} ({} -> {})", id, country, origin);

    // Held until the response is produced, including on early return or
    // when the client goes away and this future is dropped
    let _token = state.gate.acquire().await.inspect_err(|e| {
        warn!("Rejecting company {} ({}): {}", id, country, e);
        metrics::counter!("backendify_requests_total", "outcome" => "overloaded").increment(1);
    })?;

    match state.engine.fetch(origin, &id).await {
        Ok(company) => {
            info!("Company {} ({}) retrieved", id, country);
            metrics::counter!("backendify_requests_total", "outcome" => "ok").increment(1);
            Ok(Json(company))
        }
        Err(FetchError::ShuttingDown) => {
            warn!("Company {} ({}) not served: engine is shutting down", id, country);
            metrics::counter!("backendify_requests_total", "outcome" => "shutting_down")
                .increment(1);
            Err(ApiError::Unavailable("Service is shutting down".to_string()))
        }
        Err(e) => {
            warn!("Company {} ({}) not served: {} ({})", id, country, e, e.reason());
            metrics::counter!("backendify_requests_total", "outcome" => "no_result").increment(1);
            metrics::counter!("backendify_fetch_failures_total", "reason" => e.reason())
                .increment(1);
            Err(ApiError::Fetch(e))
        }
    }
}

/// Create company routes
pub fn routes() -> Router<AppState> {
    Router::new().route("/company", get(get_company))
}
