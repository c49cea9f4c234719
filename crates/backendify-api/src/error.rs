//! API error types

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use backendify_core::FetchError;
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            ApiError::Unavailable(msg) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "UNAVAILABLE",
                msg.clone(),
            ),
            ApiError::Fetch(e) => match e {
                FetchError::Overloaded => (
                    StatusCode::TOO_MANY_REQUESTS,
                    "OVERLOADED",
                    e.to_string(),
                ),
                // Every other engine outcome reads as "no record" to clients;
                // the precise reason is logged and counted by the handler.
                _ => (
                    StatusCode::NOT_FOUND,
                    "NOT_FOUND",
                    "Company not found".to_string(),
                ),
            },
        };

        let body = axum::Json(json!({
            "error": {
                "code": code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}
