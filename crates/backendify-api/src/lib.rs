//! Backendify REST API
//!
//! This crate provides the Axum-based HTTP surface of the gateway: company
//! lookups routed to per-country backends, readiness and liveness probes,
//! and the Prometheus metrics endpoint.

pub mod error;
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use routes::create_router;
pub use state::{AppState, MetricsHandle};
