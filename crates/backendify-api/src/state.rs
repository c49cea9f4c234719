//! Application state

use backendify_core::{AdmissionGate, BackendRegistry, FetchEngine};
use std::sync::Arc;

/// Prometheus exporter handle rendered by `/metrics`
pub type MetricsHandle = metrics_exporter_prometheus::PrometheusHandle;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub backends: Arc<BackendRegistry>,
    pub engine: Arc<FetchEngine>,
    pub gate: Arc<AdmissionGate>,
}

impl AppState {
    pub fn new(
        backends: Arc<BackendRegistry>,
        engine: Arc<FetchEngine>,
        gate: Arc<AdmissionGate>,
    ) -> Self {
        Self {
            backends,
            engine,
            gate,
        }
    }
}
