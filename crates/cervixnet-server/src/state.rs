//! Shared application state

use cervixnet_inference::InferenceService;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

use crate::config::ServerConfig;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Loaded configuration
    pub config: Arc<ServerConfig>,

    /// Prediction pipeline over the shared model handle
    pub service: InferenceService,

    /// Prometheus metrics handle for rendering
    pub metrics_handle: PrometheusHandle,
}

impl AppState {
    pub fn new(
        config: ServerConfig,
        service: InferenceService,
        metrics_handle: PrometheusHandle,
    ) -> Self {
        Self {
            config: Arc::new(config),
            service,
            metrics_handle,
        }
    }
}
