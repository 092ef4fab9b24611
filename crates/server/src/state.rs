//! Shared state for the operational HTTP surface (`/healthz`, `/metrics`).
//!
//! The pipeline itself has no query façade: stage handlers talk to the
//! broker and persistence layer directly and never touch axum. This state
//! exists purely so the two ops routes can report on the process without
//! reaching back into `main`.

use std::sync::Arc;
use std::time::Instant;

use callaudit_config::Settings;
use metrics_exporter_prometheus::PrometheusHandle;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub metrics_handle: PrometheusHandle,
    pub started_at: Instant,
    pub persistence_ready: bool,
}

impl AppState {
    pub fn new(settings: Arc<Settings>, metrics_handle: PrometheusHandle, persistence_ready: bool) -> Self {
        Self {
            settings,
            metrics_handle,
            started_at: Instant::now(),
            persistence_ready,
        }
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    pub fn is_persistence_ready(&self) -> bool {
        self.persistence_ready
    }
}
