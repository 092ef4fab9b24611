//! Prometheus metrics export. Stage handlers record throughput and gap
//! counters (see `callaudit_stages::correlator`) straight into the
//! global `metrics` recorder this installs; this module only owns the
//! recorder and the `/metrics` scrape handler.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::state::AppState;

pub fn init_metrics() -> PrometheusHandle {
    PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder")
}

pub async fn metrics_handler(axum::extract::State(state): axum::extract::State<AppState>) -> impl IntoResponse {
    (StatusCode::OK, state.metrics_handle.render())
}
