//! Operational HTTP surface. The pipeline's inputs and outputs are the
//! event log and the read-model stores, not REST; a business-data query
//! façade is an external collaborator. This router exposes only what an
//! operator or orchestrator needs to keep the process alive.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use tower_http::trace::TraceLayer;

use crate::metrics::metrics_handler;
use crate::state::AppState;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(health_check))
        .route("/readyz", get(readiness_check))
        .route("/metrics", get(metrics_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "healthy" })))
}

/// Reports whether the persistence backend this process picked at
/// startup is usable. `main` always falls back to the in-memory store
/// on a ScyllaDB connection or schema failure rather than refusing to
/// start, so today this is always `ready`; the flag exists so that
/// fallback policy can tighten later without changing this route.
async fn readiness_check(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> impl IntoResponse {
    let ready = state.is_persistence_ready();
    let status = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (
        status,
        Json(serde_json::json!({
            "status": if ready { "ready" } else { "not_ready" },
            "uptime_secs": state.uptime_secs(),
            "environment": state.settings.environment,
        })),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrics_exporter_prometheus::PrometheusBuilder;
    use std::sync::Arc;

    #[test]
    fn router_builds() {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .expect("recorder installs exactly once per test binary");
        let state = AppState::new(Arc::new(callaudit_config::Settings::default()), handle, true);
        let _ = create_router(state);
    }
}
