use axum::{extract::State, http::StatusCode, Json};

use crate::api::{state::AppState, types::LivenessResponse};
use crate::registry::{HealthSummary, OverallHealth};

/// GET /health -- registry rollup, 503 while any module is failed
pub async fn health_summary(
    State(state): State<AppState>,
) -> (StatusCode, Json<HealthSummary>) {
    let summary = state.registry.summary().await;
    let code = if summary.status == OverallHealth::Critical {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };
    (code, Json(summary))
}

/// GET /healthz -- process liveness
pub async fn liveness(State(state): State<AppState>) -> Json<LivenessResponse> {
    Json(LivenessResponse {
        status: "ok".to_string(),
        uptime_secs: state.uptime_seconds(),
        poller: state.poller.state(),
        ticks: state.poller.ticks_completed(),
    })
}
