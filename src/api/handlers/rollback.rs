use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};

use crate::api::{auth::ensure_admin_authorized, state::AppState, types::*};
use crate::domain::RollbackMeta;

/// GET /rollback
pub async fn list_rollback_points(State(state): State<AppState>) -> ApiResult<Vec<RollbackMeta>> {
    Ok(Json(state.rollback.list().await))
}

/// POST /rollback
pub async fn create_rollback_point(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Option<Json<RollbackRequest>>,
) -> Result<(StatusCode, Json<RollbackCreated>), ApiError> {
    ensure_admin_authorized(&state, &headers)?;

    let label = body
        .and_then(|Json(req)| req.label)
        .unwrap_or_default();
    let point = state.poller.snapshot(&label).await?;
    Ok((StatusCode::CREATED, Json(RollbackCreated::from(&point))))
}

/// POST /rollback/:id/restore
pub async fn restore_rollback_point(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<RollbackMeta> {
    ensure_admin_authorized(&state, &headers)?;

    let meta = state.poller.restore(&id).await?;
    Ok(Json(meta))
}
