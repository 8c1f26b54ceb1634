use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    Json,
};
use tracing::info;

use crate::api::{auth::ensure_admin_authorized, state::AppState, types::*};
use crate::domain::ModuleRecord;
use crate::error::NexusError;
use crate::supervisor::{CommandResult, ModuleCommand};

/// GET /modules?category=&status=
pub async fn list_modules(
    State(state): State<AppState>,
    Query(query): Query<ModuleQuery>,
) -> ApiResult<Vec<ModuleRecord>> {
    let filter = query.into_filter()?;
    Ok(Json(state.registry.list(filter).await))
}

/// GET /modules/:id
pub async fn get_module(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<ModuleRecord> {
    state
        .registry
        .get(&id)
        .await
        .map(Json)
        .ok_or_else(|| NexusError::UnknownModule(id).into())
}

/// POST /modules/:id/command
pub async fn execute_command(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<CommandRequest>,
) -> ApiResult<CommandResult> {
    let command = ModuleCommand::parse(&req.command, req.params.as_ref())?;
    if command.is_mutating() {
        ensure_admin_authorized(&state, &headers)?;
    }

    let result = state.poller.execute(&id, command).await?;
    info!(
        "Command {} on {}: {} -> {}",
        result.command, id, result.previous_status, result.record.status
    );
    Ok(Json(result))
}
