//! Run job handlers

use crate::api::rest::state::AppState;
use crate::error::{ApiError, ApiResult};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use blockyard_types::{ProjectId, RunId, RunJob};
use serde::{Deserialize, Serialize};

/// Console command request
#[derive(Debug, Deserialize)]
pub struct CommandRequest {
    pub command: String,
}

/// Console command response
#[derive(Debug, Serialize)]
pub struct CommandResponse {
    pub accepted: bool,
}

/// List all runs, newest first
pub async fn list_runs(State(state): State<AppState>) -> ApiResult<Json<Vec<RunJob>>> {
    Ok(Json(state.runs.list(None).await?))
}

/// List a project's runs, newest first
pub async fn list_project_runs(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
) -> ApiResult<Json<Vec<RunJob>>> {
    let project_id = ProjectId::new(project_id);
    Ok(Json(state.runs.list(Some(&project_id)).await?))
}

/// Get a specific run
pub async fn get_run(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<RunJob>> {
    let run_id = parse_run_id(&id)?;
    Ok(Json(state.runs.get(&run_id).await?))
}

/// Start a run from the project's latest successful build
pub async fn create_run(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
) -> ApiResult<(StatusCode, Json<RunJob>)> {
    let project_id = ProjectId::new(project_id);
    let run = state.runs.enqueue(&project_id).await?;

    tracing::info!(
        run_id = %run.id,
        project_id = %project_id,
        port = ?run.port,
        "Run requested"
    );

    Ok((StatusCode::ACCEPTED, Json(run)))
}

/// Stop a run; returns once it is terminal
pub async fn stop_run(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<RunJob>> {
    let run_id = parse_run_id(&id)?;
    Ok(Json(state.runs.stop(&run_id).await?))
}

/// Send one console line to a running server
pub async fn send_command(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<CommandRequest>,
) -> ApiResult<(StatusCode, Json<CommandResponse>)> {
    let run_id = parse_run_id(&id)?;
    if request.command.trim().is_empty() {
        return Err(ApiError::BadRequest("command must not be empty".to_string()));
    }
    state.runs.send_command(&run_id, &request.command).await?;
    Ok((StatusCode::ACCEPTED, Json(CommandResponse { accepted: true })))
}

fn parse_run_id(id: &str) -> ApiResult<RunId> {
    RunId::parse(id).ok_or_else(|| ApiError::BadRequest(format!("Invalid run ID: {}", id)))
}
