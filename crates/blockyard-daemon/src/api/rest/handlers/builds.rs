//! Build job handlers

use crate::api::rest::state::AppState;
use crate::error::{ApiError, ApiResult};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use blockyard_types::{BuildId, BuildJob, ProjectId};

/// List all builds, newest first
pub async fn list_builds(State(state): State<AppState>) -> ApiResult<Json<Vec<BuildJob>>> {
    Ok(Json(state.builds.list(None).await?))
}

/// List a project's builds, newest first
pub async fn list_project_builds(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
) -> ApiResult<Json<Vec<BuildJob>>> {
    let project_id = ProjectId::new(project_id);
    Ok(Json(state.builds.list(Some(&project_id)).await?))
}

/// Get a specific build
pub async fn get_build(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<BuildJob>> {
    let build_id = parse_build_id(&id)?;
    Ok(Json(state.builds.get(&build_id).await?))
}

/// Enqueue a build; the job is returned while still pending
pub async fn create_build(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
) -> ApiResult<(StatusCode, Json<BuildJob>)> {
    let project_id = ProjectId::new(project_id);
    let job = state.builds.enqueue(&project_id).await?;

    tracing::info!(
        build_id = %job.id,
        project_id = %project_id,
        "Build requested"
    );

    Ok((StatusCode::ACCEPTED, Json(job)))
}

fn parse_build_id(id: &str) -> ApiResult<BuildId> {
    BuildId::parse(id).ok_or_else(|| ApiError::BadRequest(format!("Invalid build ID: {}", id)))
}
