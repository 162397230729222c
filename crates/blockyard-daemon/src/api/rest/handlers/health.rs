//! Health and status handlers

use crate::api::rest::state::AppState;
use crate::error::{ApiError, ApiResult};
use axum::{extract::State, Json};
use blockyard_types::{BuildStatus, RunJob};
use serde::Serialize;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthCheckResponse {
    pub status: String,
    pub version: String,
    pub uptime: String,
}

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthCheckResponse> {
    Json(HealthCheckResponse {
        status: "healthy".to_string(),
        version: state.version.clone(),
        uptime: state.uptime(),
    })
}

/// Daemon status response
#[derive(Debug, Serialize)]
pub struct DaemonStatusResponse {
    pub status: String,
    pub version: String,
    pub uptime: String,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub stats: DaemonStats,
}

#[derive(Debug, Serialize)]
pub struct DaemonStats {
    pub projects: usize,
    pub builds: usize,
    pub builds_in_flight: usize,
    pub runs: usize,
    pub active_runs: usize,
}

/// Daemon status endpoint
pub async fn daemon_status(State(state): State<AppState>) -> ApiResult<Json<DaemonStatusResponse>> {
    let projects = state
        .projects
        .list_projects()
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    let builds = state.builds.list(None).await?;
    let runs = state.runs.list(None).await?;

    Ok(Json(DaemonStatusResponse {
        status: "healthy".to_string(),
        version: state.version.clone(),
        uptime: state.uptime(),
        started_at: state.started_at,
        stats: DaemonStats {
            projects: projects.len(),
            builds: builds.len(),
            builds_in_flight: builds
                .iter()
                .filter(|b| matches!(b.status, BuildStatus::Pending | BuildStatus::Running))
                .count(),
            runs: runs.len(),
            active_runs: runs.iter().filter(|r| RunJob::is_active(r)).count(),
        },
    }))
}
