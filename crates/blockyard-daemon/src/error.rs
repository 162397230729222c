//! Error types for blockyard-daemon

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use blockyard_types::ProjectId;
use serde::Serialize;
use thiserror::Error;

/// Daemon-level errors
#[derive(Debug, Error)]
pub enum DaemonError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Server startup error
    #[error("Server error: {0}")]
    Server(String),

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Project loading error
    #[error("Project error: {0}")]
    Project(String),

    /// Job restore error
    #[error("Supervisor error: {0}")]
    Supervisor(#[from] SupervisorError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Storage-specific errors
#[derive(Debug, Error)]
pub enum StorageError {
    /// Item not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Conflict (e.g., already exists)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Invalid data
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// History file error
    #[error("History error: {0}")]
    History(String),
}

/// Server process runtime errors
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("failed to launch {binary}: {message}")]
    Spawn { binary: String, message: String },

    #[error("failed to stop {name}: {message}")]
    Stop { name: String, message: String },
}

/// Errors surfaced when enqueuing or controlling jobs
#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("project not found: {0}")]
    ProjectNotFound(ProjectId),

    #[error("invalid project: {0}")]
    Validation(String),

    #[error("project store error: {0}")]
    ProjectStore(String),

    #[error("project {0} already has an active run")]
    RunActive(ProjectId),

    #[error("project {0} has no successful build with an artifact")]
    NoSuccessfulBuild(ProjectId),

    #[error("no free port in {start}..={end}")]
    PortsExhausted { start: u16, end: u16 },

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("run {0} has no console attached")]
    ConsoleUnavailable(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// API-specific errors
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Bad request
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Conflict
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Resource temporarily unavailable
    #[error("Unavailable: {0}")]
    Unavailable(String),

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl From<SupervisorError> for ApiError {
    fn from(err: SupervisorError) -> Self {
        let message = err.to_string();
        match err {
            SupervisorError::ProjectNotFound(_) | SupervisorError::NotFound { .. } => {
                ApiError::NotFound(message)
            }
            SupervisorError::Validation(_) => ApiError::Validation(message),
            SupervisorError::RunActive(_)
            | SupervisorError::NoSuccessfulBuild(_)
            | SupervisorError::ConsoleUnavailable(_) => ApiError::Conflict(message),
            SupervisorError::PortsExhausted { .. } => ApiError::Unavailable(message),
            SupervisorError::ProjectStore(_) => ApiError::Internal(message),
            SupervisorError::Storage(e) => ApiError::Storage(e),
        }
    }
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ApiError::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
            ApiError::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION_ERROR"),
            ApiError::Unavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "UNAVAILABLE"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
            ApiError::Storage(StorageError::NotFound(_)) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ApiError::Storage(StorageError::Conflict(_)) => (StatusCode::CONFLICT, "CONFLICT"),
            ApiError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_ERROR"),
        };

        let body = ErrorResponse {
            error: self.to_string(),
            code: code.to_string(),
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for API operations
pub type ApiResult<T> = Result<T, ApiError>;

/// Result type alias for runtime operations
pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// Result type alias for supervisor operations
pub type SupervisorResult<T> = Result<T, SupervisorError>;

/// Result type alias for daemon operations
pub type DaemonResult<T> = Result<T, DaemonError>;
