//! Workspace errors

use std::path::PathBuf;
use thiserror::Error;

pub type WorkspaceResult<T> = Result<T, WorkspaceError>;

#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("artifact not found: {}", .0.display())]
    ArtifactNotFound(PathBuf),

    #[error("invalid artifact {}: {message}", .path.display())]
    InvalidArtifact { path: PathBuf, message: String },

    /// Entry name that would escape the workspace
    #[error("unsafe artifact entry '{0}'")]
    UnsafeEntry(String),

    #[error("workspace state {}: {message}", .path.display())]
    State { path: PathBuf, message: String },

    #[error("reconciliation task failed: {0}")]
    Task(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
