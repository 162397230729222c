//! Build errors

use blockyard_resolver::ResolveError;
use blockyard_types::{ProjectId, ProjectValidationError};
use std::path::PathBuf;
use thiserror::Error;

pub type BuildResult<T> = Result<T, BuildError>;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("project not found: {0}")]
    ProjectNotFound(ProjectId),

    #[error("invalid project: {0}")]
    Validation(#[from] ProjectValidationError),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error("config template not found: {}", .0.display())]
    TemplateNotFound(PathBuf),

    #[error("failed to render {path}: {message}")]
    Render { path: String, message: String },

    #[error("manifest error: {0}")]
    Manifest(String),

    #[error("archive error: {0}")]
    Archive(String),

    #[error("project store error: {0}")]
    Store(String),

    #[error("build task failed: {0}")]
    Task(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<zip::result::ZipError> for BuildError {
    fn from(err: zip::result::ZipError) -> Self {
        BuildError::Archive(err.to_string())
    }
}
