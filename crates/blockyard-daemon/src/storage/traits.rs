//! Storage trait definitions

use crate::error::StorageError;
use async_trait::async_trait;
use blockyard_types::{BuildId, BuildJob, LogEntry, ProjectId, RunId, RunJob};

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// In-place mutation applied under the storage lock
pub type RunUpdate = Box<dyn FnOnce(&mut RunJob) + Send>;

/// Combined storage trait
pub trait Storage: BuildJobStorage + RunJobStorage + Send + Sync {}

impl<T> Storage for T where T: BuildJobStorage + RunJobStorage + Send + Sync {}

/// Storage for build jobs
#[async_trait]
pub trait BuildJobStorage: Send + Sync {
    /// Get a build by ID
    async fn get_build(&self, id: &BuildId) -> StorageResult<Option<BuildJob>>;

    /// List all builds, newest first
    async fn list_builds(&self) -> StorageResult<Vec<BuildJob>>;

    /// List builds for a project, newest first
    async fn list_builds_for_project(&self, project_id: &ProjectId)
        -> StorageResult<Vec<BuildJob>>;

    /// Create or update a build
    async fn upsert_build(&self, build: BuildJob) -> StorageResult<()>;

    /// Most recent succeeded build carrying an artifact
    async fn latest_successful_build(
        &self,
        project_id: &ProjectId,
    ) -> StorageResult<Option<BuildJob>>;
}

/// Storage for run jobs
#[async_trait]
pub trait RunJobStorage: Send + Sync {
    /// Get a run by ID
    async fn get_run(&self, id: &RunId) -> StorageResult<Option<RunJob>>;

    /// List all runs, newest first
    async fn list_runs(&self) -> StorageResult<Vec<RunJob>>;

    /// List runs for a project, newest first
    async fn list_runs_for_project(&self, project_id: &ProjectId) -> StorageResult<Vec<RunJob>>;

    /// Insert a new run unless its project already has an active one.
    ///
    /// The check and the insert happen under one lock.
    async fn admit_run(&self, run: RunJob) -> StorageResult<()>;

    /// Create or replace a run without the exclusivity check
    async fn upsert_run(&self, run: RunJob) -> StorageResult<()>;

    /// Apply `update` to a stored run and return the result
    async fn update_run(&self, id: &RunId, update: RunUpdate) -> StorageResult<RunJob>;

    /// Append one log entry, preserving call order
    async fn append_run_log(&self, id: &RunId, entry: LogEntry) -> StorageResult<()>;
}
