//! In-memory storage implementation

use super::traits::*;
use crate::error::StorageError;
use async_trait::async_trait;
use blockyard_types::{BuildId, BuildJob, LogEntry, ProjectId, RunId, RunJob};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// In-memory job repository; history files provide durability
#[derive(Debug, Clone, Default)]
pub struct InMemoryStorage {
    builds: Arc<RwLock<HashMap<BuildId, BuildJob>>>,
    runs: Arc<RwLock<HashMap<RunId, RunJob>>>,
}

impl InMemoryStorage {
    /// Create a new in-memory storage
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BuildJobStorage for InMemoryStorage {
    async fn get_build(&self, id: &BuildId) -> StorageResult<Option<BuildJob>> {
        let builds = self.builds.read().await;
        Ok(builds.get(id).cloned())
    }

    async fn list_builds(&self) -> StorageResult<Vec<BuildJob>> {
        let builds = self.builds.read().await;
        let mut all: Vec<_> = builds.values().cloned().collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(all)
    }

    async fn list_builds_for_project(
        &self,
        project_id: &ProjectId,
    ) -> StorageResult<Vec<BuildJob>> {
        let mut builds = self.list_builds().await?;
        builds.retain(|b| &b.project_id == project_id);
        Ok(builds)
    }

    async fn upsert_build(&self, build: BuildJob) -> StorageResult<()> {
        let mut builds = self.builds.write().await;
        builds.insert(build.id, build);
        Ok(())
    }

    async fn latest_successful_build(
        &self,
        project_id: &ProjectId,
    ) -> StorageResult<Option<BuildJob>> {
        let builds = self.builds.read().await;
        Ok(builds
            .values()
            .filter(|b| &b.project_id == project_id && b.has_artifact())
            .max_by_key(|b| b.finished_at.unwrap_or(b.created_at))
            .cloned())
    }
}

#[async_trait]
impl RunJobStorage for InMemoryStorage {
    async fn get_run(&self, id: &RunId) -> StorageResult<Option<RunJob>> {
        let runs = self.runs.read().await;
        Ok(runs.get(id).cloned())
    }

    async fn list_runs(&self) -> StorageResult<Vec<RunJob>> {
        let runs = self.runs.read().await;
        let mut all: Vec<_> = runs.values().cloned().collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(all)
    }

    async fn list_runs_for_project(&self, project_id: &ProjectId) -> StorageResult<Vec<RunJob>> {
        let mut runs = self.list_runs().await?;
        runs.retain(|r| &r.project_id == project_id);
        Ok(runs)
    }

    async fn admit_run(&self, run: RunJob) -> StorageResult<()> {
        let mut runs = self.runs.write().await;
        if let Some(active) = runs
            .values()
            .find(|r| r.project_id == run.project_id && r.is_active())
        {
            return Err(StorageError::Conflict(format!(
                "project {} already has active run {}",
                run.project_id, active.id
            )));
        }
        runs.insert(run.id, run);
        Ok(())
    }

    async fn upsert_run(&self, run: RunJob) -> StorageResult<()> {
        let mut runs = self.runs.write().await;
        runs.insert(run.id, run);
        Ok(())
    }

    async fn update_run(&self, id: &RunId, update: RunUpdate) -> StorageResult<RunJob> {
        let mut runs = self.runs.write().await;
        let run = runs
            .get_mut(id)
            .ok_or_else(|| StorageError::NotFound(format!("run {}", id)))?;
        update(run);
        Ok(run.clone())
    }

    async fn append_run_log(&self, id: &RunId, entry: LogEntry) -> StorageResult<()> {
        let mut runs = self.runs.write().await;
        let run = runs
            .get_mut(id)
            .ok_or_else(|| StorageError::NotFound(format!("run {}", id)))?;
        run.logs.push(entry);
        Ok(())
    }
}
