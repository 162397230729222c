//! Build job supervision
//!
//! Each enqueued build runs the pipeline as its own task. A failing build only
//! ever fails its own job, and history persistence errors are logged without
//! touching the in-memory job state.

use crate::error::{SupervisorError, SupervisorResult};
use crate::storage::{recover_builds, JobHistory, Storage};
use blockyard_build::BuildPipeline;
use blockyard_types::{BuildId, BuildJob, ProjectId};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{error, info, instrument, warn};

pub struct BuildSupervisor {
    storage: Arc<dyn Storage>,
    history: Arc<JobHistory>,
    pipeline: Arc<BuildPipeline>,
    tasks: Mutex<HashMap<BuildId, JoinHandle<()>>>,
}

impl BuildSupervisor {
    pub fn new(
        storage: Arc<dyn Storage>,
        history: Arc<JobHistory>,
        pipeline: Arc<BuildPipeline>,
    ) -> Arc<Self> {
        Arc::new(Self {
            storage,
            history,
            pipeline,
            tasks: Mutex::new(HashMap::new()),
        })
    }

    /// Reload persisted builds, failing any that were cut off mid-flight
    pub async fn restore(&self) -> SupervisorResult<usize> {
        let mut builds = self.history.load_builds().await;
        let recovered = recover_builds(&mut builds);
        let count = builds.len();
        for build in builds {
            self.storage.upsert_build(build).await?;
        }
        if recovered > 0 {
            warn!(recovered, "Builds interrupted by restart marked failed");
            self.persist().await;
        }
        info!(count, "Build history restored");
        Ok(count)
    }

    /// Validate the project, record a pending job, and start it.
    ///
    /// Validation failures are returned before any job exists.
    #[instrument(skip(self), fields(project_id = %project_id))]
    pub async fn enqueue(self: &Arc<Self>, project_id: &ProjectId) -> SupervisorResult<BuildJob> {
        let project = self
            .pipeline
            .projects()
            .get_project(project_id)
            .await
            .map_err(|e| SupervisorError::ProjectStore(e.to_string()))?
            .ok_or_else(|| SupervisorError::ProjectNotFound(project_id.clone()))?;
        project
            .validate()
            .map_err(|e| SupervisorError::Validation(e.to_string()))?;

        let job = BuildJob::new(project_id.clone());
        self.storage.upsert_build(job.clone()).await?;
        self.persist().await;
        info!(build_id = %job.id, "Build enqueued");

        let supervisor = Arc::clone(self);
        let build_id = job.id;
        // Held across the spawn so the task's own removal always comes after
        let mut tasks = self.tasks.lock().await;
        let handle = tokio::spawn(async move { supervisor.execute(build_id).await });
        tasks.insert(build_id, handle);

        Ok(job)
    }

    pub async fn get(&self, id: &BuildId) -> SupervisorResult<BuildJob> {
        self.storage
            .get_build(id)
            .await?
            .ok_or_else(|| SupervisorError::NotFound {
                kind: "build",
                id: id.to_string(),
            })
    }

    pub async fn list(&self, project_id: Option<&ProjectId>) -> SupervisorResult<Vec<BuildJob>> {
        let builds = match project_id {
            Some(project_id) => self.storage.list_builds_for_project(project_id).await?,
            None => self.storage.list_builds().await?,
        };
        Ok(builds)
    }

    /// Wait for a build's task to finish and return the final job
    pub async fn wait_for(&self, id: &BuildId) -> SupervisorResult<BuildJob> {
        let handle = self.tasks.lock().await.remove(id);
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!(build_id = %id, error = %e, "Build task panicked");
            }
        }
        self.get(id).await
    }

    #[instrument(skip(self), fields(build_id = %build_id))]
    async fn execute(self: Arc<Self>, build_id: BuildId) {
        let Some(mut job) = self.load(&build_id).await else {
            return;
        };

        job.mark_running();
        self.store(&job).await;

        match self.pipeline.execute(&job.project_id).await {
            Ok(outcome) => {
                if let Some(push_error) = &outcome.push_error {
                    warn!(error = %push_error, "Build succeeded but push failed");
                }
                info!(
                    manifest_build_id = %outcome.manifest_build_id,
                    artifact = %outcome.artifact_path.display(),
                    "Build succeeded"
                );
                job.mark_succeeded(outcome);
            }
            Err(e) => {
                error!(error = %e, "Build failed");
                job.mark_failed(e.to_string());
            }
        }

        self.store(&job).await;
        self.tasks.lock().await.remove(&build_id);
    }

    async fn load(&self, id: &BuildId) -> Option<BuildJob> {
        match self.storage.get_build(id).await {
            Ok(job) => job,
            Err(e) => {
                error!(build_id = %id, error = %e, "Failed to load build job");
                None
            }
        }
    }

    async fn store(&self, job: &BuildJob) {
        if let Err(e) = self.storage.upsert_build(job.clone()).await {
            error!(build_id = %job.id, error = %e, "Failed to store build job");
        }
        self.persist().await;
    }

    async fn persist(&self) {
        let storage = &self.storage;
        if let Err(e) = self.history.save_builds_with(|| storage.list_builds()).await {
            warn!(error = %e, "Failed to persist build history");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryStorage;
    use crate::testing::Fixture;
    use blockyard_types::{sha256_hex, BuildStatus};

    fn supervisor(f: &Fixture) -> Arc<BuildSupervisor> {
        BuildSupervisor::new(
            Arc::new(InMemoryStorage::new()),
            Arc::new(JobHistory::new(f.history_dir())),
            Arc::new(f.pipeline()),
        )
    }

    #[tokio::test]
    async fn test_build_succeeds_and_is_persisted() {
        let f = Fixture::new().await;
        let builds = supervisor(&f);

        let job = builds.enqueue(&ProjectId::new("lobby")).await.unwrap();
        assert_eq!(job.status, BuildStatus::Pending);

        let done = builds.wait_for(&job.id).await.unwrap();
        assert_eq!(done.status, BuildStatus::Succeeded);
        let artifact = done.artifact_path.clone().unwrap();
        let bytes = std::fs::read(&artifact).unwrap();
        assert_eq!(done.artifact_sha256.as_deref(), Some(sha256_hex(&bytes).as_str()));

        let history = JobHistory::new(f.history_dir()).load_builds().await;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].status, BuildStatus::Succeeded);
    }

    #[tokio::test]
    async fn test_concurrent_builds_all_land_in_history() {
        let f = Fixture::new().await;
        let builds = supervisor(&f);
        let project = ProjectId::new("lobby");

        let mut ids = Vec::new();
        for _ in 0..3 {
            ids.push(builds.enqueue(&project).await.unwrap().id);
        }
        for id in &ids {
            assert_eq!(builds.wait_for(id).await.unwrap().status, BuildStatus::Succeeded);
        }

        let history = JobHistory::new(f.history_dir()).load_builds().await;
        assert_eq!(history.len(), 3);
        assert!(history.iter().all(|b| b.status == BuildStatus::Succeeded));
    }

    #[tokio::test]
    async fn test_unknown_project_creates_no_job() {
        let f = Fixture::new().await;
        let builds = supervisor(&f);

        let err = builds.enqueue(&ProjectId::new("missing")).await.unwrap_err();
        assert!(matches!(err, SupervisorError::ProjectNotFound(_)));
        assert!(builds.list(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_pipeline_failure_fails_only_that_job() {
        let f = Fixture::new().await;
        std::fs::remove_file(f.project_root().join("templates/server.properties")).unwrap();
        let builds = supervisor(&f);

        let job = builds.enqueue(&ProjectId::new("lobby")).await.unwrap();
        let done = builds.wait_for(&job.id).await.unwrap();
        assert_eq!(done.status, BuildStatus::Failed);
        assert!(done.error.is_some());

        // The supervisor keeps accepting work
        let next = builds.enqueue(&ProjectId::new("lobby")).await.unwrap();
        assert_eq!(builds.wait_for(&next.id).await.unwrap().status, BuildStatus::Failed);
    }

    #[tokio::test]
    async fn test_restore_fails_interrupted_builds() {
        let f = Fixture::new().await;
        let history = JobHistory::new(f.history_dir());
        let mut running = BuildJob::new(ProjectId::new("lobby"));
        running.mark_running();
        history.save_builds(vec![running.clone()]).await.unwrap();

        let builds = supervisor(&f);
        assert_eq!(builds.restore().await.unwrap(), 1);
        let restored = builds.get(&running.id).await.unwrap();
        assert_eq!(restored.status, BuildStatus::Failed);
    }
}
