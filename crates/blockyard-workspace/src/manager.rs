//! Per-project workspace sync with persisted state
//!
//! Passes for the same project are serialised by an in-process lock. Nothing
//! stops an external editor from touching files during a pass.

use crate::error::WorkspaceResult;
use crate::reconciler::{SyncOutcome, WorkspaceReconciler};
use crate::state::WorkspaceStateStore;
use blockyard_types::ProjectId;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::instrument;

pub struct WorkspaceManager {
    root: PathBuf,
    reconciler: WorkspaceReconciler,
    states: WorkspaceStateStore,
    locks: Mutex<HashMap<ProjectId, Arc<Mutex<()>>>>,
}

impl WorkspaceManager {
    /// Workspaces live at `<root>/<project id>`
    pub fn new(root: impl Into<PathBuf>, states: WorkspaceStateStore) -> Self {
        Self {
            root: root.into(),
            reconciler: WorkspaceReconciler::new(),
            states,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn workspace_dir(&self, project_id: &ProjectId) -> PathBuf {
        self.root.join(project_id.as_str())
    }

    pub fn states(&self) -> &WorkspaceStateStore {
        &self.states
    }

    /// Sync a project's workspace to an artifact and persist the new state
    #[instrument(skip(self, artifact_path), fields(project_id = %project_id))]
    pub async fn sync_project(
        &self,
        project_id: &ProjectId,
        artifact_path: &Path,
        build_id: &str,
    ) -> WorkspaceResult<SyncOutcome> {
        let lock = self.lock_for(project_id).await;
        let _guard = lock.lock().await;

        let prior = self.states.load(project_id).await?;
        let outcome = self
            .reconciler
            .sync(
                &self.workspace_dir(project_id),
                artifact_path,
                prior.as_ref(),
                project_id,
                build_id,
            )
            .await?;
        self.states.save(&outcome.state).await?;
        Ok(outcome)
    }

    async fn lock_for(&self, project_id: &ProjectId) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(project_id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}
