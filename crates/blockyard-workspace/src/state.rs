//! Persisted workspace state, one JSON document per project

use crate::error::{WorkspaceError, WorkspaceResult};
use blockyard_types::{ProjectId, WorkspaceState};
use std::path::{Path, PathBuf};
use tracing::warn;

#[derive(Debug, Clone)]
pub struct WorkspaceStateStore {
    dir: PathBuf,
}

impl WorkspaceStateStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, project_id: &ProjectId) -> PathBuf {
        self.dir.join(format!("{}.json", project_id))
    }

    /// Load the state for a project.
    ///
    /// A missing document means the workspace was never synced. An unreadable
    /// one is logged and treated the same way, so the next sync rewrites
    /// everything rather than trusting a corrupt baseline.
    pub async fn load(&self, project_id: &ProjectId) -> WorkspaceResult<Option<WorkspaceState>> {
        let path = self.path_for(project_id);
        let raw = match tokio::fs::read(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_slice(&raw) {
            Ok(state) => Ok(Some(state)),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Discarding unreadable workspace state");
                Ok(None)
            }
        }
    }

    pub async fn save(&self, state: &WorkspaceState) -> WorkspaceResult<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.path_for(&state.project_id);
        let body = serde_json::to_vec_pretty(state).map_err(|e| WorkspaceError::State {
            path: path.clone(),
            message: e.to_string(),
        })?;
        write_atomic(&path, &body).await
    }
}

async fn write_atomic(path: &Path, body: &[u8]) -> WorkspaceResult<()> {
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, body).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}
