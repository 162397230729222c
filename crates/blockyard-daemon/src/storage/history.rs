//! Job history documents
//!
//! Builds and runs are persisted as `{"builds": [...]}` and `{"runs": [...]}`,
//! each rewritten in full on every change and reloaded at startup. Reloading
//! tolerates missing and unreadable files.

use super::traits::StorageResult;
use crate::error::StorageError;
use blockyard_types::{BuildJob, LogEntry, RunJob, RunStatus};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::future::Future;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{info, warn};

#[derive(Debug, Default, Serialize, Deserialize)]
struct BuildHistory {
    #[serde(default)]
    builds: Vec<BuildJob>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct RunHistory {
    #[serde(default)]
    runs: Vec<RunJob>,
}

#[derive(Debug)]
pub struct JobHistory {
    builds_path: PathBuf,
    runs_path: PathBuf,
    // Snapshot and write happen under one lock, so the last write carries the newest snapshot
    builds_lock: Mutex<()>,
    runs_lock: Mutex<()>,
}

impl JobHistory {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            builds_path: dir.join("builds.json"),
            runs_path: dir.join("runs.json"),
            builds_lock: Mutex::new(()),
            runs_lock: Mutex::new(()),
        }
    }

    pub async fn load_builds(&self) -> Vec<BuildJob> {
        load_document::<BuildHistory>(&self.builds_path)
            .await
            .builds
    }

    pub async fn load_runs(&self) -> Vec<RunJob> {
        load_document::<RunHistory>(&self.runs_path).await.runs
    }

    pub async fn save_builds(&self, builds: Vec<BuildJob>) -> StorageResult<()> {
        self.save_builds_with(|| async { Ok(builds) }).await
    }

    pub async fn save_runs(&self, runs: Vec<RunJob>) -> StorageResult<()> {
        self.save_runs_with(|| async { Ok(runs) }).await
    }

    /// Rewrite `builds.json` from a snapshot taken while the file is locked
    pub async fn save_builds_with<F, Fut>(&self, snapshot: F) -> StorageResult<()>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = StorageResult<Vec<BuildJob>>>,
    {
        let _guard = self.builds_lock.lock().await;
        let builds = snapshot().await?;
        write_document(&self.builds_path, &BuildHistory { builds }).await
    }

    /// Rewrite `runs.json` from a snapshot taken while the file is locked
    pub async fn save_runs_with<F, Fut>(&self, snapshot: F) -> StorageResult<()>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = StorageResult<Vec<RunJob>>>,
    {
        let _guard = self.runs_lock.lock().await;
        let runs = snapshot().await?;
        write_document(&self.runs_path, &RunHistory { runs }).await
    }
}

/// Builds that were in flight when the process died can never finish
pub fn recover_builds(builds: &mut [BuildJob]) -> usize {
    let mut recovered = 0;
    for build in builds.iter_mut().filter(|b| !b.status.is_terminal()) {
        build.mark_failed("interrupted by daemon restart");
        recovered += 1;
    }
    recovered
}

/// Runs that were active when the process died lost their process
pub fn recover_runs(runs: &mut [RunJob]) -> usize {
    let mut recovered = 0;
    for run in runs.iter_mut().filter(|r| r.is_active()) {
        run.logs.push(LogEntry::system(
            "Daemon restarted; server process is no longer supervised",
        ));
        run.finish(RunStatus::Stopped);
        recovered += 1;
    }
    recovered
}

async fn load_document<T: DeserializeOwned + Default>(path: &Path) -> T {
    let raw = match tokio::fs::read(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return T::default(),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Job history unreadable, starting empty");
            return T::default();
        }
    };

    match serde_json::from_slice(&raw) {
        Ok(doc) => {
            info!(path = %path.display(), "Job history loaded");
            doc
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Job history corrupt, starting empty");
            T::default()
        }
    }
}

async fn write_document<T: Serialize>(path: &Path, doc: &T) -> StorageResult<()> {
    let body =
        serde_json::to_vec_pretty(doc).map_err(|e| StorageError::History(e.to_string()))?;
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| StorageError::History(e.to_string()))?;
    }
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, body)
        .await
        .map_err(|e| StorageError::History(e.to_string()))?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| StorageError::History(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use blockyard_types::{BuildId, BuildStatus, ProjectId};

    #[tokio::test]
    async fn test_round_trip_and_recovery() {
        let dir = tempfile::tempdir().unwrap();
        let history = JobHistory::new(dir.path());

        let mut running = BuildJob::new(ProjectId::new("lobby"));
        running.mark_running();
        history.save_builds(vec![running]).await.unwrap();

        let mut run = RunJob::new(
            ProjectId::new("lobby"),
            BuildId::generate(),
            PathBuf::from("a.zip"),
            PathBuf::from("ws"),
            25565,
        );
        run.mark_running();
        history.save_runs(vec![run]).await.unwrap();

        let mut builds = history.load_builds().await;
        let mut runs = history.load_runs().await;
        assert_eq!(recover_builds(&mut builds), 1);
        assert_eq!(recover_runs(&mut runs), 1);

        assert_eq!(builds[0].status, BuildStatus::Failed);
        assert_eq!(runs[0].status, RunStatus::Stopped);
        assert!(runs[0].logs.last().unwrap().message.contains("restarted"));
    }

    #[tokio::test]
    async fn test_missing_and_corrupt_files_are_tolerated() {
        let dir = tempfile::tempdir().unwrap();
        let history = JobHistory::new(dir.path());
        assert!(history.load_builds().await.is_empty());

        tokio::fs::write(dir.path().join("runs.json"), b"{\"runs\": [oops")
            .await
            .unwrap();
        assert!(history.load_runs().await.is_empty());
    }

    #[tokio::test]
    async fn test_slow_snapshot_cannot_overwrite_newer_one() {
        let dir = tempfile::tempdir().unwrap();
        let history = std::sync::Arc::new(JobHistory::new(dir.path()));

        let mut running = BuildJob::new(ProjectId::new("lobby"));
        running.mark_running();
        let mut finished = running.clone();
        finished.mark_failed("boom");

        // The first writer snapshots the running job, then stalls before writing
        let slow = {
            let history = history.clone();
            let running = running.clone();
            tokio::spawn(async move {
                history
                    .save_builds_with(|| async move {
                        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
                        Ok(vec![running])
                    })
                    .await
            })
        };
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;

        history.save_builds(vec![finished]).await.unwrap();
        slow.await.unwrap().unwrap();

        let builds = history.load_builds().await;
        assert_eq!(builds[0].status, BuildStatus::Failed);
    }

    #[tokio::test]
    async fn test_document_shape() {
        let dir = tempfile::tempdir().unwrap();
        let history = JobHistory::new(dir.path());
        history
            .save_builds(vec![BuildJob::new(ProjectId::new("lobby"))])
            .await
            .unwrap();

        let raw = std::fs::read(dir.path().join("builds.json")).unwrap();
        let doc: serde_json::Value = serde_json::from_slice(&raw).unwrap();
        assert_eq!(doc["builds"][0]["projectId"], "lobby");
    }
}
