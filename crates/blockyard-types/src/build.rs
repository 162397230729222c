//! Build job types
//!
//! A BuildJob moves `pending → running → {succeeded, failed}` and is immutable
//! once terminal.

use crate::{BuildId, ProjectId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Build job status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl BuildStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, BuildStatus::Succeeded | BuildStatus::Failed)
    }
}

/// One execution of the build pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildJob {
    pub id: BuildId,
    pub project_id: ProjectId,
    pub status: BuildStatus,

    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,

    /// Content-derived build id written into the manifest
    #[serde(default)]
    pub manifest_build_id: Option<String>,
    #[serde(default)]
    pub manifest_path: Option<PathBuf>,
    #[serde(default)]
    pub artifact_path: Option<PathBuf>,
    /// SHA-256 of exactly the bytes written to `artifact_path`
    #[serde(default)]
    pub artifact_sha256: Option<String>,
    #[serde(default)]
    pub artifact_size: Option<u64>,

    /// Commit created by the repository push, if any
    #[serde(default)]
    pub commit: Option<String>,

    /// Terminal error message for failed builds
    #[serde(default)]
    pub error: Option<String>,

    /// Push failure, reported independently of the build outcome
    #[serde(default)]
    pub push_error: Option<String>,
}

/// Everything a successful pipeline run produces
#[derive(Debug, Clone, PartialEq)]
pub struct BuildOutcome {
    pub manifest_build_id: String,
    pub manifest_path: PathBuf,
    pub artifact_path: PathBuf,
    pub artifact_sha256: String,
    pub artifact_size: u64,
    pub commit: Option<String>,
    pub push_error: Option<String>,
}

impl BuildJob {
    /// Create a pending job for a project
    pub fn new(project_id: ProjectId) -> Self {
        Self {
            id: BuildId::generate(),
            project_id,
            status: BuildStatus::Pending,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            manifest_build_id: None,
            manifest_path: None,
            artifact_path: None,
            artifact_sha256: None,
            artifact_size: None,
            commit: None,
            error: None,
            push_error: None,
        }
    }

    pub fn mark_running(&mut self) {
        self.status = BuildStatus::Running;
        self.started_at = Some(Utc::now());
    }

    pub fn mark_succeeded(&mut self, outcome: BuildOutcome) {
        self.status = BuildStatus::Succeeded;
        self.finished_at = Some(Utc::now());
        self.manifest_build_id = Some(outcome.manifest_build_id);
        self.manifest_path = Some(outcome.manifest_path);
        self.artifact_path = Some(outcome.artifact_path);
        self.artifact_sha256 = Some(outcome.artifact_sha256);
        self.artifact_size = Some(outcome.artifact_size);
        self.commit = outcome.commit;
        self.push_error = outcome.push_error;
        self.error = None;
    }

    pub fn mark_failed(&mut self, error: impl Into<String>) {
        self.status = BuildStatus::Failed;
        self.finished_at = Some(Utc::now());
        self.error = Some(error.into());
    }

    /// True when this job can seed a run
    pub fn has_artifact(&self) -> bool {
        self.status == BuildStatus::Succeeded && self.artifact_path.is_some()
    }
}
