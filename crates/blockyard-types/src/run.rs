//! Run job types
//!
//! A RunJob moves `pending → running → {succeeded, failed, stopped}`, with
//! `stopping` reachable from pending or running. At most one run per project
//! may be active (pending, running, or stopping) at a time.

use crate::{BuildId, ProjectId, RunId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Run job status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Pending,
    Running,
    Stopping,
    Stopped,
    Succeeded,
    Failed,
}

impl RunStatus {
    /// Pending, running, or stopping
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            RunStatus::Pending | RunStatus::Running | RunStatus::Stopping
        )
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_active()
    }
}

/// Origin of a log line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogStream {
    Stdout,
    Stderr,
    System,
}

/// One log line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub stream: LogStream,
    pub message: String,
}

impl LogEntry {
    pub fn new(stream: LogStream, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            stream,
            message: message.into(),
        }
    }

    pub fn system(message: impl Into<String>) -> Self {
        Self::new(LogStream::System, message)
    }
}

/// Workspace drift as seen by the last sync
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceStatus {
    /// Manifest build id the workspace was last synced to
    #[serde(default)]
    pub last_build_id: Option<String>,
    #[serde(default)]
    pub synced_at: Option<DateTime<Utc>>,
    /// Paths preserved because of local edits
    #[serde(default)]
    pub dirty_paths: Vec<String>,
}

/// One supervised server process
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunJob {
    pub id: RunId,
    pub project_id: ProjectId,

    /// Build job whose artifact seeded this run
    pub build_id: BuildId,
    pub artifact_path: PathBuf,

    pub status: RunStatus,

    /// Host port bound to the server port
    #[serde(default)]
    pub port: Option<u16>,

    /// Container name (or simulated handle name)
    #[serde(default)]
    pub container_name: Option<String>,

    pub workspace_path: PathBuf,

    #[serde(default)]
    pub workspace: WorkspaceStatus,

    /// Ordered log entries, append-only
    #[serde(default)]
    pub logs: Vec<LogEntry>,

    /// True while the process input stream is open
    #[serde(default)]
    pub console_available: bool,

    /// Whether the run fell back to the simulated server
    #[serde(default)]
    pub simulated: bool,

    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub exit_code: Option<i32>,
    #[serde(default)]
    pub error: Option<String>,
}

impl RunJob {
    /// Create a pending run
    pub fn new(
        project_id: ProjectId,
        build_id: BuildId,
        artifact_path: PathBuf,
        workspace_path: PathBuf,
        port: u16,
    ) -> Self {
        Self {
            id: RunId::generate(),
            project_id,
            build_id,
            artifact_path,
            status: RunStatus::Pending,
            port: Some(port),
            container_name: None,
            workspace_path,
            workspace: WorkspaceStatus::default(),
            logs: Vec::new(),
            console_available: false,
            simulated: false,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            exit_code: None,
            error: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    pub fn mark_running(&mut self) {
        self.status = RunStatus::Running;
        if self.started_at.is_none() {
            self.started_at = Some(Utc::now());
        }
    }

    /// Move to a terminal status and release handles
    pub fn finish(&mut self, status: RunStatus) {
        debug_assert!(status.is_terminal());
        self.status = status;
        self.finished_at = Some(Utc::now());
        self.console_available = false;
    }

    pub fn fail(&mut self, error: impl Into<String>) {
        self.error = Some(error.into());
        self.finish(RunStatus::Failed);
    }
}
