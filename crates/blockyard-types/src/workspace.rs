//! Persisted workspace reconciliation state

use crate::ProjectId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// What the reconciler owns inside one project's workspace.
///
/// `baseline` maps workspace-relative paths to the SHA-256 last written or
/// adopted by the reconciler. `dirty` holds paths whose local content diverges
/// from both baseline and artifact and was therefore preserved. A dirty path
/// may keep its baseline entry so a later upstream change is still detected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceState {
    pub project_id: ProjectId,
    #[serde(default)]
    pub last_build_id: Option<String>,
    #[serde(default)]
    pub last_synced_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub baseline: BTreeMap<String, String>,
    #[serde(default)]
    pub dirty: BTreeSet<String>,
}

impl WorkspaceState {
    pub fn new(project_id: ProjectId) -> Self {
        Self {
            project_id,
            last_build_id: None,
            last_synced_at: None,
            baseline: BTreeMap::new(),
            dirty: BTreeSet::new(),
        }
    }

    pub fn dirty_paths(&self) -> Vec<String> {
        self.dirty.iter().cloned().collect()
    }
}
