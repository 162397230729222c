//! Project store seam
//!
//! Projects are owned by an external store; the pipeline reads them and
//! writes back scanned inventory and resolved plugin metadata.

use crate::error::BuildResult;
use async_trait::async_trait;
use blockyard_types::{Project, ProjectId};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[async_trait]
pub trait ProjectStore: Send + Sync {
    /// Get a project by ID
    async fn get_project(&self, id: &ProjectId) -> BuildResult<Option<Project>>;

    /// List all projects
    async fn list_projects(&self) -> BuildResult<Vec<Project>>;

    /// Create or replace a project
    async fn save_project(&self, project: Project) -> BuildResult<()>;
}

/// In-memory project store for development and testing
#[derive(Debug, Default, Clone)]
pub struct InMemoryProjectStore {
    projects: Arc<RwLock<HashMap<ProjectId, Project>>>,
}

impl InMemoryProjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_projects(projects: impl IntoIterator<Item = Project>) -> Self {
        let map = projects.into_iter().map(|p| (p.id.clone(), p)).collect();
        Self {
            projects: Arc::new(RwLock::new(map)),
        }
    }
}

#[async_trait]
impl ProjectStore for InMemoryProjectStore {
    async fn get_project(&self, id: &ProjectId) -> BuildResult<Option<Project>> {
        let projects = self.projects.read().await;
        Ok(projects.get(id).cloned())
    }

    async fn list_projects(&self) -> BuildResult<Vec<Project>> {
        let projects = self.projects.read().await;
        let mut all: Vec<_> = projects.values().cloned().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(all)
    }

    async fn save_project(&self, project: Project) -> BuildResult<()> {
        let mut projects = self.projects.write().await;
        projects.insert(project.id.clone(), project);
        Ok(())
    }
}
