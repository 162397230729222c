//! Project definitions on disk
//!
//! Each directory under the projects root holding a `project.yaml` (or
//! `project.yml`) is one project; the directory becomes the project root.

use crate::error::{DaemonError, DaemonResult};
use blockyard_types::Project;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

const DEFINITION_FILES: [&str; 2] = ["project.yaml", "project.yml"];

/// Load every valid project under `dir`. Invalid ones are skipped with a warning.
pub async fn load_projects(dir: &Path) -> DaemonResult<Vec<Project>> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            info!(dir = %dir.display(), "Projects directory missing, starting with none");
            return Ok(Vec::new());
        }
        Err(e) => return Err(DaemonError::Io(e)),
    };

    let mut projects = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_dir() {
            continue;
        }
        let root = entry.path();
        let Some(definition) = find_definition(&root).await else {
            continue;
        };
        match load_project(&definition, root).await {
            Ok(project) => projects.push(project),
            Err(e) => warn!(path = %definition.display(), error = %e, "Skipping project"),
        }
    }

    projects.sort_by(|a, b| a.id.cmp(&b.id));
    info!(count = projects.len(), "Projects loaded");
    Ok(projects)
}

async fn find_definition(root: &Path) -> Option<PathBuf> {
    for name in DEFINITION_FILES {
        let candidate = root.join(name);
        if tokio::fs::metadata(&candidate).await.is_ok() {
            return Some(candidate);
        }
    }
    None
}

async fn load_project(path: &Path, root: PathBuf) -> DaemonResult<Project> {
    let raw = tokio::fs::read_to_string(path).await?;
    let mut project: Project =
        serde_yaml::from_str(&raw).map_err(|e| DaemonError::Project(e.to_string()))?;
    project
        .validate()
        .map_err(|e| DaemonError::Project(e.to_string()))?;
    project.root = root;
    Ok(project)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_loads_valid_and_skips_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let lobby = dir.path().join("lobby");
        std::fs::create_dir_all(&lobby).unwrap();
        std::fs::write(
            lobby.join("project.yaml"),
            "id: lobby\nminecraftVersion: 1.20.4\nloader: paper\nvariables:\n  motd: Hello\n",
        )
        .unwrap();

        let broken = dir.path().join("broken");
        std::fs::create_dir_all(&broken).unwrap();
        std::fs::write(broken.join("project.yml"), "id: broken\nsurprise: true\n").unwrap();

        std::fs::create_dir_all(dir.path().join("empty")).unwrap();

        let projects = load_projects(dir.path()).await.unwrap();
        assert_eq!(projects.len(), 1);
        assert_eq!(projects[0].id.as_str(), "lobby");
        assert_eq!(projects[0].root, lobby);
        assert_eq!(projects[0].variables["motd"], "Hello");
    }

    #[tokio::test]
    async fn test_missing_directory_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let projects = load_projects(&dir.path().join("nope")).await.unwrap();
        assert!(projects.is_empty());
    }
}
