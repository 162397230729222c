//! Asset scan for projects with an empty inventory
//!
//! Jars under `plugins/` become upload-path plugin references. Files under
//! `configs/` become config templates rendered to the same path with the
//! `configs/` prefix dropped.

use crate::error::{BuildError, BuildResult};
use blockyard_types::{ConfigRef, PluginSource, Project, ProjectPluginRef};
use std::path::Path;
use tracing::debug;
use walkdir::WalkDir;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssetScan {
    pub plugins: Vec<ProjectPluginRef>,
    pub configs: Vec<ConfigRef>,
}

impl AssetScan {
    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty() && self.configs.is_empty()
    }

    pub fn apply(self, project: &mut Project) {
        project.plugins = self.plugins;
        project.configs = self.configs;
    }
}

pub async fn scan_assets(project_root: &Path) -> BuildResult<AssetScan> {
    let mut scan = AssetScan::default();

    let mut jars = list_files(&project_root.join("plugins"), false).await?;
    jars.retain(|name| name.to_ascii_lowercase().ends_with(".jar"));
    for name in jars {
        let (id, version) = split_jar_name(&name);
        scan.plugins.push(
            ProjectPluginRef::new(id, version).with_source(PluginSource {
                upload_path: Some(format!("plugins/{}", name)),
                ..PluginSource::default()
            }),
        );
    }

    for rel in list_files(&project_root.join("configs"), true).await? {
        scan.configs.push(ConfigRef {
            template: format!("configs/{}", rel),
            path: rel,
        });
    }

    debug!(
        root = %project_root.display(),
        plugins = scan.plugins.len(),
        configs = scan.configs.len(),
        "Asset scan finished"
    );
    Ok(scan)
}

/// `LuckPerms-5.4.102.jar` → (`LuckPerms`, `5.4.102`); no version → `latest`
fn split_jar_name(file_name: &str) -> (String, String) {
    let stem = &file_name[..file_name.len() - ".jar".len()];
    let split = stem.char_indices().rev().find(|(i, c)| {
        *c == '-'
            && stem[i + 1..]
                .chars()
                .next()
                .map(|n| n.is_ascii_digit())
                .unwrap_or(false)
    });

    match split {
        Some((i, _)) if i > 0 => (stem[..i].to_string(), stem[i + 1..].to_string()),
        _ => (stem.to_string(), "latest".to_string()),
    }
}

/// Relative paths of regular files below `dir`, `/`-separated, in file-name
/// order at every level. A missing `dir` has no files.
pub(crate) async fn list_files(dir: &Path, recursive: bool) -> BuildResult<Vec<String>> {
    let dir = dir.to_path_buf();
    tokio::task::spawn_blocking(move || walk_files(&dir, recursive))
        .await
        .map_err(|e| BuildError::Task(e.to_string()))?
}

fn walk_files(dir: &Path, recursive: bool) -> BuildResult<Vec<String>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let walker = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(if recursive { usize::MAX } else { 1 })
        .sort_by_file_name();

    let mut out = Vec::new();
    for entry in walker {
        let entry = entry.map_err(std::io::Error::from)?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(rel) = entry.path().strip_prefix(dir) else {
            continue;
        };
        let rel: Vec<_> = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        out.push(rel.join("/"));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_jar_name() {
        assert_eq!(
            split_jar_name("LuckPerms-Bukkit-5.4.102.jar"),
            ("LuckPerms-Bukkit".to_string(), "5.4.102".to_string())
        );
        assert_eq!(
            split_jar_name("worldedit.jar"),
            ("worldedit".to_string(), "latest".to_string())
        );
    }

    #[tokio::test]
    async fn test_scan_assets() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("plugins")).unwrap();
        std::fs::create_dir_all(root.join("configs/plugins/Essentials")).unwrap();
        std::fs::write(root.join("plugins/Chunky-1.3.jar"), b"jar").unwrap();
        std::fs::write(root.join("plugins/notes.txt"), b"skip").unwrap();
        std::fs::write(root.join("configs/server.properties"), b"motd=${name}").unwrap();
        std::fs::write(root.join("configs/plugins/Essentials/config.yml"), b"x").unwrap();

        let scan = scan_assets(root).await.unwrap();

        assert_eq!(scan.plugins.len(), 1);
        assert_eq!(scan.plugins[0].id, "Chunky");
        assert_eq!(scan.plugins[0].version, "1.3");
        let paths: Vec<_> = scan.configs.iter().map(|c| c.path.as_str()).collect();
        assert_eq!(paths, vec!["plugins/Essentials/config.yml", "server.properties"]);
        assert_eq!(scan.configs[1].template, "configs/server.properties");
    }

    #[tokio::test]
    async fn test_list_files_orders_and_filters() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("b/nested")).unwrap();
        std::fs::create_dir_all(root.join("a")).unwrap();
        std::fs::write(root.join("z.yml"), b"z").unwrap();
        std::fs::write(root.join("b/nested/deep.yml"), b"d").unwrap();
        std::fs::write(root.join("a/first.yml"), b"f").unwrap();

        assert_eq!(
            list_files(root, true).await.unwrap(),
            vec!["a/first.yml", "b/nested/deep.yml", "z.yml"]
        );
        assert_eq!(list_files(root, false).await.unwrap(), vec!["z.yml"]);
        assert!(list_files(&root.join("missing"), true).await.unwrap().is_empty());
    }
}
