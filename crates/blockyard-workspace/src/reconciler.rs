//! Baseline-hash reconciliation of an artifact into a workspace

use crate::error::{WorkspaceError, WorkspaceResult};
use blockyard_types::{is_relative_path, sha256_hex, ProjectId, WorkspaceState};
use chrono::Utc;
use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// What one sync did, path by path
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Paths physically written from the artifact
    pub written: Vec<String>,
    /// Paths whose on-disk content matched the artifact and became baseline
    pub adopted: Vec<String>,
    /// Paths kept as they were because they already matched
    pub unchanged: Vec<String>,
    /// Local edits left in place
    pub preserved: Vec<String>,
    /// Tracked paths removed because the artifact no longer ships them
    pub deleted: Vec<String>,
}

impl SyncReport {
    pub fn write_count(&self) -> usize {
        self.written.len() + self.deleted.len()
    }
}

#[derive(Debug, Clone)]
pub struct SyncOutcome {
    pub state: WorkspaceState,
    pub report: SyncReport,
}

impl SyncOutcome {
    pub fn dirty_paths(&self) -> Vec<String> {
        self.state.dirty_paths()
    }
}

/// Stateless reconciler; all state flows through [`WorkspaceState`]
#[derive(Debug, Clone, Copy, Default)]
pub struct WorkspaceReconciler;

impl WorkspaceReconciler {
    pub fn new() -> Self {
        Self
    }

    /// Merge `artifact_path` into `workspace_dir` and return the new state.
    ///
    /// Runs on the blocking pool since archive reads and file writes are
    /// synchronous.
    pub async fn sync(
        &self,
        workspace_dir: &Path,
        artifact_path: &Path,
        prior: Option<&WorkspaceState>,
        project_id: &ProjectId,
        build_id: &str,
    ) -> WorkspaceResult<SyncOutcome> {
        let workspace_dir = workspace_dir.to_path_buf();
        let artifact_path = artifact_path.to_path_buf();
        let prior = prior.cloned();
        let project_id = project_id.clone();
        let build_id = build_id.to_string();

        tokio::task::spawn_blocking(move || {
            sync_blocking(
                &workspace_dir,
                &artifact_path,
                prior.as_ref(),
                project_id,
                &build_id,
            )
        })
        .await
        .map_err(|e| WorkspaceError::Task(e.to_string()))?
    }
}

fn sync_blocking(
    workspace_dir: &Path,
    artifact_path: &Path,
    prior: Option<&WorkspaceState>,
    project_id: ProjectId,
    build_id: &str,
) -> WorkspaceResult<SyncOutcome> {
    let file = match File::open(artifact_path) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(WorkspaceError::ArtifactNotFound(artifact_path.to_path_buf()))
        }
        Err(e) => return Err(e.into()),
    };
    let mut archive = zip::ZipArchive::new(file).map_err(|e| invalid(artifact_path, e))?;

    fs::create_dir_all(workspace_dir)?;

    let first_sync = prior.is_none();
    let mut state = prior
        .cloned()
        .unwrap_or_else(|| WorkspaceState::new(project_id));
    let mut report = SyncReport::default();
    let mut shipped = BTreeSet::new();

    for index in 0..archive.len() {
        let mut entry = archive
            .by_index(index)
            .map_err(|e| invalid(artifact_path, e))?;
        if entry.is_dir() {
            continue;
        }

        let rel = entry.name().to_string();
        if !is_relative_path(&rel) || entry.enclosed_name().is_none() {
            return Err(WorkspaceError::UnsafeEntry(rel));
        }

        let mut bytes = Vec::with_capacity(entry.size() as usize);
        entry.read_to_end(&mut bytes)?;
        let artifact_hash = sha256_hex(&bytes);
        let target = workspace_dir.join(&rel);

        shipped.insert(rel.clone());
        apply_entry(
            &mut state,
            &mut report,
            first_sync,
            &rel,
            &target,
            &bytes,
            &artifact_hash,
        )?;
    }

    remove_unshipped(workspace_dir, &mut state, &mut report, &shipped)?;

    state.last_build_id = Some(build_id.to_string());
    state.last_synced_at = Some(Utc::now());

    info!(
        workspace = %workspace_dir.display(),
        build_id,
        written = report.written.len(),
        adopted = report.adopted.len(),
        preserved = report.preserved.len(),
        deleted = report.deleted.len(),
        "Workspace synced"
    );

    Ok(SyncOutcome { state, report })
}

fn apply_entry(
    state: &mut WorkspaceState,
    report: &mut SyncReport,
    first_sync: bool,
    rel: &str,
    target: &Path,
    bytes: &[u8],
    artifact_hash: &str,
) -> WorkspaceResult<()> {
    let disk_hash = match disk_hash(target)? {
        OnDisk::Other => {
            warn!(path = rel, "Workspace path is not a regular file, leaving it in place");
            state.dirty.insert(rel.to_string());
            report.preserved.push(rel.to_string());
            return Ok(());
        }
        OnDisk::File(_) if first_sync => None,
        OnDisk::File(hash) => Some(hash),
        OnDisk::Absent => None,
    };

    let Some(disk_hash) = disk_hash else {
        write_file(target, bytes)?;
        record(state, rel, artifact_hash);
        report.written.push(rel.to_string());
        return Ok(());
    };

    let baseline = state.baseline.get(rel).cloned();
    let disk_matches_artifact = disk_hash == artifact_hash;

    match baseline {
        // Upstream changed: the artifact wins over local edits
        Some(baseline) if baseline != artifact_hash => {
            write_file(target, bytes)?;
            record(state, rel, artifact_hash);
            report.written.push(rel.to_string());
        }
        Some(_) if disk_matches_artifact => {
            state.dirty.remove(rel);
            report.unchanged.push(rel.to_string());
        }
        None if disk_matches_artifact => {
            record(state, rel, artifact_hash);
            report.adopted.push(rel.to_string());
        }
        _ => {
            debug!(path = rel, "Preserving local edit");
            state.dirty.insert(rel.to_string());
            report.preserved.push(rel.to_string());
        }
    }

    Ok(())
}

fn remove_unshipped(
    workspace_dir: &Path,
    state: &mut WorkspaceState,
    report: &mut SyncReport,
    shipped: &BTreeSet<String>,
) -> WorkspaceResult<()> {
    let stale: Vec<String> = state
        .baseline
        .keys()
        .filter(|path| !shipped.contains(*path))
        .cloned()
        .collect();

    for rel in stale {
        let target = workspace_dir.join(&rel);
        match fs::symlink_metadata(&target) {
            Ok(meta) if meta.is_dir() => {
                warn!(path = %rel, "Tracked path is now a directory, leaving it in place");
            }
            Ok(_) => {
                fs::remove_file(&target)?;
                prune_empty_parents(workspace_dir, &target);
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        state.baseline.remove(&rel);
        state.dirty.remove(&rel);
        report.deleted.push(rel);
    }

    // Untracked local files the artifact stopped shipping are not ours to delete
    state.dirty.retain(|path| shipped.contains(path));
    Ok(())
}

fn record(state: &mut WorkspaceState, rel: &str, hash: &str) {
    state.baseline.insert(rel.to_string(), hash.to_string());
    state.dirty.remove(rel);
}

/// What currently sits at an artifact path
enum OnDisk {
    Absent,
    File(String),
    /// Anything that is not a regular file
    Other,
}

fn disk_hash(path: &Path) -> WorkspaceResult<OnDisk> {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_file() => Ok(OnDisk::File(sha256_hex(&fs::read(path)?))),
        Ok(_) => Ok(OnDisk::Other),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(OnDisk::Absent),
        Err(e) => Err(e.into()),
    }
}

fn write_file(path: &Path, bytes: &[u8]) -> WorkspaceResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, bytes)?;
    Ok(())
}

fn prune_empty_parents(root: &Path, removed: &Path) {
    let mut dir: Option<PathBuf> = removed.parent().map(Path::to_path_buf);
    while let Some(current) = dir {
        if current == root || !current.starts_with(root) {
            break;
        }
        if fs::remove_dir(&current).is_err() {
            break;
        }
        dir = current.parent().map(Path::to_path_buf);
    }
}

fn invalid(path: &Path, error: zip::result::ZipError) -> WorkspaceError {
    WorkspaceError::InvalidArtifact {
        path: path.to_path_buf(),
        message: error.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    fn artifact(dir: &Path, name: &str, entries: &[(&str, &[u8])]) -> PathBuf {
        let path = dir.join(name);
        let mut writer = zip::ZipWriter::new(File::create(&path).unwrap());
        for (entry, bytes) in entries {
            writer
                .start_file(*entry, SimpleFileOptions::default())
                .unwrap();
            writer.write_all(bytes).unwrap();
        }
        writer.finish().unwrap();
        path
    }

    async fn sync(
        workspace: &Path,
        artifact: &Path,
        prior: Option<&WorkspaceState>,
    ) -> SyncOutcome {
        WorkspaceReconciler::new()
            .sync(workspace, artifact, prior, &ProjectId::new("lobby"), "b1")
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_first_sync_writes_everything() {
        let dir = tempfile::tempdir().unwrap();
        let workspace = dir.path().join("ws");
        fs::create_dir_all(&workspace).unwrap();
        fs::write(workspace.join("server.properties"), b"local").unwrap();

        let zip = artifact(
            dir.path(),
            "a.zip",
            &[("server.properties", b"shipped"), ("plugins/P.jar", b"jar")],
        );
        let outcome = sync(&workspace, &zip, None).await;

        assert_eq!(outcome.report.written.len(), 2);
        assert_eq!(fs::read(workspace.join("server.properties")).unwrap(), b"shipped");
        assert_eq!(outcome.state.baseline.len(), 2);
        assert!(outcome.state.dirty.is_empty());
        assert_eq!(outcome.state.last_build_id.as_deref(), Some("b1"));
    }

    #[tokio::test]
    async fn test_directory_at_artifact_path_is_left_alone() {
        let dir = tempfile::tempdir().unwrap();
        let workspace = dir.path().join("ws");
        fs::create_dir_all(workspace.join("plugins/P.jar/data")).unwrap();
        let zip = artifact(
            dir.path(),
            "a.zip",
            &[("a.yml", b"a"), ("plugins/P.jar", b"jar")],
        );

        let first = sync(&workspace, &zip, None).await;
        assert_eq!(first.report.written, vec!["a.yml".to_string()]);
        assert_eq!(first.report.preserved, vec!["plugins/P.jar".to_string()]);
        assert_eq!(first.dirty_paths(), vec!["plugins/P.jar".to_string()]);
        assert!(workspace.join("plugins/P.jar/data").is_dir());

        let second = sync(&workspace, &zip, Some(&first.state)).await;
        assert_eq!(second.dirty_paths(), vec!["plugins/P.jar".to_string()]);
        assert_eq!(second.report.unchanged, vec!["a.yml".to_string()]);

        let without = artifact(dir.path(), "b.zip", &[("a.yml", b"a")]);
        let third = sync(&workspace, &without, Some(&second.state)).await;
        assert!(third.state.dirty.is_empty());
        assert!(workspace.join("plugins/P.jar/data").is_dir());
    }

    #[tokio::test]
    async fn test_resync_unchanged_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let workspace = dir.path().join("ws");
        let zip = artifact(
            dir.path(),
            "a.zip",
            &[("a.yml", b"a"), ("plugins/P.jar", b"jar")],
        );

        let first = sync(&workspace, &zip, None).await;
        let second = sync(&workspace, &zip, Some(&first.state)).await;

        assert_eq!(second.report.write_count(), 0);
        assert_eq!(second.report.unchanged.len(), 2);
        assert_eq!(first.state.baseline, second.state.baseline);
    }

    #[tokio::test]
    async fn test_local_edit_is_preserved() {
        let dir = tempfile::tempdir().unwrap();
        let workspace = dir.path().join("ws");
        let path = "plugins/X/config.yml";
        let zip = artifact(dir.path(), "a.zip", &[(path, b"h1")]);

        let first = sync(&workspace, &zip, None).await;
        fs::write(workspace.join(path), b"h2").unwrap();
        let second = sync(&workspace, &zip, Some(&first.state)).await;

        assert_eq!(fs::read(workspace.join(path)).unwrap(), b"h2");
        assert_eq!(second.dirty_paths(), vec![path.to_string()]);
        assert_eq!(second.state.baseline.get(path), Some(&sha256_hex(b"h1")));
        assert_eq!(second.report.write_count(), 0);
    }

    #[tokio::test]
    async fn test_upstream_change_overwrites_local_edit() {
        let dir = tempfile::tempdir().unwrap();
        let workspace = dir.path().join("ws");
        let v1 = artifact(dir.path(), "v1.zip", &[("c.yml", b"v1")]);
        let v2 = artifact(dir.path(), "v2.zip", &[("c.yml", b"v2")]);

        let first = sync(&workspace, &v1, None).await;
        fs::write(workspace.join("c.yml"), b"edited").unwrap();
        let second = sync(&workspace, &v1, Some(&first.state)).await;
        assert!(second.state.dirty.contains("c.yml"));

        let third = sync(&workspace, &v2, Some(&second.state)).await;
        assert_eq!(fs::read(workspace.join("c.yml")).unwrap(), b"v2");
        assert!(third.state.dirty.is_empty());
        assert_eq!(third.state.baseline.get("c.yml"), Some(&sha256_hex(b"v2")));
    }

    #[tokio::test]
    async fn test_removed_entry_is_deleted() {
        let dir = tempfile::tempdir().unwrap();
        let workspace = dir.path().join("ws");
        let v1 = artifact(
            dir.path(),
            "v1.zip",
            &[("keep.yml", b"k"), ("plugins/Old/config.yml", b"o")],
        );
        let v2 = artifact(dir.path(), "v2.zip", &[("keep.yml", b"k")]);

        let first = sync(&workspace, &v1, None).await;
        let second = sync(&workspace, &v2, Some(&first.state)).await;

        assert!(!workspace.join("plugins/Old/config.yml").exists());
        assert!(!workspace.join("plugins/Old").exists());
        assert_eq!(second.report.deleted, vec!["plugins/Old/config.yml".to_string()]);
        assert!(!second.state.baseline.contains_key("plugins/Old/config.yml"));
        assert!(workspace.join("keep.yml").exists());
    }

    #[tokio::test]
    async fn test_untracked_file_is_adopted_or_marked_dirty() {
        let dir = tempfile::tempdir().unwrap();
        let workspace = dir.path().join("ws");
        let v1 = artifact(dir.path(), "v1.zip", &[("a.yml", b"a")]);
        let first = sync(&workspace, &v1, None).await;

        fs::write(workspace.join("same.yml"), b"same").unwrap();
        fs::write(workspace.join("mine.yml"), b"mine").unwrap();
        let v2 = artifact(
            dir.path(),
            "v2.zip",
            &[("a.yml", b"a"), ("same.yml", b"same"), ("mine.yml", b"theirs")],
        );
        let second = sync(&workspace, &v2, Some(&first.state)).await;

        assert_eq!(second.report.adopted, vec!["same.yml".to_string()]);
        assert_eq!(second.report.preserved, vec!["mine.yml".to_string()]);
        assert_eq!(fs::read(workspace.join("mine.yml")).unwrap(), b"mine");
        assert!(!second.state.baseline.contains_key("mine.yml"));

        // Dropped from the artifact: untracked, so left on disk
        let third = sync(&workspace, &v1, Some(&second.state)).await;
        assert!(workspace.join("mine.yml").exists());
        assert!(!workspace.join("same.yml").exists());
        assert!(third.state.dirty.is_empty());
    }

    #[tokio::test]
    async fn test_unsafe_entry_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let zip = artifact(dir.path(), "evil.zip", &[("../escape.txt", b"x")]);
        let err = WorkspaceReconciler::new()
            .sync(
                &dir.path().join("ws"),
                &zip,
                None,
                &ProjectId::new("lobby"),
                "b1",
            )
            .await
            .unwrap_err();
        assert!(matches!(err, WorkspaceError::UnsafeEntry(_)));
        assert!(!dir.path().join("escape.txt").exists());
    }
}
