//! On-disk plugin cache laid out as `<root>/<id>/<version>/<file>`

use crate::error::ResolveResult;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct PluginCache {
    root: PathBuf,
}

impl PluginCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, plugin_id: &str, version: &str, file_name: &str) -> PathBuf {
        self.root
            .join(sanitize(plugin_id))
            .join(sanitize(version))
            .join(sanitize(file_name))
    }

    /// Store bytes unless the file is already present
    pub async fn store(
        &self,
        plugin_id: &str,
        version: &str,
        file_name: &str,
        bytes: &[u8],
    ) -> ResolveResult<PathBuf> {
        let path = self.path_for(plugin_id, version, file_name);
        if tokio::fs::try_exists(&path).await? {
            debug!(path = %path.display(), "Plugin already cached");
            return Ok(path);
        }

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Write to a sibling then rename so a torn write never looks cached
        let partial = path.with_extension("partial");
        tokio::fs::write(&partial, bytes).await?;
        tokio::fs::rename(&partial, &path).await?;
        debug!(path = %path.display(), size = bytes.len(), "Plugin cached");
        Ok(path)
    }

    /// First jar cached for the id and version, by file name order
    pub async fn lookup(&self, plugin_id: &str, version: &str) -> ResolveResult<Option<PathBuf>> {
        let dir = self.root.join(sanitize(plugin_id)).join(sanitize(version));
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let mut jars = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_jar = path
                .extension()
                .map(|ext| ext.eq_ignore_ascii_case("jar"))
                .unwrap_or(false);
            if is_jar && entry.file_type().await?.is_file() {
                jars.push(path);
            }
        }
        jars.sort();
        Ok(jars.into_iter().next())
    }
}

fn sanitize(component: &str) -> String {
    let cleaned: String = component
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' => '_',
            c => c,
        })
        .collect();
    if cleaned.is_empty() || cleaned == "." || cleaned == ".." {
        "_".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_store_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let cache = PluginCache::new(dir.path());

        let first = cache.store("p", "1.0", "P.jar", b"one").await.unwrap();
        let second = cache.store("p", "1.0", "P.jar", b"two").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(tokio::fs::read(&first).await.unwrap(), b"one");
    }

    #[tokio::test]
    async fn test_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let cache = PluginCache::new(dir.path());

        assert!(cache.lookup("p", "1.0").await.unwrap().is_none());
        let stored = cache.store("p", "1.0", "P.jar", b"jar").await.unwrap();
        assert_eq!(cache.lookup("p", "1.0").await.unwrap(), Some(stored));
        assert!(cache.lookup("p", "2.0").await.unwrap().is_none());
    }

    #[test]
    fn test_path_components_cannot_escape() {
        let cache = PluginCache::new("/cache");
        let path = cache.path_for("../evil", "..", "a/b.jar");
        assert!(path.starts_with("/cache"));
        assert_eq!(path, PathBuf::from("/cache/.._evil/_/a_b.jar"));
    }
}
