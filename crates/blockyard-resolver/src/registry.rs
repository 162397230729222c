//! Plugin registry file
//!
//! A YAML or JSON document declaring fallback sources per plugin id:
//!
//! ```yaml
//! plugins:
//!   luckperms:
//!     sources:
//!       - type: hangar
//!         slug: LuckPerms
//!       - type: url
//!         url: https://download.luckperms.net/latest.jar
//! ```

use crate::error::{ResolveError, ResolveResult};
use blockyard_types::ProviderKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// One typed source in a registry entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase", deny_unknown_fields)]
pub enum RegistrySource {
    Url { url: String },
    Hangar { slug: String },
    Modrinth { slug: String },
    Spiget { slug: String },
    Github { slug: String },
}

impl RegistrySource {
    /// Provider kind, or `None` for a direct URL
    pub fn provider(&self) -> Option<(ProviderKind, &str)> {
        match self {
            RegistrySource::Url { .. } => None,
            RegistrySource::Hangar { slug } => Some((ProviderKind::Hangar, slug)),
            RegistrySource::Modrinth { slug } => Some((ProviderKind::Modrinth, slug)),
            RegistrySource::Spiget { slug } => Some((ProviderKind::Spiget, slug)),
            RegistrySource::Github { slug } => Some((ProviderKind::Github, slug)),
        }
    }

    /// Label used in failure reports
    pub fn label(&self) -> String {
        match self {
            RegistrySource::Url { url } => format!("registry:url:{}", url),
            other => match other.provider() {
                Some((kind, slug)) => format!("registry:{}:{}", kind, slug),
                None => "registry".to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegistryEntry {
    #[serde(default)]
    pub sources: Vec<RegistrySource>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PluginRegistry {
    #[serde(default)]
    pub plugins: BTreeMap<String, RegistryEntry>,
}

impl PluginRegistry {
    /// Load the registry at `path`; a missing file yields `None`
    pub async fn load(path: &Path) -> ResolveResult<Option<Self>> {
        let raw = match tokio::fs::read_to_string(path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Self::parse(path, &raw).map(Some)
    }

    fn parse(path: &Path, raw: &str) -> ResolveResult<Self> {
        let is_json = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        let parsed = if is_json {
            serde_json::from_str(raw).map_err(|e| e.to_string())
        } else {
            serde_yaml::from_str(raw).map_err(|e| e.to_string())
        };

        parsed.map_err(|message| ResolveError::Registry {
            path: PathBuf::from(path),
            message,
        })
    }

    pub fn sources_for(&self, plugin_id: &str) -> &[RegistrySource] {
        self.plugins
            .get(plugin_id)
            .map(|entry| entry.sources.as_slice())
            .unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_registry_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = PluginRegistry::load(&dir.path().join("registry.yaml"))
            .await
            .unwrap();
        assert!(loaded.is_none());
    }

    #[tokio::test]
    async fn test_yaml_registry() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.yaml");
        tokio::fs::write(
            &path,
            "plugins:\n  luckperms:\n    sources:\n      - type: hangar\n        slug: LuckPerms\n      - type: url\n        url: https://example.com/lp.jar\n",
        )
        .await
        .unwrap();

        let registry = PluginRegistry::load(&path).await.unwrap().unwrap();
        let sources = registry.sources_for("luckperms");
        assert_eq!(sources.len(), 2);
        assert_eq!(
            sources[0],
            RegistrySource::Hangar {
                slug: "LuckPerms".into()
            }
        );
        assert_eq!(sources[1].label(), "registry:url:https://example.com/lp.jar");
        assert!(registry.sources_for("unknown").is_empty());
    }

    #[tokio::test]
    async fn test_json_registry_rejects_unknown_type() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.json");
        tokio::fs::write(
            &path,
            r#"{"plugins":{"x":{"sources":[{"type":"curseforge","slug":"x"}]}}}"#,
        )
        .await
        .unwrap();

        let err = PluginRegistry::load(&path).await.unwrap_err();
        assert!(matches!(err, ResolveError::Registry { .. }));
    }
}
