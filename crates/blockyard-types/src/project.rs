//! Project definition types
//!
//! A project is the declarative input to a build: which Minecraft version and
//! loader to target, which plugins to resolve, and which config templates to
//! render. Projects are parsed from `project.yaml` documents; unknown fields
//! are rejected and optional fields take explicit defaults.

use crate::ProjectId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

/// Declarative server project
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Project {
    /// Unique project identifier
    pub id: ProjectId,

    /// Human readable name
    #[serde(default)]
    pub name: Option<String>,

    /// Server loader the artifact targets
    #[serde(default)]
    pub loader: Loader,

    /// Minecraft version, e.g. `1.20.4`
    pub minecraft_version: String,

    /// World settings carried into the manifest
    #[serde(default)]
    pub world: WorldSettings,

    /// Ordered plugin references
    #[serde(default)]
    pub plugins: Vec<ProjectPluginRef>,

    /// Ordered config templates
    #[serde(default)]
    pub configs: Vec<ConfigRef>,

    /// Template variables
    #[serde(default)]
    pub variables: BTreeMap<String, String>,

    /// Variable overlays, applied in order on top of `variables`
    #[serde(default)]
    pub overlays: Vec<Overlay>,

    /// Linked source repository, if builds should be pushed
    #[serde(default)]
    pub repository: Option<RepositoryLink>,

    /// Directory the project was loaded from
    #[serde(skip)]
    pub root: PathBuf,
}

impl Project {
    /// Create a minimal project rooted at `root`
    pub fn new(id: impl Into<String>, minecraft_version: impl Into<String>, root: PathBuf) -> Self {
        Self {
            id: ProjectId::new(id),
            name: None,
            loader: Loader::default(),
            minecraft_version: minecraft_version.into(),
            world: WorldSettings::default(),
            plugins: Vec::new(),
            configs: Vec::new(),
            variables: BTreeMap::new(),
            overlays: Vec::new(),
            repository: None,
            root,
        }
    }

    /// True when the plugin and config inventory has never been populated
    pub fn inventory_is_empty(&self) -> bool {
        self.plugins.is_empty() && self.configs.is_empty()
    }

    /// Variables with every overlay applied in declaration order
    pub fn effective_variables(&self) -> BTreeMap<String, String> {
        let mut vars = self.variables.clone();
        for overlay in &self.overlays {
            for (key, value) in &overlay.variables {
                vars.insert(key.clone(), value.clone());
            }
        }
        vars
    }

    /// Validate required fields and path safety
    pub fn validate(&self) -> Result<(), ProjectValidationError> {
        if self.id.as_str().trim().is_empty() {
            return Err(ProjectValidationError::MissingField("id"));
        }
        if !is_safe_segment(self.id.as_str()) {
            return Err(ProjectValidationError::InvalidId(self.id.to_string()));
        }
        if self.minecraft_version.trim().is_empty() {
            return Err(ProjectValidationError::MissingField("minecraftVersion"));
        }

        let mut seen = HashSet::new();
        for plugin in &self.plugins {
            if plugin.id.trim().is_empty() {
                return Err(ProjectValidationError::MissingField("plugins[].id"));
            }
            if plugin.version.trim().is_empty() {
                return Err(ProjectValidationError::MissingField("plugins[].version"));
            }
            if !seen.insert(plugin.id.as_str()) {
                return Err(ProjectValidationError::DuplicatePlugin(plugin.id.clone()));
            }
        }

        for config in &self.configs {
            if !is_relative_path(&config.path) {
                return Err(ProjectValidationError::UnsafePath(config.path.clone()));
            }
            if !is_relative_path(&config.template) {
                return Err(ProjectValidationError::UnsafePath(config.template.clone()));
            }
        }

        Ok(())
    }
}

/// Server loader
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Loader {
    #[default]
    Paper,
    Purpur,
    Folia,
    Spigot,
    Velocity,
}

impl Loader {
    pub fn as_str(&self) -> &'static str {
        match self {
            Loader::Paper => "paper",
            Loader::Purpur => "purpur",
            Loader::Folia => "folia",
            Loader::Spigot => "spigot",
            Loader::Velocity => "velocity",
        }
    }

    /// Value of the `TYPE` variable understood by the server image
    pub fn server_type(&self) -> &'static str {
        match self {
            Loader::Paper => "PAPER",
            Loader::Purpur => "PURPUR",
            Loader::Folia => "FOLIA",
            Loader::Spigot => "SPIGOT",
            Loader::Velocity => "VELOCITY",
        }
    }
}

/// World settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct WorldSettings {
    #[serde(default = "default_world_mode")]
    pub mode: String,
    #[serde(default)]
    pub seed: Option<String>,
    #[serde(default = "default_world_name")]
    pub name: String,
}

impl Default for WorldSettings {
    fn default() -> Self {
        Self {
            mode: default_world_mode(),
            seed: None,
            name: default_world_name(),
        }
    }
}

fn default_world_mode() -> String {
    "survival".to_string()
}

fn default_world_name() -> String {
    "world".to_string()
}

/// Named plugin marketplace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Paper-ecosystem registry
    Hangar,
    /// General mod registry
    Modrinth,
    /// SpigotMC resource index
    Spiget,
    /// Release assets on a source-code host
    Github,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Hangar => "hangar",
            ProviderKind::Modrinth => "modrinth",
            ProviderKind::Spiget => "spiget",
            ProviderKind::Github => "github",
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Explicit plugin source
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PluginSource {
    #[serde(default)]
    pub provider: Option<ProviderKind>,

    /// Provider-specific slug; defaults to the plugin id
    #[serde(default)]
    pub slug: Option<String>,

    #[serde(default)]
    pub download_url: Option<String>,

    /// Path relative to the project root
    #[serde(default)]
    pub upload_path: Option<String>,
}

/// Plugin reference inside a project
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ProjectPluginRef {
    pub id: String,

    /// Requested version, or `latest`
    pub version: String,

    #[serde(default)]
    pub source: Option<PluginSource>,

    /// Cached artifact from a previous resolution
    #[serde(default)]
    pub cached_path: Option<PathBuf>,

    /// SHA-256 of the cached artifact
    #[serde(default)]
    pub sha256: Option<String>,

    /// Version the last resolution actually produced
    #[serde(default)]
    pub resolved_version: Option<String>,

    /// Provider that produced the last resolution
    #[serde(default)]
    pub resolved_provider: Option<String>,
}

impl ProjectPluginRef {
    pub fn new(id: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            version: version.into(),
            source: None,
            cached_path: None,
            sha256: None,
            resolved_version: None,
            resolved_provider: None,
        }
    }

    pub fn with_source(mut self, source: PluginSource) -> Self {
        self.source = Some(source);
        self
    }

    /// True when the requested version is the `latest` sentinel
    pub fn wants_latest(&self) -> bool {
        self.version.eq_ignore_ascii_case("latest")
    }
}

/// Config template reference
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ConfigRef {
    /// Archive path of the rendered file
    pub path: String,

    /// Template path relative to the project root
    pub template: String,
}

/// Variable overlay (profile)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Overlay {
    pub name: String,
    #[serde(default)]
    pub variables: BTreeMap<String, String>,
}

/// Linked source repository
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RepositoryLink {
    pub url: String,
    /// `owner/name`
    pub full_name: String,
    #[serde(default = "default_branch")]
    pub default_branch: String,
}

fn default_branch() -> String {
    "main".to_string()
}

/// Project validation errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProjectValidationError {
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("invalid project id: {0}")]
    InvalidId(String),

    #[error("duplicate plugin reference: {0}")]
    DuplicatePlugin(String),

    #[error("path must be relative and stay inside the project: {0}")]
    UnsafePath(String),
}

fn is_safe_segment(value: &str) -> bool {
    !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        && value != "."
        && value != ".."
}

/// True when `path` is relative and never climbs out of its base
pub fn is_relative_path(path: &str) -> bool {
    if path.trim().is_empty() {
        return false;
    }
    Path::new(path)
        .components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_yaml_applies_defaults() {
        let yaml = "id: lobby\nminecraftVersion: 1.20.4\n";
        let project: Project = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(project.loader, Loader::Paper);
        assert_eq!(project.world.mode, "survival");
        assert_eq!(project.world.name, "world");
        assert!(project.inventory_is_empty());
        project.validate().unwrap();
    }

    #[test]
    fn test_unknown_fields_rejected() {
        let yaml = "id: lobby\nminecraftVersion: 1.20.4\nmystery: true\n";
        assert!(serde_yaml::from_str::<Project>(yaml).is_err());
    }

    #[test]
    fn test_overlays_apply_in_order() {
        let mut project = Project::new("lobby", "1.20.4", PathBuf::from("."));
        project.variables.insert("motd".into(), "base".into());
        project.overlays.push(Overlay {
            name: "dev".into(),
            variables: BTreeMap::from([("motd".to_string(), "dev".to_string())]),
        });
        project.overlays.push(Overlay {
            name: "local".into(),
            variables: BTreeMap::from([("motd".to_string(), "local".to_string())]),
        });
        assert_eq!(project.effective_variables()["motd"], "local");
    }

    #[test]
    fn test_validation_rejects_unsafe_paths_and_duplicates() {
        let mut project = Project::new("lobby", "1.20.4", PathBuf::from("."));
        project.configs.push(ConfigRef {
            path: "../escape.yml".into(),
            template: "configs/a.yml".into(),
        });
        assert!(matches!(
            project.validate(),
            Err(ProjectValidationError::UnsafePath(_))
        ));

        project.configs.clear();
        project.plugins.push(ProjectPluginRef::new("luckperms", "5.4"));
        project.plugins.push(ProjectPluginRef::new("luckperms", "5.5"));
        assert_eq!(
            project.validate(),
            Err(ProjectValidationError::DuplicatePlugin("luckperms".into()))
        );
    }

    #[test]
    fn test_missing_version_is_validation_error() {
        let project = Project::new("lobby", " ", PathBuf::from("."));
        assert_eq!(
            project.validate(),
            Err(ProjectValidationError::MissingField("minecraftVersion"))
        );
    }
}
