//! Modrinth

use super::{trim_base, PluginProvider, ProviderArtifact, ProviderRequest};
use crate::error::{ResolveError, ResolveResult};
use crate::http::HttpClient;
use async_trait::async_trait;
use blockyard_types::{Loader, ProviderKind};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct ModrinthVersion {
    version_number: String,
    #[serde(default)]
    files: Vec<ModrinthFile>,
}

#[derive(Debug, Deserialize)]
struct ModrinthFile {
    url: String,
    filename: String,
    #[serde(default)]
    primary: bool,
}

pub struct ModrinthProvider {
    http: HttpClient,
    base: String,
}

impl ModrinthProvider {
    pub fn new(http: HttpClient, base: &str) -> Self {
        Self {
            http,
            base: trim_base(base).to_string(),
        }
    }

    /// Modrinth loader tags a server with this loader can run
    fn loader_tags(loader: Loader) -> &'static [&'static str] {
        match loader {
            Loader::Paper => &["paper", "spigot", "bukkit"],
            Loader::Purpur => &["purpur", "paper", "spigot", "bukkit"],
            Loader::Folia => &["folia"],
            Loader::Spigot => &["spigot", "bukkit"],
            Loader::Velocity => &["velocity"],
        }
    }

    fn versions_url(&self, request: &ProviderRequest<'_>) -> ResolveResult<url::Url> {
        let loaders = serde_json::to_string(Self::loader_tags(request.loader)).unwrap_or_default();
        let game_versions =
            serde_json::to_string(&[request.minecraft_version]).unwrap_or_default();

        url::Url::parse_with_params(
            &format!("{}/v2/project/{}/version", self.base, request.slug),
            &[("loaders", loaders), ("game_versions", game_versions)],
        )
        .map_err(|e| ResolveError::InvalidResponse {
            url: self.base.clone(),
            message: e.to_string(),
        })
    }
}

#[async_trait]
impl PluginProvider for ModrinthProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Modrinth
    }

    async fn fetch(&self, request: &ProviderRequest<'_>) -> ResolveResult<ProviderArtifact> {
        let url = self.versions_url(request)?;
        let versions: Vec<ModrinthVersion> = self.http.get_json(url.as_str()).await?;

        let version = versions
            .into_iter()
            .find(|v| request.wants_latest() || v.version_number == request.version)
            .ok_or_else(|| ResolveError::VersionNotFound {
                provider: "modrinth".into(),
                slug: request.slug.to_string(),
                version: request.version.to_string(),
            })?;

        let file = version
            .files
            .iter()
            .find(|f| f.primary)
            .or_else(|| version.files.first())
            .ok_or_else(|| ResolveError::NoDownload {
                provider: "modrinth".into(),
                slug: request.slug.to_string(),
            })?;

        let bytes = self.http.get_bytes(&file.url).await?;

        Ok(ProviderArtifact {
            bytes,
            version: version.version_number.clone(),
            file_name: file.filename.clone(),
            download_url: file.url.clone(),
        })
    }
}
