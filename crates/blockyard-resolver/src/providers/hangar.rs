//! Hangar (Paper plugin repository)

use super::{trim_base, PluginProvider, ProviderArtifact, ProviderRequest};
use crate::error::{ResolveError, ResolveResult};
use crate::http::HttpClient;
use async_trait::async_trait;
use blockyard_types::{Loader, ProviderKind};
use serde::Deserialize;
use std::collections::HashMap;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct VersionPage {
    result: Vec<HangarVersion>,
}

#[derive(Debug, Deserialize)]
struct HangarVersion {
    name: String,
    #[serde(default)]
    downloads: HashMap<String, HangarDownload>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HangarDownload {
    #[serde(default)]
    file_info: Option<HangarFileInfo>,
    #[serde(default)]
    download_url: Option<String>,
    #[serde(default)]
    external_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HangarFileInfo {
    name: String,
}

pub struct HangarProvider {
    http: HttpClient,
    base: String,
}

impl HangarProvider {
    pub fn new(http: HttpClient, base: &str) -> Self {
        Self {
            http,
            base: trim_base(base).to_string(),
        }
    }

    fn platform(loader: Loader) -> &'static str {
        match loader {
            Loader::Velocity => "VELOCITY",
            _ => "PAPER",
        }
    }
}

#[async_trait]
impl PluginProvider for HangarProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Hangar
    }

    async fn fetch(&self, request: &ProviderRequest<'_>) -> ResolveResult<ProviderArtifact> {
        let platform = Self::platform(request.loader);
        let url = url::Url::parse_with_params(
            &format!("{}/api/v1/projects/{}/versions", self.base, request.slug),
            &[
                ("limit", "25"),
                ("offset", "0"),
                ("platform", platform),
                ("platformVersion", request.minecraft_version),
            ],
        )
        .map_err(|e| ResolveError::InvalidResponse {
            url: self.base.clone(),
            message: e.to_string(),
        })?;

        let page: VersionPage = self.http.get_json(url.as_str()).await?;
        debug!(slug = request.slug, count = page.result.len(), "Hangar versions listed");

        // Hangar lists newest first
        let version = page
            .result
            .into_iter()
            .find(|v| request.wants_latest() || v.name == request.version)
            .ok_or_else(|| ResolveError::VersionNotFound {
                provider: "hangar".into(),
                slug: request.slug.to_string(),
                version: request.version.to_string(),
            })?;

        let download = version
            .downloads
            .get(platform)
            .ok_or_else(|| ResolveError::NoDownload {
                provider: "hangar".into(),
                slug: request.slug.to_string(),
            })?;

        let download_url = download
            .download_url
            .clone()
            .or_else(|| download.external_url.clone())
            .ok_or_else(|| ResolveError::NoDownload {
                provider: "hangar".into(),
                slug: request.slug.to_string(),
            })?;

        let file_name = download
            .file_info
            .as_ref()
            .map(|f| f.name.clone())
            .unwrap_or_else(|| format!("{}-{}.jar", request.plugin_id, version.name));

        let bytes = self.http.get_bytes(&download_url).await?;

        Ok(ProviderArtifact {
            bytes,
            version: version.name,
            file_name,
            download_url,
        })
    }
}
