//! Spiget (SpigotMC resource index)
//!
//! Spiget has no loader or Minecraft version metadata, so only the version
//! name is matched.

use super::{trim_base, PluginProvider, ProviderArtifact, ProviderRequest};
use crate::error::{ResolveError, ResolveResult};
use crate::http::HttpClient;
use async_trait::async_trait;
use blockyard_types::ProviderKind;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct SpigetVersion {
    id: u64,
    name: String,
}

pub struct SpigetProvider {
    http: HttpClient,
    base: String,
}

impl SpigetProvider {
    pub fn new(http: HttpClient, base: &str) -> Self {
        Self {
            http,
            base: trim_base(base).to_string(),
        }
    }
}

#[async_trait]
impl PluginProvider for SpigetProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Spiget
    }

    async fn fetch(&self, request: &ProviderRequest<'_>) -> ResolveResult<ProviderArtifact> {
        let resource = request.slug;
        let (version, download_url) = if request.wants_latest() {
            let latest: SpigetVersion = self
                .http
                .get_json(&format!(
                    "{}/v2/resources/{}/versions/latest",
                    self.base, resource
                ))
                .await?;
            let url = format!("{}/v2/resources/{}/download", self.base, resource);
            (latest.name, url)
        } else {
            let versions: Vec<SpigetVersion> = self
                .http
                .get_json(&format!(
                    "{}/v2/resources/{}/versions?size=100&sort=-releaseDate",
                    self.base, resource
                ))
                .await?;
            let found = versions
                .into_iter()
                .find(|v| v.name == request.version)
                .ok_or_else(|| ResolveError::VersionNotFound {
                    provider: "spiget".into(),
                    slug: resource.to_string(),
                    version: request.version.to_string(),
                })?;
            let url = format!(
                "{}/v2/resources/{}/versions/{}/download",
                self.base, resource, found.id
            );
            (found.name, url)
        };

        let bytes = self.http.get_bytes(&download_url).await?;

        Ok(ProviderArtifact {
            bytes,
            file_name: format!("{}-{}.jar", request.plugin_id, version),
            version,
            download_url,
        })
    }
}
