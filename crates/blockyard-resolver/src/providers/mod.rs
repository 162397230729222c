//! Plugin marketplace providers
//!
//! Each provider implements its own version-matching rule. All accept either
//! an exact version or the `latest` sentinel; Hangar and Modrinth also filter
//! by loader and Minecraft version.

mod github;
mod hangar;
mod modrinth;
mod spiget;

pub use github::GithubProvider;
pub use hangar::HangarProvider;
pub use modrinth::ModrinthProvider;
pub use spiget::SpigetProvider;

use crate::error::ResolveResult;
use crate::http::HttpClient;
use async_trait::async_trait;
use blockyard_types::{Loader, ProviderKind};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// What to look up at a provider
#[derive(Debug, Clone)]
pub struct ProviderRequest<'a> {
    pub plugin_id: &'a str,
    /// Provider-specific identifier (project slug, resource id, `owner/repo`)
    pub slug: &'a str,
    /// Exact version or `latest`
    pub version: &'a str,
    pub loader: Loader,
    pub minecraft_version: &'a str,
}

impl ProviderRequest<'_> {
    pub fn wants_latest(&self) -> bool {
        self.version.eq_ignore_ascii_case("latest")
    }
}

/// Downloaded plugin from a provider
#[derive(Debug, Clone)]
pub struct ProviderArtifact {
    pub bytes: Bytes,
    pub version: String,
    pub file_name: String,
    pub download_url: String,
}

/// A named marketplace
#[async_trait]
pub trait PluginProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Look up the matching version and download it
    async fn fetch(&self, request: &ProviderRequest<'_>) -> ResolveResult<ProviderArtifact>;
}

/// Base URLs for every provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderEndpoints {
    #[serde(default = "default_hangar")]
    pub hangar: String,
    #[serde(default = "default_modrinth")]
    pub modrinth: String,
    #[serde(default = "default_spiget")]
    pub spiget: String,
    #[serde(default = "default_github")]
    pub github: String,
}

impl Default for ProviderEndpoints {
    fn default() -> Self {
        Self {
            hangar: default_hangar(),
            modrinth: default_modrinth(),
            spiget: default_spiget(),
            github: default_github(),
        }
    }
}

fn default_hangar() -> String {
    "https://hangar.papermc.io".to_string()
}

fn default_modrinth() -> String {
    "https://api.modrinth.com".to_string()
}

fn default_spiget() -> String {
    "https://api.spiget.org".to_string()
}

fn default_github() -> String {
    "https://api.github.com".to_string()
}

/// Providers indexed by kind
#[derive(Clone, Default)]
pub struct ProviderSet {
    providers: HashMap<ProviderKind, Arc<dyn PluginProvider>>,
}

impl ProviderSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every built-in provider against the given endpoints
    pub fn standard(http: HttpClient, endpoints: &ProviderEndpoints) -> Self {
        Self::new()
            .with(Arc::new(HangarProvider::new(http.clone(), &endpoints.hangar)))
            .with(Arc::new(ModrinthProvider::new(http.clone(), &endpoints.modrinth)))
            .with(Arc::new(SpigetProvider::new(http.clone(), &endpoints.spiget)))
            .with(Arc::new(GithubProvider::new(http, &endpoints.github)))
    }

    pub fn with(mut self, provider: Arc<dyn PluginProvider>) -> Self {
        self.providers.insert(provider.kind(), provider);
        self
    }

    pub fn get(&self, kind: ProviderKind) -> Option<&Arc<dyn PluginProvider>> {
        self.providers.get(&kind)
    }
}

/// Last path segment of a URL, if it looks like a file name
pub(crate) fn file_name_from_url(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let name = parsed.path_segments()?.last()?.to_string();
    if name.is_empty() || !name.contains('.') {
        None
    } else {
        Some(name)
    }
}

pub(crate) fn trim_base(base: &str) -> &str {
    base.trim_end_matches('/')
}
