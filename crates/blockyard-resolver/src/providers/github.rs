//! GitHub release assets

use super::{trim_base, PluginProvider, ProviderArtifact, ProviderRequest};
use crate::error::{ResolveError, ResolveResult};
use crate::http::HttpClient;
use async_trait::async_trait;
use blockyard_types::ProviderKind;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct Release {
    tag_name: String,
    #[serde(default)]
    assets: Vec<Asset>,
}

#[derive(Debug, Deserialize)]
struct Asset {
    name: String,
    browser_download_url: String,
}

pub struct GithubProvider {
    http: HttpClient,
    base: String,
}

impl GithubProvider {
    pub fn new(http: HttpClient, base: &str) -> Self {
        Self {
            http,
            base: trim_base(base).to_string(),
        }
    }

    async fn release(&self, repo: &str, version: &str, latest: bool) -> ResolveResult<Release> {
        if latest {
            return self
                .http
                .get_json(&format!("{}/repos/{}/releases/latest", self.base, repo))
                .await;
        }

        let exact = format!("{}/repos/{}/releases/tags/{}", self.base, repo, version);
        match self.http.get_json(&exact).await {
            Err(ResolveError::Http { status: 404, .. }) if !version.starts_with('v') => {
                self.http
                    .get_json(&format!(
                        "{}/repos/{}/releases/tags/v{}",
                        self.base, repo, version
                    ))
                    .await
            }
            other => other,
        }
    }
}

#[async_trait]
impl PluginProvider for GithubProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Github
    }

    async fn fetch(&self, request: &ProviderRequest<'_>) -> ResolveResult<ProviderArtifact> {
        if !request.slug.contains('/') {
            return Err(ResolveError::InvalidResponse {
                url: self.base.clone(),
                message: format!("expected owner/repo, got '{}'", request.slug),
            });
        }

        let release = match self
            .release(request.slug, request.version, request.wants_latest())
            .await
        {
            Err(ResolveError::Http { status: 404, .. }) => {
                return Err(ResolveError::VersionNotFound {
                    provider: "github".into(),
                    slug: request.slug.to_string(),
                    version: request.version.to_string(),
                })
            }
            other => other?,
        };

        let asset = release
            .assets
            .iter()
            .find(|a| a.name.ends_with(".jar"))
            .ok_or_else(|| ResolveError::NoDownload {
                provider: "github".into(),
                slug: request.slug.to_string(),
            })?;

        let bytes = self.http.get_bytes(&asset.browser_download_url).await?;
        let version = release
            .tag_name
            .strip_prefix('v')
            .unwrap_or(&release.tag_name)
            .to_string();

        Ok(ProviderArtifact {
            bytes,
            version,
            file_name: asset.name.clone(),
            download_url: asset.browser_download_url.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::RetryPolicy;
    use axum::extract::{Path, State};
    use axum::http::StatusCode;
    use axum::routing::get;
    use axum::{Json, Router};
    use blockyard_types::Loader;
    use serde_json::{json, Value};
    use std::time::Duration;

    fn release(base: &str, tag: &str) -> Value {
        let version = tag.trim_start_matches('v');
        json!({
            "tag_name": tag,
            "assets": [
                {
                    "name": "checksums.txt",
                    "browser_download_url": format!("{}/dl/checksums.txt", base)
                },
                {
                    "name": format!("Chunky-{}.jar", version),
                    "browser_download_url": format!("{}/dl/{}", base, version)
                }
            ]
        })
    }

    async fn by_tag(
        State(base): State<String>,
        Path((_, _, tag)): Path<(String, String, String)>,
    ) -> Result<Json<Value>, StatusCode> {
        match tag.as_str() {
            "v2.0.0" | "1.9.0" => Ok(Json(release(&base, &tag))),
            _ => Err(StatusCode::NOT_FOUND),
        }
    }

    async fn serve() -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let app = Router::new()
            .route(
                "/repos/:owner/:repo/releases/latest",
                get(|State(base): State<String>| async move {
                    Json(release(&base, "v2.1.0"))
                }),
            )
            .route("/repos/:owner/:repo/releases/tags/:tag", get(by_tag))
            .route(
                "/dl/:version",
                get(|Path(version): Path<String>| async move { format!("jar-{}", version) }),
            )
            .with_state(base.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        base
    }

    fn request<'a>(slug: &'a str, version: &'a str) -> ProviderRequest<'a> {
        ProviderRequest {
            plugin_id: "chunky",
            slug,
            version,
            loader: Loader::Paper,
            minecraft_version: "1.20.4",
        }
    }

    fn provider(base: &str) -> GithubProvider {
        let http = HttpClient::new(None, Duration::from_secs(5), RetryPolicy::default()).unwrap();
        GithubProvider::new(http, base)
    }

    #[tokio::test]
    async fn test_latest_release_strips_tag_prefix() {
        let base = serve().await;

        let artifact = provider(&base)
            .fetch(&request("pop4959/Chunky", "latest"))
            .await
            .unwrap();
        assert_eq!(artifact.version, "2.1.0");
        assert_eq!(artifact.file_name, "Chunky-2.1.0.jar");
        assert_eq!(&artifact.bytes[..], b"jar-2.1.0");
    }

    #[tokio::test]
    async fn test_exact_tag_falls_back_to_v_prefix() {
        let base = serve().await;
        let github = provider(&base);

        let plain = github.fetch(&request("pop4959/Chunky", "1.9.0")).await.unwrap();
        assert_eq!(plain.version, "1.9.0");
        assert_eq!(&plain.bytes[..], b"jar-1.9.0");

        let prefixed = github.fetch(&request("pop4959/Chunky", "2.0.0")).await.unwrap();
        assert_eq!(prefixed.version, "2.0.0");
        assert_eq!(prefixed.file_name, "Chunky-2.0.0.jar");

        let err = github.fetch(&request("pop4959/Chunky", "0.1.0")).await.unwrap_err();
        assert!(matches!(err, ResolveError::VersionNotFound { .. }));
    }

    #[tokio::test]
    async fn test_slug_must_name_owner_and_repo() {
        let github = provider("http://127.0.0.1:9");
        let err = github.fetch(&request("Chunky", "latest")).await.unwrap_err();
        assert!(matches!(err, ResolveError::InvalidResponse { .. }));
    }
}
