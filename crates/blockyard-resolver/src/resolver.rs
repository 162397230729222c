//! Ordered multi-source plugin resolution

use crate::cache::PluginCache;
use crate::error::{ResolveError, ResolveResult, SourceFailure};
use crate::http::HttpClient;
use crate::metadata::{PluginMetadata, PluginMetadataStore};
use crate::providers::{file_name_from_url, ProviderRequest, ProviderSet};
use crate::registry::{PluginRegistry, RegistrySource};
use blockyard_types::{is_relative_path, sha256_hex, Loader, ProjectPluginRef, ProviderKind};
use bytes::Bytes;
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Project-level inputs needed to resolve a plugin
#[derive(Debug, Clone, Copy)]
pub struct ResolveContext<'a> {
    pub project_root: &'a Path,
    pub loader: Loader,
    pub minecraft_version: &'a str,
}

/// Result of a successful resolution
#[derive(Debug, Clone)]
pub struct ResolvedPlugin {
    pub id: String,
    pub bytes: Bytes,
    pub resolved_version: String,
    pub file_name: String,
    pub cache_path: PathBuf,
    pub sha256: String,
    /// Provider that served the bytes, if any
    pub provider: Option<String>,
    /// Label of the winning source
    pub source: String,
}

impl ResolvedPlugin {
    /// Copy of the reference carrying the resolution back for caching
    pub fn updated_ref(&self, original: &ProjectPluginRef) -> ProjectPluginRef {
        let mut updated = original.clone();
        updated.cached_path = Some(self.cache_path.clone());
        updated.sha256 = Some(self.sha256.clone());
        updated.resolved_version = Some(self.resolved_version.clone());
        updated.resolved_provider = self.provider.clone();
        updated
    }
}

/// Bytes produced by one source before caching
struct Candidate {
    bytes: Bytes,
    version: String,
    file_name: String,
    provider: Option<String>,
    label: String,
}

pub struct PluginResolver {
    providers: ProviderSet,
    cache: PluginCache,
    registry_path: PathBuf,
    metadata: Arc<dyn PluginMetadataStore>,
    http: HttpClient,
}

impl PluginResolver {
    pub fn new(
        providers: ProviderSet,
        cache: PluginCache,
        registry_path: impl Into<PathBuf>,
        metadata: Arc<dyn PluginMetadataStore>,
        http: HttpClient,
    ) -> Self {
        Self {
            providers,
            cache,
            registry_path: registry_path.into(),
            metadata,
            http,
        }
    }

    pub fn cache(&self) -> &PluginCache {
        &self.cache
    }

    /// Resolve one plugin reference; the first successful source wins
    #[instrument(
        skip(self, reference, ctx),
        fields(plugin = %reference.id, version = %reference.version)
    )]
    pub async fn resolve(
        &self,
        reference: &ProjectPluginRef,
        ctx: &ResolveContext<'_>,
    ) -> ResolveResult<ResolvedPlugin> {
        let mut failures = Vec::new();
        let mut attempted = false;
        let mut registry_found = false;
        let source = reference.source.clone().unwrap_or_default();

        if let Some(upload) = source.upload_path.as_deref() {
            attempted = true;
            let label = format!("upload:{}", upload);
            let outcome = self.from_upload(reference, ctx, upload, label.clone()).await;
            if let Some(found) = settle(&mut failures, label, outcome) {
                return self.finish(reference, found).await;
            }
        }

        if let Some(url) = source.download_url.as_deref() {
            attempted = true;
            let label = format!("url:{}", url);
            let outcome = self.from_url(reference, url, label.clone()).await;
            if let Some(found) = settle(&mut failures, label, outcome) {
                return self.finish(reference, found).await;
            }
        }

        if let Some(kind) = source.provider {
            attempted = true;
            let slug = source.slug.as_deref().unwrap_or(&reference.id);
            let label = format!("{}:{}", kind, slug);
            let outcome = self
                .from_provider(reference, ctx, kind, slug, label.clone())
                .await;
            if let Some(found) = settle(&mut failures, label, outcome) {
                return self.finish(reference, found).await;
            }
        }

        match PluginRegistry::load(&self.registry_path).await {
            Ok(Some(registry)) => {
                registry_found = true;
                for entry in registry.sources_for(&reference.id) {
                    attempted = true;
                    let label = entry.label();
                    let outcome = match entry {
                        RegistrySource::Url { url } => {
                            self.from_url(reference, url, label.clone()).await
                        }
                        other => match other.provider() {
                            Some((kind, slug)) => {
                                self.from_provider(reference, ctx, kind, slug, label.clone())
                                    .await
                            }
                            None => continue,
                        },
                    };
                    if let Some(found) = settle(&mut failures, label, outcome) {
                        return self.finish(reference, found).await;
                    }
                }
            }
            Ok(None) => {
                debug!(path = %self.registry_path.display(), "No plugin registry");
            }
            Err(e) => {
                attempted = true;
                warn!(error = %e, "Plugin registry unreadable");
                failures.push(SourceFailure::new("registry", &e));
            }
        }

        if let Some(found) = self.from_local_jar(reference, ctx, &mut failures).await {
            return self.finish(reference, found).await;
        }

        match self.from_cache(reference, ctx).await {
            Ok(Some(found)) => return self.finish(reference, found).await,
            Ok(None) => {}
            Err(e) => {
                attempted = true;
                failures.push(SourceFailure::new("cache", &e));
            }
        }

        if !attempted && failures.is_empty() {
            return Err(ResolveError::NoSourceConfigured {
                plugin: reference.id.clone(),
                registry_path: self.registry_path.clone(),
                registry_found,
            });
        }

        Err(ResolveError::AllSourcesFailed {
            plugin: reference.id.clone(),
            failures,
        })
    }

    async fn from_upload(
        &self,
        reference: &ProjectPluginRef,
        ctx: &ResolveContext<'_>,
        upload: &str,
        label: String,
    ) -> ResolveResult<Candidate> {
        if !is_relative_path(upload) {
            return Err(ResolveError::FileNotFound(PathBuf::from(upload)));
        }

        let path = ctx.project_root.join(upload);
        let bytes = read_file(&path).await?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| default_file_name(reference, &reference.version));

        Ok(Candidate {
            bytes,
            version: reference.version.clone(),
            file_name,
            provider: None,
            label,
        })
    }

    async fn from_url(
        &self,
        reference: &ProjectPluginRef,
        url: &str,
        label: String,
    ) -> ResolveResult<Candidate> {
        let bytes = self.http.get_bytes(url).await?;
        let file_name = file_name_from_url(url)
            .unwrap_or_else(|| default_file_name(reference, &reference.version));

        Ok(Candidate {
            bytes,
            version: reference.version.clone(),
            file_name,
            provider: None,
            label,
        })
    }

    async fn from_provider(
        &self,
        reference: &ProjectPluginRef,
        ctx: &ResolveContext<'_>,
        kind: ProviderKind,
        slug: &str,
        label: String,
    ) -> ResolveResult<Candidate> {
        let provider = self
            .providers
            .get(kind)
            .ok_or_else(|| ResolveError::ProviderUnavailable(kind.to_string()))?;

        let request = ProviderRequest {
            plugin_id: &reference.id,
            slug,
            version: &reference.version,
            loader: ctx.loader,
            minecraft_version: ctx.minecraft_version,
        };
        let artifact = provider.fetch(&request).await?;

        Ok(Candidate {
            bytes: artifact.bytes,
            version: artifact.version,
            file_name: artifact.file_name,
            provider: Some(kind.to_string()),
            label,
        })
    }

    /// Versioned jar first, then the bare `<id>.jar`; read errors are recorded and skipped
    async fn from_local_jar(
        &self,
        reference: &ProjectPluginRef,
        ctx: &ResolveContext<'_>,
        failures: &mut Vec<SourceFailure>,
    ) -> Option<Candidate> {
        let plugins_dir = ctx.project_root.join("plugins");
        let names = [
            default_file_name(reference, &reference.version),
            format!("{}.jar", reference.id),
        ];

        for name in names {
            let path = plugins_dir.join(&name);
            match tokio::fs::read(&path).await {
                Ok(bytes) => {
                    return Some(Candidate {
                        bytes: Bytes::from(bytes),
                        version: reference.version.clone(),
                        file_name: name.clone(),
                        provider: None,
                        label: format!("local:{}", name),
                    })
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Local jar unreadable");
                    let err = ResolveError::from(e);
                    failures.push(SourceFailure::new(format!("local:{}", name), &err));
                }
            }
        }
        None
    }

    async fn from_cache(
        &self,
        reference: &ProjectPluginRef,
        ctx: &ResolveContext<'_>,
    ) -> ResolveResult<Option<Candidate>> {
        let version = if reference.wants_latest() {
            reference
                .resolved_version
                .clone()
                .unwrap_or_else(|| reference.version.clone())
        } else {
            reference.version.clone()
        };

        let recorded = reference.cached_path.as_ref().map(|p| {
            if p.is_absolute() {
                p.clone()
            } else {
                ctx.project_root.join(p)
            }
        });

        let path = match recorded {
            Some(p) if tokio::fs::try_exists(&p).await? => Some(p),
            _ => self.cache.lookup(&reference.id, &version).await?,
        };

        let Some(path) = path else {
            return Ok(None);
        };

        let bytes = read_file(&path).await?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| default_file_name(reference, &version));

        Ok(Some(Candidate {
            bytes,
            version,
            file_name,
            provider: reference.resolved_provider.clone(),
            label: format!("cache:{}", path.display()),
        }))
    }

    async fn finish(
        &self,
        reference: &ProjectPluginRef,
        found: Candidate,
    ) -> ResolveResult<ResolvedPlugin> {
        let sha256 = sha256_hex(&found.bytes);
        let cache_path = self
            .cache
            .store(&reference.id, &found.version, &found.file_name, &found.bytes)
            .await?;

        let record = PluginMetadata {
            plugin_id: reference.id.clone(),
            version: found.version.clone(),
            sha256: sha256.clone(),
            provider: found.provider.clone(),
            last_used_at: Utc::now(),
        };
        if let Err(e) = self.metadata.record(record).await {
            warn!(plugin = %reference.id, error = %e, "Failed to record plugin metadata");
        }

        info!(
            plugin = %reference.id,
            version = %found.version,
            source = %found.label,
            "Plugin resolved"
        );

        Ok(ResolvedPlugin {
            id: reference.id.clone(),
            bytes: found.bytes,
            resolved_version: found.version,
            file_name: found.file_name,
            cache_path,
            sha256,
            provider: found.provider,
            source: found.label,
        })
    }
}

fn settle(
    failures: &mut Vec<SourceFailure>,
    label: String,
    outcome: ResolveResult<Candidate>,
) -> Option<Candidate> {
    match outcome {
        Ok(found) => Some(found),
        Err(e) => {
            warn!(source = %label, error = %e, "Plugin source failed, trying next");
            failures.push(SourceFailure::new(label, &e));
            None
        }
    }
}

fn default_file_name(reference: &ProjectPluginRef, version: &str) -> String {
    format!("{}-{}.jar", reference.id, version)
}

async fn read_file(path: &Path) -> ResolveResult<Bytes> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Bytes::from(bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(ResolveError::FileNotFound(path.to_path_buf()))
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::RetryPolicy;
    use crate::metadata::InMemoryMetadataStore;
    use axum::http::StatusCode;
    use axum::{routing::get, Router};
    use blockyard_types::PluginSource;
    use std::time::Duration;

    struct Fixture {
        _dir: tempfile::TempDir,
        project_root: PathBuf,
        resolver: PluginResolver,
        metadata: Arc<InMemoryMetadataStore>,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let project_root = dir.path().join("project");
        std::fs::create_dir_all(project_root.join("plugins")).unwrap();
        let metadata = Arc::new(InMemoryMetadataStore::new());
        let http = HttpClient::new(
            None,
            Duration::from_secs(2),
            RetryPolicy {
                max_attempts: 1,
                ..RetryPolicy::default()
            },
        )
        .unwrap();
        let resolver = PluginResolver::new(
            ProviderSet::new(),
            PluginCache::new(dir.path().join("cache")),
            dir.path().join("registry.yaml"),
            metadata.clone(),
            http,
        );
        Fixture {
            _dir: dir,
            project_root,
            resolver,
            metadata,
        }
    }

    fn ctx(root: &Path) -> ResolveContext<'_> {
        ResolveContext {
            project_root: root,
            loader: Loader::Paper,
            minecraft_version: "1.20.4",
        }
    }

    #[tokio::test]
    async fn test_upload_wins() {
        let f = fixture();
        std::fs::write(f.project_root.join("uploads.jar"), b"uploaded").unwrap();
        std::fs::write(f.project_root.join("plugins/p-1.0.jar"), b"local").unwrap();

        let reference = ProjectPluginRef::new("p", "1.0").with_source(PluginSource {
            upload_path: Some("uploads.jar".into()),
            ..PluginSource::default()
        });
        let resolved = f
            .resolver
            .resolve(&reference, &ctx(&f.project_root))
            .await
            .unwrap();

        assert_eq!(&resolved.bytes[..], b"uploaded");
        assert_eq!(resolved.file_name, "uploads.jar");
        assert_eq!(resolved.sha256, sha256_hex(b"uploaded"));
        assert!(resolved.cache_path.exists());

        let meta = f.metadata.get("p", "1.0").await.unwrap().unwrap();
        assert_eq!(meta.sha256, resolved.sha256);
    }

    #[tokio::test]
    async fn test_failed_upload_falls_back_to_local_jar() {
        let f = fixture();
        std::fs::write(f.project_root.join("plugins/p.jar"), b"local").unwrap();

        let reference = ProjectPluginRef::new("p", "1.0").with_source(PluginSource {
            upload_path: Some("missing.jar".into()),
            ..PluginSource::default()
        });
        let resolved = f
            .resolver
            .resolve(&reference, &ctx(&f.project_root))
            .await
            .unwrap();

        assert_eq!(&resolved.bytes[..], b"local");
        assert_eq!(resolved.source, "local:p.jar");
    }

    #[tokio::test]
    async fn test_cached_path_is_used() {
        let f = fixture();
        let cached = f
            .resolver
            .cache()
            .store("P", "1.0", "P.jar", b"cached-bytes")
            .await
            .unwrap();

        let mut reference = ProjectPluginRef::new("P", "1.0");
        reference.cached_path = Some(cached.clone());

        let resolved = f
            .resolver
            .resolve(&reference, &ctx(&f.project_root))
            .await
            .unwrap();
        assert_eq!(&resolved.bytes[..], b"cached-bytes");
        assert_eq!(resolved.cache_path, cached);

        let updated = resolved.updated_ref(&reference);
        assert_eq!(updated.sha256.as_deref(), Some(sha256_hex(b"cached-bytes").as_str()));
        assert_eq!(updated.resolved_version.as_deref(), Some("1.0"));
    }

    #[tokio::test]
    async fn test_no_source_configured() {
        let f = fixture();
        let reference = ProjectPluginRef::new("ghost", "1.0");
        let err = f
            .resolver
            .resolve(&reference, &ctx(&f.project_root))
            .await
            .unwrap_err();

        match err {
            ResolveError::NoSourceConfigured {
                plugin,
                registry_path,
                registry_found,
            } => {
                assert_eq!(plugin, "ghost");
                assert!(registry_path.ends_with("registry.yaml"));
                assert!(!registry_found);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_registry_without_entry_is_not_reported_missing() {
        let f = fixture();
        std::fs::write(
            &f.resolver.registry_path,
            "plugins:\n  other:\n    sources:\n      - type: hangar\n        slug: Other\n",
        )
        .unwrap();

        let err = f
            .resolver
            .resolve(&ProjectPluginRef::new("ghost", "1.0"), &ctx(&f.project_root))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ResolveError::NoSourceConfigured {
                registry_found: true,
                ..
            }
        ));
        let message = err.to_string();
        assert!(message.contains("no entry in registry"));
        assert!(!message.contains("not found"));
    }

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_registry_sources_tried_in_order() {
        let f = fixture();
        let app = Router::new()
            .route("/broken.jar", get(|| async { StatusCode::INTERNAL_SERVER_ERROR }))
            .route("/good.jar", get(|| async { "registry-bytes" }));
        let base = serve(app).await;
        let registry = [
            "plugins:".to_string(),
            "  p:".to_string(),
            "    sources:".to_string(),
            "      - type: url".to_string(),
            format!("        url: {base}/broken.jar"),
            "      - type: url".to_string(),
            format!("        url: {base}/good.jar"),
            "  q:".to_string(),
            "    sources:".to_string(),
            "      - type: url".to_string(),
            format!("        url: {base}/broken.jar"),
            "      - type: hangar".to_string(),
            "        slug: Q".to_string(),
        ]
        .join("\n");
        std::fs::write(&f.resolver.registry_path, registry).unwrap();
        std::fs::write(f.project_root.join("plugins/p.jar"), b"local").unwrap();

        let resolved = f
            .resolver
            .resolve(&ProjectPluginRef::new("p", "1.0"), &ctx(&f.project_root))
            .await
            .unwrap();
        assert_eq!(&resolved.bytes[..], b"registry-bytes");
        assert_eq!(resolved.source, format!("registry:url:{base}/good.jar"));
        assert_eq!(resolved.file_name, "good.jar");

        let err = f
            .resolver
            .resolve(&ProjectPluginRef::new("q", "1.0"), &ctx(&f.project_root))
            .await
            .unwrap_err();
        match err {
            ResolveError::AllSourcesFailed { failures, .. } => {
                let sources: Vec<_> = failures.iter().map(|f| f.source.clone()).collect();
                assert_eq!(
                    sources,
                    vec![format!("registry:url:{base}/broken.jar"), "registry:hangar:Q".to_string()]
                );
                assert!(failures[0].reason.contains("HTTP 500"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_versioned_local_jar_beats_plain_jar_and_cache() {
        let f = fixture();
        f.resolver
            .cache()
            .store("p", "1.0", "p-cached.jar", b"cached")
            .await
            .unwrap();
        std::fs::write(f.project_root.join("plugins/p-1.0.jar"), b"versioned").unwrap();
        std::fs::write(f.project_root.join("plugins/p.jar"), b"plain").unwrap();
        let reference = ProjectPluginRef::new("p", "1.0");

        let resolved = f
            .resolver
            .resolve(&reference, &ctx(&f.project_root))
            .await
            .unwrap();
        assert_eq!(&resolved.bytes[..], b"versioned");
        assert_eq!(resolved.source, "local:p-1.0.jar");

        std::fs::remove_file(f.project_root.join("plugins/p-1.0.jar")).unwrap();
        let resolved = f
            .resolver
            .resolve(&reference, &ctx(&f.project_root))
            .await
            .unwrap();
        assert_eq!(&resolved.bytes[..], b"plain");
        assert_eq!(resolved.source, "local:p.jar");
    }

    #[tokio::test]
    async fn test_unreadable_local_jar_is_reported() {
        let f = fixture();
        std::fs::create_dir_all(f.project_root.join("plugins/p.jar")).unwrap();

        let err = f
            .resolver
            .resolve(&ProjectPluginRef::new("p", "1.0"), &ctx(&f.project_root))
            .await
            .unwrap_err();

        match err {
            ResolveError::AllSourcesFailed { failures, .. } => {
                assert_eq!(failures.len(), 1);
                assert_eq!(failures[0].source, "local:p.jar");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_every_failure_is_reported() {
        let f = fixture();
        let reference = ProjectPluginRef::new("p", "1.0").with_source(PluginSource {
            provider: Some(ProviderKind::Hangar),
            upload_path: Some("missing.jar".into()),
            download_url: Some("http://127.0.0.1:9/p.jar".into()),
            slug: None,
        });

        let err = f
            .resolver
            .resolve(&reference, &ctx(&f.project_root))
            .await
            .unwrap_err();

        match err {
            ResolveError::AllSourcesFailed { failures, .. } => {
                let sources: Vec<_> = failures.iter().map(|f| f.source.as_str()).collect();
                assert_eq!(
                    sources,
                    vec!["upload:missing.jar", "url:http://127.0.0.1:9/p.jar", "hangar:p"]
                );
                assert!(failures[2].reason.contains("not available"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
