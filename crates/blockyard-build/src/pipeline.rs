//! Build pipeline execution

use crate::assembler::{content_build_id, ArtifactAssembler, AssembledArtifact, EntrySet};
use crate::error::{BuildError, BuildResult};
use crate::render::{
    template_variables, JsonManifestRenderer, ManifestRenderer, PlaceholderRenderer,
    TemplateRenderer,
};
use crate::repository::{PushFile, SourceRepository};
use crate::scan::{list_files, scan_assets};
use crate::store::ProjectStore;
use blockyard_resolver::{PluginResolver, ResolveContext, ResolvedPlugin};
use blockyard_types::{
    sha256_hex, ArtifactDescriptor, BuildOutcome, ConfigDescriptor, Manifest,
    MinecraftDescriptor, PluginDescriptor, Project, ProjectId, RepositoryDescriptor,
    WorldDescriptor,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Project files copied verbatim into every artifact
const DEFINITION_FILES: &[&str] = &["project.yaml", "project.yml", "project.json"];
const DEFINITION_DIRS: &[&str] = &["overlays", "profiles"];

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Root for `dist/` archives and `manifests/` documents
    pub output_dir: PathBuf,
}

pub struct BuildPipeline {
    projects: Arc<dyn ProjectStore>,
    resolver: Arc<PluginResolver>,
    templates: Arc<dyn TemplateRenderer>,
    manifests: Arc<dyn ManifestRenderer>,
    assembler: ArtifactAssembler,
    repository: Option<Arc<dyn SourceRepository>>,
}

/// A rendered config, ready for the archive
struct RenderedConfig {
    path: String,
    bytes: Vec<u8>,
}

impl BuildPipeline {
    pub fn new(
        config: PipelineConfig,
        projects: Arc<dyn ProjectStore>,
        resolver: Arc<PluginResolver>,
    ) -> Self {
        Self {
            projects,
            resolver,
            templates: Arc::new(PlaceholderRenderer),
            manifests: Arc::new(JsonManifestRenderer),
            assembler: ArtifactAssembler::new(config.output_dir),
            repository: None,
        }
    }

    pub fn with_template_renderer(mut self, renderer: Arc<dyn TemplateRenderer>) -> Self {
        self.templates = renderer;
        self
    }

    pub fn with_manifest_renderer(mut self, renderer: Arc<dyn ManifestRenderer>) -> Self {
        self.manifests = renderer;
        self
    }

    /// Enable pushes for projects linked to a repository
    pub fn with_repository(mut self, repository: Option<Arc<dyn SourceRepository>>) -> Self {
        self.repository = repository;
        self
    }

    pub fn projects(&self) -> &Arc<dyn ProjectStore> {
        &self.projects
    }

    /// Run every step for one project
    #[instrument(skip(self), fields(project_id = %project_id))]
    pub async fn execute(&self, project_id: &ProjectId) -> BuildResult<BuildOutcome> {
        let mut project = self
            .projects
            .get_project(project_id)
            .await?
            .ok_or_else(|| BuildError::ProjectNotFound(project_id.clone()))?;
        project.validate()?;

        if project.inventory_is_empty() {
            let scan = scan_assets(&project.root).await?;
            if !scan.is_empty() {
                info!(
                    plugins = scan.plugins.len(),
                    configs = scan.configs.len(),
                    "Populated project inventory from assets"
                );
                scan.apply(&mut project);
                project.validate()?;
                self.projects.save_project(project.clone()).await?;
            }
        }

        let definitions = collect_definitions(&project.root).await?;
        let plugins = self.resolve_plugins(&mut project).await?;
        let configs = self.render_configs(&project).await?;

        let mut entries = EntrySet::new();
        for (path, bytes) in definitions {
            entries.insert(path, bytes);
        }
        for config in &configs {
            entries.insert(config.path.clone(), config.bytes.clone());
        }
        for plugin in &plugins {
            entries.insert(format!("plugins/{}", plugin.file_name), plugin.bytes.to_vec());
        }

        let build_id = content_build_id(&entries);
        let mut manifest = base_manifest(&project, &build_id, &plugins, &configs);
        entries.insert(
            format!("manifests/{}.json", build_id),
            self.manifests.render(&manifest)?,
        );
        debug!(build_id = %build_id, entries = entries.len(), "Entry set merged");

        let artifact = self
            .assembler
            .assemble(project.id.as_str(), &build_id, entries)
            .await?;

        manifest.artifact = Some(ArtifactDescriptor {
            zip_path: artifact.relative_path.clone(),
            sha256: artifact.sha256.clone(),
            size: artifact.size,
        });
        manifest.repository = project.repository.as_ref().map(|link| RepositoryDescriptor {
            url: link.url.clone(),
            full_name: link.full_name.clone(),
            default_branch: link.default_branch.clone(),
            commit: None,
        });

        let manifest_path = self
            .assembler
            .output_dir()
            .join("manifests")
            .join(format!("{}.json", build_id));
        let manifest_bytes = self.manifests.render(&manifest)?;
        write_file(&manifest_path, &manifest_bytes).await?;

        let (commit, push_error) = self
            .push(&project, &mut manifest, &manifest_bytes, &artifact)
            .await;
        if commit.is_some() {
            write_file(&manifest_path, &self.manifests.render(&manifest)?).await?;
        }

        info!(build_id = %build_id, sha256 = %artifact.sha256, "Build finished");
        Ok(BuildOutcome {
            manifest_build_id: build_id,
            manifest_path,
            artifact_path: artifact.zip_path,
            artifact_sha256: artifact.sha256,
            artifact_size: artifact.size,
            commit,
            push_error,
        })
    }

    async fn resolve_plugins(&self, project: &mut Project) -> BuildResult<Vec<ResolvedPlugin>> {
        let mut resolved = Vec::with_capacity(project.plugins.len());
        {
            let ctx = ResolveContext {
                project_root: &project.root,
                loader: project.loader,
                minecraft_version: &project.minecraft_version,
            };
            for reference in &project.plugins {
                resolved.push(self.resolver.resolve(reference, &ctx).await?);
            }
        }

        let updated: Vec<_> = project
            .plugins
            .iter()
            .zip(&resolved)
            .map(|(reference, plugin)| plugin.updated_ref(reference))
            .collect();
        if updated != project.plugins {
            project.plugins = updated;
            if let Err(e) = self.projects.save_project(project.clone()).await {
                warn!(error = %e, "Failed to record resolved plugins on project");
            }
        }

        Ok(resolved)
    }

    async fn render_configs(&self, project: &Project) -> BuildResult<Vec<RenderedConfig>> {
        let variables = template_variables(project);
        let mut rendered = Vec::with_capacity(project.configs.len());

        for config in &project.configs {
            let template_path = project.root.join(&config.template);
            let template = match tokio::fs::read(&template_path).await {
                Ok(bytes) => String::from_utf8(bytes).map_err(|e| BuildError::Render {
                    path: config.template.clone(),
                    message: e.to_string(),
                })?,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    return Err(BuildError::TemplateNotFound(template_path))
                }
                Err(e) => return Err(e.into()),
            };

            let output = self.templates.render(&config.path, &template, &variables)?;
            rendered.push(RenderedConfig {
                path: config.path.clone(),
                bytes: output.into_bytes(),
            });
        }

        Ok(rendered)
    }

    /// Best-effort push; never fails the build
    async fn push(
        &self,
        project: &Project,
        manifest: &mut Manifest,
        manifest_bytes: &[u8],
        artifact: &AssembledArtifact,
    ) -> (Option<String>, Option<String>) {
        let (Some(link), Some(repository)) = (&project.repository, &self.repository) else {
            return (None, None);
        };

        let archive = match tokio::fs::read(&artifact.zip_path).await {
            Ok(bytes) => bytes,
            Err(e) => return (None, Some(e.to_string())),
        };
        let files = [
            PushFile {
                path: format!("manifests/{}.json", manifest.build_id),
                content: manifest_bytes.to_vec(),
            },
            PushFile {
                path: artifact.relative_path.clone(),
                content: archive,
            },
        ];
        let message = format!("Build {} for {}", manifest.build_id, project.id);

        match repository.push(link, &message, &files).await {
            Ok(commit) => {
                if let Some(descriptor) = manifest.repository.as_mut() {
                    descriptor.commit = Some(commit.clone());
                }
                (Some(commit), None)
            }
            Err(e) => {
                warn!(repository = %link.full_name, error = %e, "Repository push failed");
                (None, Some(e.to_string()))
            }
        }
    }
}

fn base_manifest(
    project: &Project,
    build_id: &str,
    plugins: &[ResolvedPlugin],
    configs: &[RenderedConfig],
) -> Manifest {
    Manifest {
        project_id: project.id.to_string(),
        build_id: build_id.to_string(),
        minecraft: MinecraftDescriptor {
            loader: project.loader.as_str().to_string(),
            version: project.minecraft_version.clone(),
        },
        world: WorldDescriptor {
            mode: project.world.mode.clone(),
            seed: project.world.seed.clone(),
            name: project.world.name.clone(),
        },
        plugins: plugins
            .iter()
            .map(|p| PluginDescriptor {
                id: p.id.clone(),
                version: p.resolved_version.clone(),
                sha256: p.sha256.clone(),
                provider: p.provider.clone(),
                source: Some(p.source.clone()),
                cache_path: Some(p.cache_path.display().to_string()),
            })
            .collect(),
        configs: configs
            .iter()
            .map(|c| ConfigDescriptor {
                path: c.path.clone(),
                sha256: sha256_hex(&c.bytes),
            })
            .collect(),
        artifact: None,
        repository: None,
    }
}

/// Definition files and overlay/profile directories, verbatim
async fn collect_definitions(root: &Path) -> BuildResult<Vec<(String, Vec<u8>)>> {
    let mut out = Vec::new();

    for name in DEFINITION_FILES {
        match tokio::fs::read(root.join(name)).await {
            Ok(bytes) => out.push((name.to_string(), bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
    }

    for dir in DEFINITION_DIRS {
        for rel in list_files(&root.join(dir), true).await? {
            let bytes = tokio::fs::read(root.join(dir).join(&rel)).await?;
            out.push((format!("{}/{}", dir, rel), bytes));
        }
    }

    Ok(out)
}

async fn write_file(path: &Path, bytes: &[u8]) -> BuildResult<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, bytes).await?;
    Ok(())
}
