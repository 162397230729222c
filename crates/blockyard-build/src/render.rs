//! Config template and manifest rendering

use crate::error::{BuildError, BuildResult};
use blockyard_types::{Manifest, Project};
use std::collections::BTreeMap;

/// Renders one config template
pub trait TemplateRenderer: Send + Sync {
    fn render(
        &self,
        path: &str,
        template: &str,
        variables: &BTreeMap<String, String>,
    ) -> BuildResult<String>;
}

/// Substitutes `${name}` placeholders; unknown names are left as written
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaceholderRenderer;

impl TemplateRenderer for PlaceholderRenderer {
    fn render(
        &self,
        path: &str,
        template: &str,
        variables: &BTreeMap<String, String>,
    ) -> BuildResult<String> {
        let mut out = String::with_capacity(template.len());
        let mut rest = template;

        while let Some(start) = rest.find("${") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let Some(end) = after.find('}') else {
                return Err(BuildError::Render {
                    path: path.to_string(),
                    message: "unterminated placeholder".to_string(),
                });
            };

            let name = after[..end].trim();
            match variables.get(name) {
                Some(value) => out.push_str(value),
                None => out.push_str(&rest[start..start + 2 + end + 1]),
            }
            rest = &after[end + 1..];
        }

        out.push_str(rest);
        Ok(out)
    }
}

/// Project variables, overlays, then built-ins
pub fn template_variables(project: &Project) -> BTreeMap<String, String> {
    let mut vars = project.effective_variables();
    vars.insert("project.id".into(), project.id.to_string());
    vars.insert(
        "project.name".into(),
        project
            .name
            .clone()
            .unwrap_or_else(|| project.id.to_string()),
    );
    vars.insert(
        "minecraft.version".into(),
        project.minecraft_version.clone(),
    );
    vars.insert("minecraft.loader".into(), project.loader.as_str().into());
    vars.insert("world.name".into(), project.world.name.clone());
    vars.insert("world.mode".into(), project.world.mode.clone());
    vars.insert(
        "world.seed".into(),
        project.world.seed.clone().unwrap_or_default(),
    );
    vars
}

/// Produces the manifest document
pub trait ManifestRenderer: Send + Sync {
    fn render(&self, manifest: &Manifest) -> BuildResult<Vec<u8>>;
}

/// Pretty-printed JSON with a trailing newline
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonManifestRenderer;

impl ManifestRenderer for JsonManifestRenderer {
    fn render(&self, manifest: &Manifest) -> BuildResult<Vec<u8>> {
        let mut body =
            serde_json::to_vec_pretty(manifest).map_err(|e| BuildError::Manifest(e.to_string()))?;
        body.push(b'\n');
        Ok(body)
    }
}
