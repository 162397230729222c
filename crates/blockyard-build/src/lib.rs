//! Blockyard Build - project to deterministic artifact
//!
//! The pipeline runs a fixed sequence: asset scan (when the inventory is
//! empty), definition passthrough, plugin resolution, config rendering, entry
//! merge, archive assembly, manifest rendering, and an optional push of the
//! outputs to a linked source repository.
//!
//! Identical inputs produce byte-identical archives: entries are written in
//! path order with a fixed modification time, and the build id is derived
//! from entry content.

#![deny(unsafe_code)]

pub mod assembler;
pub mod error;
pub mod pipeline;
pub mod render;
pub mod repository;
pub mod scan;
pub mod store;

pub use assembler::{content_build_id, ArtifactAssembler, AssembledArtifact, EntrySet};
pub use error::{BuildError, BuildResult};
pub use pipeline::{BuildPipeline, PipelineConfig};
pub use render::{
    template_variables, JsonManifestRenderer, ManifestRenderer, PlaceholderRenderer,
    TemplateRenderer,
};
pub use repository::{GitHubRepository, PushError, PushFile, SourceRepository};
pub use scan::{scan_assets, AssetScan};
pub use store::{InMemoryProjectStore, ProjectStore};
