//! Blockyard Types - Core types for server builds and runs
//!
//! Blockyard turns a declarative server project (plugins, config templates,
//! Minecraft version and loader) into a deterministic artifact, then runs that
//! artifact against a live, user-editable workspace.
//!
//! ## Key Concepts
//!
//! - **Project**: Declarative server definition, read-only to the core
//! - **BuildJob**: One execution of the build pipeline for a project
//! - **RunJob**: One supervised server process started from a build artifact
//! - **WorkspaceState**: Baseline hashes the reconciler owns in a workspace
//! - **Manifest**: JSON identity document for an artifact
//! - **RunEvent**: Payloads carried by the live status stream

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod build;
pub mod digest;
pub mod events;
pub mod ids;
pub mod manifest;
pub mod project;
pub mod run;
pub mod workspace;

// Re-export main types
pub use build::{BuildJob, BuildOutcome, BuildStatus};
pub use digest::sha256_hex;
pub use events::RunEvent;
pub use ids::{BuildId, ProjectId, RunId};
pub use manifest::{
    ArtifactDescriptor, ConfigDescriptor, Manifest, MinecraftDescriptor, PluginDescriptor,
    RepositoryDescriptor, WorldDescriptor,
};
pub use project::{
    is_relative_path, ConfigRef, Loader, Overlay, PluginSource, Project, ProjectPluginRef,
    ProjectValidationError, ProviderKind, RepositoryLink, WorldSettings,
};
pub use run::{LogEntry, LogStream, RunJob, RunStatus, WorkspaceStatus};
pub use workspace::WorkspaceState;
