//! Blockyard plugin resolver
//!
//! Resolves one plugin reference to downloadable bytes. Sources are tried in a
//! fixed order and the first success wins:
//!
//! 1. explicit upload path relative to the project root
//! 2. explicit download URL
//! 3. named provider (Hangar, Modrinth, Spiget, GitHub releases)
//! 4. registry entries declared for the plugin id, in order
//! 5. a local jar named `<id>-<version>.jar` or `<id>.jar`
//! 6. a previously cached artifact for the id and version
//!
//! Every failed attempt is kept, and the aggregate is returned only when no
//! source succeeds.

pub mod cache;
pub mod error;
pub mod http;
pub mod metadata;
pub mod providers;
pub mod registry;
pub mod resolver;

pub use cache::PluginCache;
pub use error::{ResolveError, ResolveResult, SourceFailure};
pub use http::{HttpClient, RetryPolicy};
pub use metadata::{InMemoryMetadataStore, PluginMetadata, PluginMetadataStore};
pub use providers::{
    PluginProvider, ProviderArtifact, ProviderEndpoints, ProviderRequest, ProviderSet,
};
pub use registry::{PluginRegistry, RegistryEntry, RegistrySource};
pub use resolver::{PluginResolver, ResolveContext, ResolvedPlugin};
