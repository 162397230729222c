//! Resolver errors

use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub type ResolveResult<T> = Result<T, ResolveError>;

/// One failed source attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFailure {
    /// Source label, e.g. `hangar:LuckPerms` or `url:https://...`
    pub source: String,
    pub reason: String,
}

impl SourceFailure {
    pub fn new(source: impl Into<String>, error: &ResolveError) -> Self {
        Self {
            source: source.into(),
            reason: error.to_string(),
        }
    }
}

impl fmt::Display for SourceFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.source, self.reason)
    }
}

#[derive(Debug, Error)]
pub enum ResolveError {
    /// Nothing could even be attempted for the plugin
    #[error(
        "no source configured for plugin '{plugin}' ({})",
        registry_detail(.registry_found, .registry_path)
    )]
    NoSourceConfigured {
        plugin: String,
        registry_path: PathBuf,
        /// Whether the registry file exists but lacks an entry for the plugin
        registry_found: bool,
    },

    /// Every attempted source failed
    #[error("failed to resolve plugin '{plugin}': {}", join_failures(.failures))]
    AllSourcesFailed {
        plugin: String,
        failures: Vec<SourceFailure>,
    },

    #[error("HTTP {status} from {url}")]
    Http { url: String, status: u16 },

    #[error("rate limited by {url} after {attempts} attempts")]
    RateLimited { url: String, attempts: u32 },

    #[error("request to {url} failed: {message}")]
    Request { url: String, message: String },

    #[error("{provider} has no version '{version}' of '{slug}' for this server")]
    VersionNotFound {
        provider: String,
        slug: String,
        version: String,
    },

    #[error("{provider} returned no downloadable file for '{slug}'")]
    NoDownload { provider: String, slug: String },

    #[error("invalid response from {url}: {message}")]
    InvalidResponse { url: String, message: String },

    #[error("invalid plugin registry {}: {message}", .path.display())]
    Registry { path: PathBuf, message: String },

    #[error("provider '{0}' is not available")]
    ProviderUnavailable(String),

    #[error("file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn registry_detail(registry_found: &bool, registry_path: &Path) -> String {
    if *registry_found {
        format!("no entry in registry {}", registry_path.display())
    } else {
        format!("registry not found at {}", registry_path.display())
    }
}

fn join_failures(failures: &[SourceFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
