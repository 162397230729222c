//! Configuration for blockyard-daemon

use blockyard_resolver::{ProviderEndpoints, RetryPolicy};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

/// Main daemon configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Data directory layout
    #[serde(default)]
    pub paths: PathsConfig,

    /// Plugin resolution
    #[serde(default)]
    pub resolver: ResolverConfig,

    /// Server process runtime
    #[serde(default)]
    pub runtime: RuntimeConfig,

    /// Source repository push
    #[serde(default)]
    pub repository: RepositoryConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,

    /// Enable CORS
    #[serde(default = "default_true")]
    pub enable_cors: bool,

    /// Capacity of the run event channel
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            enable_cors: true,
            event_capacity: default_event_capacity(),
        }
    }
}

/// Everything on disk hangs off `data_dir`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Plugin registry file; defaults to `<data_dir>/registry.yaml`
    #[serde(default)]
    pub registry_file: Option<PathBuf>,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            registry_file: None,
        }
    }
}

impl PathsConfig {
    /// One directory per project, each holding `project.yaml`
    pub fn projects_dir(&self) -> PathBuf {
        self.data_dir.join("projects")
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.data_dir.join("cache")
    }

    /// Archives under `dist/`, manifests under `manifests/`
    pub fn output_dir(&self) -> PathBuf {
        self.data_dir.join("output")
    }

    pub fn workspaces_dir(&self) -> PathBuf {
        self.data_dir.join("workspaces")
    }

    pub fn state_dir(&self) -> PathBuf {
        self.data_dir.join("state")
    }

    /// Job history documents
    pub fn history_dir(&self) -> PathBuf {
        self.data_dir.join("history")
    }

    pub fn registry_path(&self) -> PathBuf {
        self.registry_file
            .clone()
            .unwrap_or_else(|| self.data_dir.join("registry.yaml"))
    }
}

/// Plugin resolution configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Provider base URLs
    #[serde(default)]
    pub endpoints: ProviderEndpoints,

    #[serde(default)]
    pub user_agent: Option<String>,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Attempts for rate-limited requests, including the first
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,

    /// Backoff when the server sends no `Retry-After`
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff_secs: u64,

    /// Cap on server-requested backoff
    #[serde(default = "default_max_backoff")]
    pub max_backoff_secs: u64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            endpoints: ProviderEndpoints::default(),
            user_agent: None,
            request_timeout_secs: default_request_timeout(),
            retry_attempts: default_retry_attempts(),
            retry_backoff_secs: default_retry_backoff(),
            max_backoff_secs: default_max_backoff(),
        }
    }
}

impl ResolverConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry_attempts,
            fixed_backoff: Duration::from_secs(self.retry_backoff_secs),
            max_backoff: Duration::from_secs(self.max_backoff_secs),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Server process runtime configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Container runtime CLI
    #[serde(default = "default_container_binary")]
    pub container_binary: String,

    #[serde(default = "default_image")]
    pub image: String,

    /// Port the server listens on inside the container
    #[serde(default = "default_minecraft_port")]
    pub internal_port: u16,

    /// First host port tried
    #[serde(default = "default_minecraft_port")]
    pub preferred_port: u16,

    /// Number of consecutive ports probed
    #[serde(default = "default_port_window")]
    pub port_window: u16,

    /// Host address probed and bound
    #[serde(default = "default_bind_host")]
    pub bind_host: IpAddr,

    /// `MEMORY` passed to the server image
    #[serde(default = "default_memory")]
    pub memory: String,

    /// Grace period given to `stop`
    #[serde(default = "default_stop_timeout")]
    pub stop_timeout_secs: u64,

    /// Length of a simulated run when no container runtime is installed
    #[serde(default = "default_simulated_run")]
    pub simulated_run_secs: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            container_binary: default_container_binary(),
            image: default_image(),
            internal_port: default_minecraft_port(),
            preferred_port: default_minecraft_port(),
            port_window: default_port_window(),
            bind_host: default_bind_host(),
            memory: default_memory(),
            stop_timeout_secs: default_stop_timeout(),
            simulated_run_secs: default_simulated_run(),
        }
    }
}

impl RuntimeConfig {
    pub fn stop_timeout(&self) -> Duration {
        Duration::from_secs(self.stop_timeout_secs)
    }

    pub fn simulated_run(&self) -> Duration {
        Duration::from_secs(self.simulated_run_secs)
    }
}

/// Source repository configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryConfig {
    #[serde(default = "default_github_api")]
    pub api_base: String,

    /// Environment variable holding the push token
    #[serde(default = "default_token_env")]
    pub token_env: String,

    #[serde(default = "default_request_timeout")]
    pub timeout_secs: u64,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            api_base: default_github_api(),
            token_env: default_token_env(),
            timeout_secs: default_request_timeout(),
        }
    }
}

impl RepositoryConfig {
    /// Token from the configured environment variable, if set and non-empty
    pub fn token(&self) -> Option<String> {
        std::env::var(&self.token_env)
            .ok()
            .filter(|t| !t.trim().is_empty())
    }
}

// Default value helpers
fn default_true() -> bool {
    true
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 8080)
}

fn default_event_capacity() -> usize {
    1024
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_request_timeout() -> u64 {
    60
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_backoff() -> u64 {
    2
}

fn default_max_backoff() -> u64 {
    30
}

fn default_container_binary() -> String {
    "docker".to_string()
}

fn default_image() -> String {
    "itzg/minecraft-server".to_string()
}

fn default_minecraft_port() -> u16 {
    25565
}

fn default_port_window() -> u16 {
    20
}

fn default_bind_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn default_memory() -> String {
    "2G".to_string()
}

fn default_stop_timeout() -> u64 {
    30
}

fn default_simulated_run() -> u64 {
    300
}

fn default_github_api() -> String {
    "https://api.github.com".to_string()
}

fn default_token_env() -> String {
    "GITHUB_TOKEN".to_string()
}

impl DaemonConfig {
    /// Load configuration: defaults, then the optional file, then
    /// `BLOCKYARD_<SECTION>__<KEY>` environment variables
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        // Add default configuration
        builder = builder.add_source(config::Config::try_from(&DaemonConfig::default())?);

        // Add file configuration if provided
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("BLOCKYARD")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }

    /// Configuration rooted at a data directory, everything else default
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            paths: PathsConfig {
                data_dir: data_dir.into(),
                registry_file: None,
            },
            ..Default::default()
        }
    }
}
