//! Server setup and lifecycle management

use crate::api::create_router;
use crate::api::rest::state::AppState;
use crate::config::DaemonConfig;
use crate::error::{DaemonError, DaemonResult};
use crate::events::EventBus;
use crate::projects::load_projects;
use crate::runtime::ContainerRuntime;
use crate::storage::{InMemoryStorage, JobHistory, Storage};
use crate::supervisor::{BuildSupervisor, RunSupervisor};
use blockyard_build::{
    BuildPipeline, GitHubRepository, InMemoryProjectStore, PipelineConfig, ProjectStore,
    SourceRepository,
};
use blockyard_resolver::{
    HttpClient, InMemoryMetadataStore, PluginCache, PluginResolver, ProviderSet,
};
use blockyard_workspace::{WorkspaceManager, WorkspaceStateStore};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

/// Blockyard Daemon Server
pub struct Server {
    config: DaemonConfig,
    projects: Arc<dyn ProjectStore>,
    builds: Arc<BuildSupervisor>,
    runs: Arc<RunSupervisor>,
}

impl Server {
    /// Create a new server, restoring job history from the previous process
    pub async fn new(config: DaemonConfig) -> DaemonResult<Self> {
        let paths = &config.paths;
        for dir in [
            paths.projects_dir(),
            paths.cache_dir(),
            paths.output_dir(),
            paths.workspaces_dir(),
            paths.state_dir(),
            paths.history_dir(),
        ] {
            tokio::fs::create_dir_all(&dir).await?;
        }

        let projects: Arc<dyn ProjectStore> = Arc::new(InMemoryProjectStore::with_projects(
            load_projects(&paths.projects_dir()).await?,
        ));

        // Plugin resolution
        let http = HttpClient::new(
            config.resolver.user_agent.as_deref(),
            config.resolver.request_timeout(),
            config.resolver.retry_policy(),
        )
        .map_err(|e| DaemonError::Config(e.to_string()))?
        .with_github_token(config.repository.token());
        let resolver = Arc::new(PluginResolver::new(
            ProviderSet::standard(http.clone(), &config.resolver.endpoints),
            PluginCache::new(paths.cache_dir()),
            paths.registry_path(),
            Arc::new(InMemoryMetadataStore::new()),
            http,
        ));

        // Pushes are only possible with a token
        let repository: Option<Arc<dyn SourceRepository>> = match config.repository.token() {
            Some(token) => Some(Arc::new(
                GitHubRepository::new(
                    &config.repository.api_base,
                    Some(token),
                    Duration::from_secs(config.repository.timeout_secs),
                )
                .map_err(|e| DaemonError::Config(e.to_string()))?,
            )),
            None => {
                tracing::info!("No repository token configured, pushes disabled");
                None
            }
        };
        let pipeline = BuildPipeline::new(
            PipelineConfig {
                output_dir: paths.output_dir(),
            },
            projects.clone(),
            resolver,
        )
        .with_repository(repository);

        // Job storage
        let storage: Arc<dyn Storage> = Arc::new(InMemoryStorage::new());
        let history = Arc::new(JobHistory::new(paths.history_dir()));

        let builds = BuildSupervisor::new(storage.clone(), history.clone(), Arc::new(pipeline));
        let restored_builds = builds.restore().await?;

        let workspaces = Arc::new(WorkspaceManager::new(
            paths.workspaces_dir(),
            WorkspaceStateStore::new(paths.state_dir()),
        ));
        let runtime = Arc::new(ContainerRuntime::new(
            config.runtime.container_binary.clone(),
            config.runtime.stop_timeout(),
            config.runtime.simulated_run(),
        ));
        let runs = RunSupervisor::new(
            storage,
            history,
            projects.clone(),
            workspaces,
            runtime,
            EventBus::new(config.server.event_capacity),
            config.runtime.clone(),
        );
        let restored_runs = runs.restore().await?;

        tracing::info!(
            builds = restored_builds,
            runs = restored_runs,
            "Job history restored"
        );

        Ok(Self {
            config,
            projects,
            builds,
            runs,
        })
    }

    /// Run the server until a shutdown signal arrives, then stop live runs
    pub async fn run(self) -> DaemonResult<()> {
        let addr = self.config.server.listen_addr;

        let state = AppState::new(self.builds.clone(), self.runs.clone(), self.projects.clone());
        let app = create_router(state, self.config.server.enable_cors);

        let listener = TcpListener::bind(addr).await?;

        tracing::info!("Blockyard daemon listening on {}", addr);
        tracing::info!("Data directory: {}", self.config.paths.data_dir.display());

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| DaemonError::Server(e.to_string()))?;

        tracing::info!("Blockyard daemon shutting down");

        self.runs.shutdown().await;

        Ok(())
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install terminate handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        }
    }
}
