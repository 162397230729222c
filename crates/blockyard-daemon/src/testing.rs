//! Shared fixtures for daemon tests

use crate::api::rest::AppState;
use crate::config::RuntimeConfig;
use crate::events::EventBus;
use crate::runtime::ContainerRuntime;
use crate::storage::{InMemoryStorage, JobHistory, Storage};
use crate::supervisor::{BuildSupervisor, RunSupervisor};
use blockyard_build::{BuildPipeline, InMemoryProjectStore, PipelineConfig, ProjectStore};
use blockyard_resolver::{
    HttpClient, InMemoryMetadataStore, PluginCache, PluginResolver, ProviderSet, RetryPolicy,
};
use blockyard_types::{BuildJob, ConfigRef, Project, ProjectId, ProjectPluginRef};
use blockyard_workspace::{WorkspaceManager, WorkspaceStateStore};
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Data dir holding project `lobby`: cached plugin `P@1.0` plus one config
pub struct Fixture {
    pub dir: tempfile::TempDir,
    pub store: InMemoryProjectStore,
    pub resolver: Arc<PluginResolver>,
}

impl Fixture {
    pub async fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("projects/lobby");
        std::fs::create_dir_all(root.join("templates")).unwrap();
        std::fs::write(
            root.join("templates/server.properties"),
            "motd=${motd}\nserver-port=25565\n",
        )
        .unwrap();
        std::fs::write(root.join("project.yaml"), "id: lobby\nminecraftVersion: 1.20.4\n")
            .unwrap();

        let cache = PluginCache::new(dir.path().join("cache"));
        let cached = cache.store("P", "1.0", "P.jar", b"plugin-bytes").await.unwrap();

        let mut project = Project::new("lobby", "1.20.4", root);
        project.variables.insert("motd".into(), "Welcome".into());
        let mut plugin = ProjectPluginRef::new("P", "1.0");
        plugin.cached_path = Some(cached);
        project.plugins.push(plugin);
        project.configs.push(ConfigRef {
            path: "server.properties".into(),
            template: "templates/server.properties".into(),
        });

        let http = HttpClient::new(None, Duration::from_secs(1), RetryPolicy::default()).unwrap();
        let resolver = Arc::new(PluginResolver::new(
            ProviderSet::new(),
            cache,
            dir.path().join("registry.yaml"),
            Arc::new(InMemoryMetadataStore::new()),
            http,
        ));

        Self {
            store: InMemoryProjectStore::with_projects([project]),
            dir,
            resolver,
        }
    }

    pub fn project_root(&self) -> PathBuf {
        self.dir.path().join("projects/lobby")
    }

    pub fn history_dir(&self) -> PathBuf {
        self.dir.path().join("history")
    }

    pub fn workspaces_dir(&self) -> PathBuf {
        self.dir.path().join("workspaces")
    }

    pub fn state_dir(&self) -> PathBuf {
        self.dir.path().join("state")
    }

    pub fn projects(&self) -> Arc<dyn ProjectStore> {
        Arc::new(self.store.clone())
    }

    pub fn pipeline(&self) -> BuildPipeline {
        BuildPipeline::new(
            PipelineConfig {
                output_dir: self.dir.path().join("output"),
            },
            self.projects(),
            self.resolver.clone(),
        )
    }

    /// Fully wired API state over this data dir, with a simulated server runtime
    pub fn app_state(&self) -> AppState {
        let storage: Arc<dyn Storage> = Arc::new(InMemoryStorage::new());
        let history = Arc::new(JobHistory::new(self.history_dir()));
        let builds =
            BuildSupervisor::new(storage.clone(), history.clone(), Arc::new(self.pipeline()));
        let workspaces = Arc::new(WorkspaceManager::new(
            self.workspaces_dir(),
            WorkspaceStateStore::new(self.state_dir()),
        ));
        let runtime = Arc::new(ContainerRuntime::new(
            "blockyard-no-such-runtime",
            Duration::from_secs(1),
            Duration::from_secs(3600),
        ));
        let runs = RunSupervisor::new(
            storage,
            history,
            self.projects(),
            workspaces,
            runtime,
            EventBus::new(64),
            RuntimeConfig {
                bind_host: IpAddr::V4(Ipv4Addr::LOCALHOST),
                preferred_port: free_port(),
                ..Default::default()
            },
        );
        AppState::new(builds, runs, self.projects())
    }

    /// Run the pipeline directly and record a succeeded job
    pub async fn succeeded_build(&self, storage: &dyn Storage) -> BuildJob {
        let project_id = ProjectId::new("lobby");
        let outcome = self.pipeline().execute(&project_id).await.unwrap();
        let mut job = BuildJob::new(project_id);
        job.mark_running();
        job.mark_succeeded(outcome);
        storage.upsert_build(job.clone()).await.unwrap();
        job
    }
}

/// A port nothing is bound to right now
pub fn free_port() -> u16 {
    std::net::TcpListener::bind(("127.0.0.1", 0))
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}
