//! Run job supervision
//!
//! A run moves `pending → running → {succeeded, failed, stopped}`, with
//! `stopping` reachable from pending or running. Admission (exclusivity,
//! build lookup, port allocation) happens synchronously in [`RunSupervisor::enqueue`];
//! everything after that belongs to the run's own task.

use crate::config::RuntimeConfig;
use crate::error::{StorageError, SupervisorError, SupervisorResult};
use crate::events::{EventBus, Subscription};
use crate::ports::PortAllocator;
use crate::runtime::{LaunchSpec, OutputEvent, ServerHandle, ServerRuntime};
use crate::storage::{recover_runs, JobHistory, RunUpdate, Storage};
use blockyard_build::ProjectStore;
use blockyard_types::{LogEntry, Project, ProjectId, RunId, RunJob, RunStatus};
use blockyard_workspace::WorkspaceManager;
use chrono::Utc;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

/// Handles of a run whose task is alive
struct LiveRun {
    stop: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
    console: Option<mpsc::Sender<String>>,
    container: Option<String>,
    simulated: bool,
    // Set by whichever side issues the runtime's stop first
    graceful_stop_issued: bool,
}

/// Everything the run task needs, fixed at admission
struct RunPlan {
    run_id: RunId,
    project: Project,
    artifact_path: PathBuf,
    manifest_build_id: String,
    port: u16,
}

pub struct RunSupervisor {
    storage: Arc<dyn Storage>,
    history: Arc<JobHistory>,
    projects: Arc<dyn ProjectStore>,
    workspaces: Arc<WorkspaceManager>,
    runtime: Arc<dyn ServerRuntime>,
    events: EventBus,
    ports: PortAllocator,
    config: RuntimeConfig,
    live: Mutex<HashMap<RunId, LiveRun>>,
    // Serialises admission so the exclusivity check and port pick see one world
    admission: Mutex<()>,
}

impl RunSupervisor {
    pub fn new(
        storage: Arc<dyn Storage>,
        history: Arc<JobHistory>,
        projects: Arc<dyn ProjectStore>,
        workspaces: Arc<WorkspaceManager>,
        runtime: Arc<dyn ServerRuntime>,
        events: EventBus,
        config: RuntimeConfig,
    ) -> Arc<Self> {
        let ports = PortAllocator::new(config.bind_host, config.preferred_port, config.port_window);
        Arc::new(Self {
            storage,
            history,
            projects,
            workspaces,
            runtime,
            events,
            ports,
            config,
            live: Mutex::new(HashMap::new()),
            admission: Mutex::new(()),
        })
    }

    /// Reload persisted runs; runs that were active lost their process
    pub async fn restore(&self) -> SupervisorResult<usize> {
        let mut runs = self.history.load_runs().await;
        let recovered = recover_runs(&mut runs);
        let count = runs.len();
        for run in runs {
            self.storage.upsert_run(run).await?;
        }
        if recovered > 0 {
            warn!(recovered, "Runs active before restart marked stopped");
            self.persist().await;
        }
        info!(count, "Run history restored");
        Ok(count)
    }

    /// Admit and start a run of the project's latest successful build.
    ///
    /// Every rejection happens before a job exists.
    #[instrument(skip(self), fields(project_id = %project_id))]
    pub async fn enqueue(self: &Arc<Self>, project_id: &ProjectId) -> SupervisorResult<RunJob> {
        let _admission = self.admission.lock().await;

        let project = self
            .projects
            .get_project(project_id)
            .await
            .map_err(|e| SupervisorError::ProjectStore(e.to_string()))?
            .ok_or_else(|| SupervisorError::ProjectNotFound(project_id.clone()))?;

        let runs = self.storage.list_runs_for_project(project_id).await?;
        if runs.iter().any(RunJob::is_active) {
            return Err(SupervisorError::RunActive(project_id.clone()));
        }

        let build = self
            .storage
            .latest_successful_build(project_id)
            .await?
            .ok_or_else(|| SupervisorError::NoSuccessfulBuild(project_id.clone()))?;
        let (Some(artifact_path), Some(manifest_build_id)) =
            (build.artifact_path.clone(), build.manifest_build_id.clone())
        else {
            return Err(SupervisorError::NoSuccessfulBuild(project_id.clone()));
        };

        let port = self.ports.allocate()?;
        let run = RunJob::new(
            project_id.clone(),
            build.id,
            artifact_path.clone(),
            self.workspaces.workspace_dir(project_id),
            port,
        );

        if let Err(e) = self.storage.admit_run(run.clone()).await {
            self.ports.release(port);
            return Err(match e {
                StorageError::Conflict(_) => SupervisorError::RunActive(project_id.clone()),
                other => SupervisorError::Storage(other),
            });
        }
        info!(run_id = %run.id, build_id = %build.id, port, "Run admitted");
        self.persist().await;
        self.events.publish_update(&run);

        let plan = RunPlan {
            run_id: run.id,
            project,
            artifact_path,
            manifest_build_id,
            port,
        };
        let (stop, stop_rx) = watch::channel(false);
        let supervisor = Arc::clone(self);

        // Held across the spawn so the task's teardown always finds its entry
        let mut live = self.live.lock().await;
        let task = tokio::spawn(async move { supervisor.drive(plan, stop_rx).await });
        live.insert(
            run.id,
            LiveRun {
                stop,
                task: Some(task),
                console: None,
                container: None,
                simulated: false,
                graceful_stop_issued: false,
            },
        );

        Ok(run)
    }

    pub async fn get(&self, id: &RunId) -> SupervisorResult<RunJob> {
        self.storage
            .get_run(id)
            .await?
            .ok_or_else(|| SupervisorError::NotFound {
                kind: "run",
                id: id.to_string(),
            })
    }

    pub async fn list(&self, project_id: Option<&ProjectId>) -> SupervisorResult<Vec<RunJob>> {
        let runs = match project_id {
            Some(project_id) => self.storage.list_runs_for_project(project_id).await?,
            None => self.storage.list_runs().await?,
        };
        Ok(runs)
    }

    /// Subscribe to run events, starting with a snapshot of every run
    pub async fn subscribe(&self) -> Subscription {
        self.events
            .subscribe(|| async {
                self.storage.list_runs().await.unwrap_or_else(|e| {
                    warn!(error = %e, "Failed to snapshot runs for subscriber");
                    Vec::new()
                })
            })
            .await
    }

    /// Write one line to the server console
    #[instrument(skip(self, command), fields(run_id = %id))]
    pub async fn send_command(&self, id: &RunId, command: &str) -> SupervisorResult<()> {
        let run = self.get(id).await?;
        let console = {
            let live = self.live.lock().await;
            live.get(id).and_then(|l| l.console.clone())
        };
        let console = match console {
            Some(console) if run.console_available => console,
            _ => return Err(SupervisorError::ConsoleUnavailable(id.to_string())),
        };

        let command = command.trim_end_matches(['\r', '\n']).to_string();
        console
            .send(command.clone())
            .await
            .map_err(|_| SupervisorError::ConsoleUnavailable(id.to_string()))?;
        self.log(&run, LogEntry::system(format!("> {}", command)))
            .await;
        Ok(())
    }

    /// Stop a run. Always ends in `stopped` with handles released, whatever
    /// the runtime's own stop command does.
    #[instrument(skip(self), fields(run_id = %id))]
    pub async fn stop(&self, id: &RunId) -> SupervisorResult<RunJob> {
        let run = self.get(id).await?;
        if !run.is_active() {
            return Ok(run);
        }

        let run = self
            .storage
            .update_run(
                id,
                Box::new(|r: &mut RunJob| {
                    if r.is_active() {
                        r.status = RunStatus::Stopping;
                    }
                }),
            )
            .await?;
        if !run.is_active() {
            return Ok(run);
        }
        self.events.publish_update(&run);
        self.persist().await;
        self.log(&run, LogEntry::system("Stop requested")).await;

        let (container, simulated, console, task) = {
            let mut live = self.live.lock().await;
            match live.get_mut(id) {
                Some(entry) => {
                    // Before launch returns there is no container yet; the run task
                    // stops it once it exists
                    if entry.container.is_some() {
                        entry.graceful_stop_issued = true;
                    }
                    (
                        entry.container.clone(),
                        entry.simulated,
                        entry.console.clone(),
                        entry.task.take(),
                    )
                }
                None => (None, false, None, None),
            }
        };

        // Graceful first: the runtime's stop command, or `stop` on a simulated console
        match (&container, simulated) {
            (Some(name), false) => {
                if let Err(e) = self.runtime.stop(name).await {
                    warn!(error = %e, "Graceful stop failed, killing process");
                    self.log(&run, LogEntry::system(format!("Graceful stop failed: {}", e)))
                        .await;
                }
            }
            (Some(_), true) => {
                if let Some(console) = console {
                    let _ = console.send("stop".to_string()).await;
                }
            }
            (None, _) => {}
        }

        if let Some(entry) = self.live.lock().await.get(id) {
            let _ = entry.stop.send(true);
        }

        let mut aborted = false;
        if let Some(mut task) = task {
            match tokio::time::timeout(self.config.stop_timeout(), &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    error!(error = %e, "Run task panicked");
                    aborted = true;
                }
                Err(_) => {
                    warn!("Run task did not finish in time, aborting");
                    task.abort();
                    aborted = true;
                }
            }
        }

        // The task releases its own port; only a task that never finished leaves it held
        let port = if aborted { run.port } else { None };
        self.teardown(&run.id, port, RunStatus::Stopped, None, None)
            .await;
        self.get(id).await
    }

    /// Stop every run that still has a live task
    pub async fn shutdown(&self) {
        let ids: Vec<RunId> = self.live.lock().await.keys().copied().collect();
        for id in ids {
            if let Err(e) = self.stop(&id).await {
                warn!(run_id = %id, error = %e, "Failed to stop run during shutdown");
            }
        }
    }

    #[instrument(
        skip(self, plan, stop_rx),
        fields(run_id = %plan.run_id, project_id = %plan.project.id)
    )]
    async fn drive(self: Arc<Self>, plan: RunPlan, mut stop_rx: watch::Receiver<bool>) {
        let run_id = plan.run_id;
        let Some(run) = self.load(&run_id).await else {
            self.teardown(&run_id, Some(plan.port), RunStatus::Failed, None, None)
                .await;
            return;
        };

        // Workspace first; a failed sync never launches anything
        self.log(
            &run,
            LogEntry::system(format!(
                "Syncing workspace to build {}",
                plan.manifest_build_id
            )),
        )
        .await;
        let outcome = match self
            .workspaces
            .sync_project(&plan.project.id, &plan.artifact_path, &plan.manifest_build_id)
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(error = %e, "Workspace sync failed");
                self.log(&run, LogEntry::system(format!("Workspace sync failed: {}", e)))
                    .await;
                self.teardown(
                    &run_id,
                    Some(plan.port),
                    RunStatus::Failed,
                    None,
                    Some(format!("workspace sync failed: {}", e)),
                )
                .await;
                return;
            }
        };

        let dirty = outcome.dirty_paths();
        let build_id = plan.manifest_build_id.clone();
        let dirty_for_status = dirty.clone();
        self.update(
            &run_id,
            Box::new(move |r: &mut RunJob| {
                r.workspace.last_build_id = Some(build_id);
                r.workspace.synced_at = Some(Utc::now());
                r.workspace.dirty_paths = dirty_for_status;
            }),
        )
        .await;
        self.log(
            &run,
            LogEntry::system(format!(
                "Workspace synced: {} written, {} deleted, {} preserved",
                outcome.report.written.len(),
                outcome.report.deleted.len(),
                dirty.len()
            )),
        )
        .await;
        if !dirty.is_empty() {
            self.log(
                &run,
                LogEntry::system(format!("Local edits preserved: {}", dirty.join(", "))),
            )
            .await;
        }

        if *stop_rx.borrow() {
            self.teardown(&run_id, Some(plan.port), RunStatus::Stopped, None, None)
                .await;
            return;
        }

        let spec = LaunchSpec {
            name: container_name(&plan.project.id, &run_id),
            image: self.config.image.clone(),
            port: plan.port,
            internal_port: self.config.internal_port,
            workspace: self.workspaces.workspace_dir(&plan.project.id),
            server_type: plan.project.loader.server_type().to_string(),
            minecraft_version: plan.project.minecraft_version.clone(),
            memory: self.config.memory.clone(),
        };
        let handle = match self.runtime.launch(&spec).await {
            Ok(handle) => handle,
            Err(e) => {
                error!(error = %e, "Server launch failed");
                self.log(&run, LogEntry::system(format!("Launch failed: {}", e)))
                    .await;
                self.teardown(
                    &run_id,
                    Some(plan.port),
                    RunStatus::Failed,
                    None,
                    Some(e.to_string()),
                )
                .await;
                return;
            }
        };

        let ServerHandle {
            name,
            simulated,
            mut events,
            console,
            kill,
        } = handle;
        {
            let mut live = self.live.lock().await;
            if let Some(entry) = live.get_mut(&run_id) {
                entry.console = Some(console);
                entry.container = Some(name.clone());
                entry.simulated = simulated;
            }
        }

        let container = name.clone();
        let run = self
            .update(
                &run_id,
                Box::new(move |r: &mut RunJob| {
                    r.container_name = Some(container);
                    r.simulated = simulated;
                    r.console_available = true;
                    if r.status == RunStatus::Pending {
                        r.mark_running();
                    }
                }),
            )
            .await
            .unwrap_or(run);
        let mode = if simulated { " (simulated)" } else { "" };
        self.log(
            &run,
            LogEntry::system(format!("Server {} started on port {}{}", name, plan.port, mode)),
        )
        .await;

        let mut kill = Some(kill);
        let mut stop_requested = *stop_rx.borrow();
        if stop_requested {
            debug!("Stop arrived during launch, terminating server");
            self.stop_launched(&run, &name, simulated).await;
            if let Some(kill) = kill.take() {
                let _ = kill.send(());
            }
        }
        let exit_code = loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(OutputEvent::Line(stream, line)) => {
                        self.log(&run, LogEntry::new(stream, line)).await;
                    }
                    Some(OutputEvent::ConsoleClosed) => {
                        self.update(
                            &run_id,
                            Box::new(|r: &mut RunJob| r.console_available = false),
                        )
                        .await;
                        self.log(&run, LogEntry::system("Server console closed")).await;
                    }
                    Some(OutputEvent::Exited(code)) => break code,
                    None => break None,
                },
                changed = stop_rx.changed(), if !stop_requested => {
                    if changed.is_err() || *stop_rx.borrow() {
                        stop_requested = true;
                        debug!("Stop signalled, terminating process");
                        self.stop_launched(&run, &name, simulated).await;
                        if let Some(kill) = kill.take() {
                            let _ = kill.send(());
                        }
                    }
                }
            }
        };

        let (status, error) = if stop_requested {
            (RunStatus::Stopped, None)
        } else {
            match exit_code {
                Some(0) => (RunStatus::Succeeded, None),
                Some(code) => (
                    RunStatus::Failed,
                    Some(format!("server exited with code {}", code)),
                ),
                None => (
                    RunStatus::Failed,
                    Some("server terminated without an exit code".to_string()),
                ),
            }
        };
        self.log(
            &run,
            LogEntry::system(match exit_code {
                Some(code) => format!("Server exited with code {}", code),
                None => "Server exited".to_string(),
            }),
        )
        .await;
        self.teardown(&run_id, Some(plan.port), status, exit_code, error)
            .await;
    }

    /// Issue the runtime's stop for a launched container unless `stop` already did.
    /// Killing the local process only ends the runtime's client, not the container.
    async fn stop_launched(&self, run: &RunJob, name: &str, simulated: bool) {
        if simulated {
            return;
        }
        let issue = {
            let mut live = self.live.lock().await;
            match live.get_mut(&run.id) {
                Some(entry) if entry.graceful_stop_issued => false,
                Some(entry) => {
                    entry.graceful_stop_issued = true;
                    true
                }
                None => true,
            }
        };
        if !issue {
            return;
        }
        if let Err(e) = self.runtime.stop(name).await {
            warn!(error = %e, "Graceful stop failed, killing process");
            self.log(run, LogEntry::system(format!("Graceful stop failed: {}", e)))
                .await;
        }
    }

    /// Release handles and move the run to a terminal status once
    async fn teardown(
        &self,
        id: &RunId,
        port: Option<u16>,
        status: RunStatus,
        exit_code: Option<i32>,
        error: Option<String>,
    ) {
        if let Some(port) = port {
            self.ports.release(port);
        }
        self.live.lock().await.remove(id);

        let finished = self
            .update(
                id,
                Box::new(move |r: &mut RunJob| {
                    if !r.is_active() {
                        return;
                    }
                    // A requested stop wins over however the process ended
                    let status = if r.status == RunStatus::Stopping {
                        RunStatus::Stopped
                    } else {
                        status
                    };
                    r.exit_code = exit_code;
                    if status == RunStatus::Failed {
                        r.error = error;
                    }
                    r.finish(status);
                }),
            )
            .await;
        if let Some(run) = finished {
            info!(run_id = %id, status = ?run.status, "Run finished");
        }
    }

    async fn load(&self, id: &RunId) -> Option<RunJob> {
        match self.storage.get_run(id).await {
            Ok(run) => run,
            Err(e) => {
                error!(run_id = %id, error = %e, "Failed to load run job");
                None
            }
        }
    }

    /// Apply a change, then persist and publish the result
    async fn update(&self, id: &RunId, change: RunUpdate) -> Option<RunJob> {
        match self.storage.update_run(id, change).await {
            Ok(run) => {
                self.events.publish_update(&run);
                self.persist().await;
                Some(run)
            }
            Err(e) => {
                error!(run_id = %id, error = %e, "Failed to update run job");
                None
            }
        }
    }

    async fn log(&self, run: &RunJob, entry: LogEntry) {
        if let Err(e) = self.storage.append_run_log(&run.id, entry.clone()).await {
            warn!(run_id = %run.id, error = %e, "Failed to append run log");
        }
        self.events.publish_log(run.id, &run.project_id, entry);
    }

    async fn persist(&self) {
        let storage = &self.storage;
        if let Err(e) = self.history.save_runs_with(|| storage.list_runs()).await {
            warn!(error = %e, "Failed to persist run history");
        }
    }
}

fn container_name(project_id: &ProjectId, run_id: &RunId) -> String {
    let run = run_id.to_string();
    let short: String = run.chars().filter(|c| *c != '-').take(8).collect();
    format!("blockyard-{}-{}", project_id, short)
}
