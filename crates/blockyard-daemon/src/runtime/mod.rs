//! Server process runtime
//!
//! A launched server is observed through [`ServerHandle`]: one ordered stream
//! of output lines ending in an exit event, a console sender feeding the
//! process input, and a kill switch.

mod container;
mod simulated;

pub use container::ContainerRuntime;
pub use simulated::launch_simulated;

use crate::error::RuntimeResult;
use async_trait::async_trait;
use blockyard_types::LogStream;
use std::path::PathBuf;
use tokio::sync::{mpsc, oneshot};

/// Everything needed to start one server
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    /// Container name
    pub name: String,
    pub image: String,
    /// Host port
    pub port: u16,
    /// Port the server listens on inside the container
    pub internal_port: u16,
    /// Mounted as the server data volume
    pub workspace: PathBuf,
    /// `TYPE` passed to the image
    pub server_type: String,
    pub minecraft_version: String,
    pub memory: String,
}

impl LaunchSpec {
    /// Arguments for `<runtime> run`
    pub fn run_args(&self) -> Vec<String> {
        vec![
            "run".to_string(),
            "--rm".to_string(),
            "--name".to_string(),
            self.name.clone(),
            "-i".to_string(),
            "-p".to_string(),
            format!("{}:{}", self.port, self.internal_port),
            "-v".to_string(),
            format!("{}:/data", self.workspace.display()),
            "-e".to_string(),
            format!("TYPE={}", self.server_type),
            "-e".to_string(),
            format!("VERSION={}", self.minecraft_version),
            "-e".to_string(),
            format!("MEMORY={}", self.memory),
            "-e".to_string(),
            "EULA=TRUE".to_string(),
            self.image.clone(),
        ]
    }
}

/// Output of a running server, in arrival order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputEvent {
    Line(LogStream, String),
    /// The process stopped accepting input; the console is gone for good
    ConsoleClosed,
    /// Consumers stop reading here; `None` when killed by a signal
    Exited(Option<i32>),
}

/// Live server process
#[derive(Debug)]
pub struct ServerHandle {
    pub name: String,
    pub simulated: bool,
    pub events: mpsc::Receiver<OutputEvent>,
    /// Lines written to the process input; closed once input is gone
    pub console: mpsc::Sender<String>,
    /// Force-terminate; dropping it has the same effect
    pub kill: oneshot::Sender<()>,
}

#[async_trait]
pub trait ServerRuntime: Send + Sync {
    /// Start a server. A missing runtime binary falls back to a simulated run.
    async fn launch(&self, spec: &LaunchSpec) -> RuntimeResult<ServerHandle>;

    /// Ask the runtime to stop a named server gracefully
    async fn stop(&self, name: &str) -> RuntimeResult<()>;
}
