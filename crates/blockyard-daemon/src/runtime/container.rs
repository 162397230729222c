//! Container runtime driven through its CLI

use super::{launch_simulated, LaunchSpec, OutputEvent, ServerHandle, ServerRuntime};
use crate::error::{RuntimeError, RuntimeResult};
use async_trait::async_trait;
use blockyard_types::LogStream;
use std::io::ErrorKind;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::{ChildStdin, Command};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, instrument, warn};

const EVENT_BUFFER: usize = 1024;
const CONSOLE_BUFFER: usize = 64;

/// `docker`-compatible CLI runtime
#[derive(Debug, Clone)]
pub struct ContainerRuntime {
    binary: String,
    stop_timeout: Duration,
    simulated_run: Duration,
}

impl ContainerRuntime {
    pub fn new(binary: impl Into<String>, stop_timeout: Duration, simulated_run: Duration) -> Self {
        Self {
            binary: binary.into(),
            stop_timeout,
            simulated_run,
        }
    }
}

#[async_trait]
impl ServerRuntime for ContainerRuntime {
    #[instrument(skip(self, spec), fields(name = %spec.name, port = spec.port))]
    async fn launch(&self, spec: &LaunchSpec) -> RuntimeResult<ServerHandle> {
        let mut child = match Command::new(&self.binary)
            .args(spec.run_args())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
        {
            Ok(child) => child,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!(binary = %self.binary, "Container runtime not installed, simulating server");
                return Ok(launch_simulated(spec, self.simulated_run));
            }
            Err(e) => {
                return Err(RuntimeError::Spawn {
                    binary: self.binary.clone(),
                    message: e.to_string(),
                })
            }
        };
        info!(pid = ?child.id(), "Server container started");

        let (tx, events) = mpsc::channel(EVENT_BUFFER);
        let stdout = child
            .stdout
            .take()
            .map(|out| tokio::spawn(forward_lines(out, LogStream::Stdout, tx.clone())));
        let stderr = child
            .stderr
            .take()
            .map(|err| tokio::spawn(forward_lines(err, LogStream::Stderr, tx.clone())));

        let (console, console_rx) = mpsc::channel(CONSOLE_BUFFER);
        if let Some(stdin) = child.stdin.take() {
            tokio::spawn(write_console(stdin, console_rx, tx.clone()));
        }

        let (kill, kill_rx) = oneshot::channel::<()>();
        tokio::spawn(async move {
            let status = tokio::select! {
                status = child.wait() => status,
                _ = kill_rx => {
                    debug!("Killing server process");
                    if let Err(e) = child.kill().await {
                        warn!(error = %e, "Failed to kill server process");
                    }
                    child.wait().await
                }
            };
            // Output is drained before the exit event so nothing trails it
            for reader in [stdout, stderr].into_iter().flatten() {
                let _ = reader.await;
            }
            let code = match status {
                Ok(status) => status.code(),
                Err(e) => {
                    warn!(error = %e, "Failed to wait on server process");
                    None
                }
            };
            let _ = tx.send(OutputEvent::Exited(code)).await;
        });

        Ok(ServerHandle {
            name: spec.name.clone(),
            simulated: false,
            events,
            console,
            kill,
        })
    }

    #[instrument(skip(self))]
    async fn stop(&self, name: &str) -> RuntimeResult<()> {
        let output = Command::new(&self.binary)
            .arg("stop")
            .arg("-t")
            .arg(self.stop_timeout.as_secs().to_string())
            .arg(name)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| RuntimeError::Stop {
                name: name.to_string(),
                message: e.to_string(),
            })?;

        if output.status.success() {
            Ok(())
        } else {
            Err(RuntimeError::Stop {
                name: name.to_string(),
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}

async fn forward_lines<R>(reader: R, stream: LogStream, tx: mpsc::Sender<OutputEvent>)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if tx.send(OutputEvent::Line(stream, line)).await.is_err() {
                    break;
                }
            }
            Ok(None) => break,
            Err(e) => {
                debug!(?stream, error = %e, "Output stream closed");
                break;
            }
        }
    }
}

async fn write_console(
    mut stdin: ChildStdin,
    mut rx: mpsc::Receiver<String>,
    tx: mpsc::Sender<OutputEvent>,
) {
    while let Some(command) = rx.recv().await {
        let line = format!("{}\n", command.trim_end_matches(['\r', '\n']));
        let written = match stdin.write_all(line.as_bytes()).await {
            Ok(()) => stdin.flush().await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            debug!(error = %e, "Server input closed");
            let _ = tx.send(OutputEvent::ConsoleClosed).await;
            break;
        }
    }
}
