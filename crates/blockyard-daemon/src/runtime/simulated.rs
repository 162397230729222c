//! Timed stand-in for a server when no container runtime is installed
//!
//! Produces the same shape of output as a real server: a start sequence, a
//! console that echoes commands, and an orderly stop on `stop`, on kill, or
//! after the configured duration. The exit code is always 0.

use super::{LaunchSpec, OutputEvent, ServerHandle};
use blockyard_types::LogStream;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

pub fn launch_simulated(spec: &LaunchSpec, duration: Duration) -> ServerHandle {
    let (tx, events) = mpsc::channel(256);
    let (console, mut console_rx) = mpsc::channel::<String>(64);
    let (kill, mut kill_rx) = oneshot::channel::<()>();
    let name = spec.name.clone();
    let spec = spec.clone();

    tokio::spawn(async move {
        let out = |line: String| OutputEvent::Line(LogStream::Stdout, line);
        let start = [
            format!(
                "[simulated] container runtime unavailable, simulating {}",
                spec.name
            ),
            format!(
                "Starting {} server version {}",
                spec.server_type, spec.minecraft_version
            ),
            format!(
                "Starting Minecraft server on *:{} (host port {})",
                spec.internal_port, spec.port
            ),
            "Done (0.001s)! For help, type \"help\"".to_string(),
        ];
        for line in start {
            if tx.send(out(line)).await.is_err() {
                return;
            }
        }

        let deadline = tokio::time::sleep(duration);
        tokio::pin!(deadline);
        let mut console_open = true;

        loop {
            tokio::select! {
                _ = &mut deadline => {
                    debug!(name = %spec.name, "Simulated run elapsed");
                    break;
                }
                _ = &mut kill_rx => {
                    debug!(name = %spec.name, "Simulated run killed");
                    break;
                }
                command = console_rx.recv(), if console_open => match command {
                    Some(command) if command.trim() == "stop" => break,
                    Some(command) => {
                        let _ = tx
                            .send(out(format!("[simulated] unknown command: {}", command.trim())))
                            .await;
                    }
                    None => console_open = false,
                },
            }
        }

        let _ = tx.send(out("Stopping server".to_string())).await;
        let _ = tx.send(OutputEvent::Exited(Some(0))).await;
    });

    ServerHandle {
        name,
        simulated: true,
        events,
        console,
        kill,
    }
}
