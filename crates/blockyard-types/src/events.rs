//! Live status stream events
//!
//! The stream carries three named events: `init` (full run snapshot sent to
//! new subscribers), `run-update` (one RunJob), and `run-log`
//! (`{runId, projectId, entry}`).

use crate::{LogEntry, ProjectId, RunId, RunJob};
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
pub enum RunEvent {
    /// Full snapshot of known runs
    Init { runs: Vec<RunJob> },

    /// A run changed state
    RunUpdate { run: Box<RunJob> },

    /// A run emitted one log line
    RunLog {
        run_id: RunId,
        project_id: ProjectId,
        entry: LogEntry,
    },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RunLogPayload<'a> {
    run_id: &'a RunId,
    project_id: &'a ProjectId,
    entry: &'a LogEntry,
}

impl RunEvent {
    /// Event name on the wire
    pub fn name(&self) -> &'static str {
        match self {
            RunEvent::Init { .. } => "init",
            RunEvent::RunUpdate { .. } => "run-update",
            RunEvent::RunLog { .. } => "run-log",
        }
    }

    /// Run this event concerns, if it concerns exactly one
    pub fn run_id(&self) -> Option<RunId> {
        match self {
            RunEvent::Init { .. } => None,
            RunEvent::RunUpdate { run } => Some(run.id),
            RunEvent::RunLog { run_id, .. } => Some(*run_id),
        }
    }

    /// JSON payload on the wire
    pub fn payload(&self) -> serde_json::Result<Value> {
        match self {
            RunEvent::Init { runs } => serde_json::to_value(runs),
            RunEvent::RunUpdate { run } => serde_json::to_value(run.as_ref()),
            RunEvent::RunLog {
                run_id,
                project_id,
                entry,
            } => serde_json::to_value(RunLogPayload {
                run_id,
                project_id,
                entry,
            }),
        }
    }
}
