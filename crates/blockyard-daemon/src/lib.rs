//! Blockyard daemon library
//!
//! This module provides the core components for the Blockyard daemon:
//! - REST API handlers and the live run event stream
//! - Build and run supervisors with persisted job history
//! - Container runtime adapter with a simulated fallback
//! - Server lifecycle management

pub mod api;
pub mod config;
pub mod error;
pub mod events;
pub mod ports;
pub mod projects;
pub mod runtime;
pub mod server;
pub mod storage;
pub mod supervisor;

#[cfg(test)]
mod testing;

pub use config::DaemonConfig;
pub use error::{ApiError, DaemonError, StorageError, SupervisorError};
pub use events::{EventBus, Subscription};
pub use server::Server;
pub use storage::{InMemoryStorage, JobHistory, Storage};
pub use supervisor::{BuildSupervisor, RunSupervisor};
