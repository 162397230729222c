//! Storage layer for blockyard-daemon
//!
//! Jobs live in memory behind the storage traits; the history documents make
//! them survive restarts.

mod history;
mod memory;
mod traits;

pub use history::{recover_builds, recover_runs, JobHistory};
pub use memory::InMemoryStorage;
pub use traits::{BuildJobStorage, RunJobStorage, RunUpdate, Storage, StorageResult};
