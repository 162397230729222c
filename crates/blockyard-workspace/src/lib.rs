//! Blockyard Workspace - artifact reconciliation into live server directories
//!
//! A workspace is the mutable directory a running server reads and writes. The
//! reconciler merges a new build artifact into it using per-path baseline
//! hashes, so files the operator edited by hand survive a re-sync unless the
//! artifact itself changed them upstream.
//!
//! ## Decision table
//!
//! | on disk | baseline | baseline == artifact | disk == artifact | action |
//! |---|---|---|---|---|
//! | no | any | any | any | write, record baseline |
//! | yes | no | | yes | adopt baseline, clear dirty |
//! | yes | no | | no | mark dirty, keep local file |
//! | yes | yes | no | any | overwrite, record baseline, clear dirty |
//! | yes | yes | yes | yes | keep, clear dirty |
//! | yes | yes | yes | no | mark dirty, keep local file |
//!
//! The first sync of a workspace writes every entry unconditionally. Baseline
//! paths missing from the new artifact are deleted.

#![deny(unsafe_code)]

pub mod error;
pub mod manager;
pub mod reconciler;
pub mod state;

pub use error::{WorkspaceError, WorkspaceResult};
pub use manager::WorkspaceManager;
pub use reconciler::{SyncOutcome, SyncReport, WorkspaceReconciler};
pub use state::WorkspaceStateStore;
