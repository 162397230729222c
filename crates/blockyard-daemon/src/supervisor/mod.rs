//! Build and run job supervisors

mod build;
mod run;

pub use build::BuildSupervisor;
pub use run::RunSupervisor;
