//! API request handlers

mod builds;
mod events;
mod health;
mod projects;
mod runs;

pub use builds::*;
pub use events::*;
pub use health::*;
pub use projects::*;
pub use runs::*;
