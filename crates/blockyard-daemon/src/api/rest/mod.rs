//! REST and server-sent event endpoints under `/api/v1`

pub mod handlers;
pub mod router;
pub mod state;

pub use router::create_router;
pub use state::AppState;
