//! HTTP API for blockyard-daemon

pub mod rest;

pub use rest::create_router;
