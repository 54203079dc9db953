//! Readiness API Library
//!
//! This crate wires the readiness middleware, the CPU sampler and the raw data
//! poller into an HTTP server.

pub mod setup;
pub mod state;

pub use state::AppState;
