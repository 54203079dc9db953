//! Tracing initialization
//!
//! This module installs the global `tracing` subscriber used by the readiness
//! server.

mod init_basic;

pub use init_basic::{init_telemetry, shutdown_telemetry};
