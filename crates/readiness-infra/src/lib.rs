//! Readiness Infrastructure Library
//!
//! This crate provides the runtime components of the readiness server:
//! - CPU capacity monitoring (cgroup-aware probe, background sampler)
//! - Readiness HTTP middleware
//! - Upstream raw data settle polling
//! - Telemetry initialization

#[cfg(feature = "capacity")]
pub mod capacity;

#[cfg(feature = "middleware")]
pub mod middleware;

#[cfg(feature = "rawdata")]
pub mod rawdata;

#[cfg(feature = "observability-basic")]
pub mod telemetry;

// Re-export commonly used types
#[cfg(feature = "capacity")]
pub use capacity::{CpuProbe, CpuStats, ProbeKind};

#[cfg(feature = "middleware")]
pub use middleware::{readiness_middleware, ReadinessState};

#[cfg(feature = "rawdata")]
pub use rawdata::{RawdataPoller, RawdataPollerConfig};

#[cfg(feature = "observability-basic")]
pub use telemetry::{init_telemetry, shutdown_telemetry};
