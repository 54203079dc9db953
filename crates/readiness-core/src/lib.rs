//! Readiness Core Library
//!
//! This crate provides the configuration, error types and capacity trait
//! shared by the readiness components.

pub mod capacity;
pub mod config;
pub mod error;

// Re-export commonly used types
pub use capacity::CpuCapacity;
pub use config::{Config, ReadinessConfig};
pub use error::CapacityError;
