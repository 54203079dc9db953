//! HTTP middleware for the readiness server

pub mod readiness;

pub use readiness::{readiness_middleware, ReadinessCheck, ReadinessState};
