//! Error types module
//!
//! Errors raised while probing CPU accounting. Neither variant is fatal to the
//! monitor: `ProbeUnavailable` is answered by falling back to the null probe,
//! `AccountingUnavailable` by keeping the previously published reading.

use std::io;

#[derive(Debug, thiserror::Error)]
pub enum CapacityError {
    /// The cgroup accounting interface could not be detected or opened.
    #[error("CPU accounting unavailable at {path}: {reason}")]
    ProbeUnavailable { path: String, reason: String },

    /// A single accounting read failed (missing file, permission, bad contents).
    #[error("Failed to read CPU accounting from {path}: {detail}")]
    AccountingUnavailable { path: String, detail: String },
}

impl CapacityError {
    pub fn read_failed(path: impl Into<String>, err: &io::Error) -> Self {
        CapacityError::AccountingUnavailable {
            path: path.into(),
            detail: err.to_string(),
        }
    }

    pub fn malformed(path: impl Into<String>, detail: impl Into<String>) -> Self {
        CapacityError::AccountingUnavailable {
            path: path.into(),
            detail: detail.into(),
        }
    }

    /// Whether the condition may clear on a later attempt.
    pub fn is_transient(&self) -> bool {
        matches!(self, CapacityError::AccountingUnavailable { .. })
    }
}
