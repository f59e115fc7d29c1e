//! Error types for the registration controller.
//!
//! This module defines the errors that escape a trigger handler or an HTTP
//! request. Failures that are part of normal operation (a sidecar error, a
//! missing manifest, a rejected apply) are reported through unit status or
//! action results and do not surface here.

use rancher_integrator_core::NameError;
use thiserror::Error;

/// A result type using `ControlError`.
pub type Result<T> = std::result::Result<T, ControlError>;

/// Errors that can occur in controller operations.
#[derive(Debug, Error)]
pub enum ControlError {
    /// The persisted record violates the registration invariant.
    #[error("corrupt registration state: {0}")]
    CorruptState(String),

    /// A cluster name supplied by the operator is invalid.
    #[error("invalid cluster name: {0}")]
    InvalidName(#[from] NameError),

    /// The requested action does not exist.
    #[error("action not found: {0}")]
    ActionNotFound(u64),

    /// The trigger queue is no longer accepting work.
    #[error("trigger queue closed")]
    QueueClosed,

    /// Storage layer error.
    #[error("storage error: {0}")]
    Store(#[from] rancher_integrator_store::StoreError),
}

impl ControlError {
    /// Returns the appropriate HTTP status code for this error.
    #[must_use]
    pub const fn http_status_code(&self) -> u16 {
        match self {
            Self::InvalidName(_) => 400,
            Self::ActionNotFound(_) => 404,
            Self::QueueClosed => 503,
            Self::CorruptState(_) | Self::Store(_) => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rancher_integrator_store::StoreError;

    #[test]
    fn error_status_codes() {
        assert_eq!(ControlError::ActionNotFound(7).http_status_code(), 404);
        assert_eq!(
            ControlError::InvalidName(NameError::Empty).http_status_code(),
            400
        );
        assert_eq!(ControlError::QueueClosed.http_status_code(), 503);
        assert_eq!(
            ControlError::CorruptState("registered without manifest".to_string())
                .http_status_code(),
            500
        );
        assert_eq!(
            ControlError::Store(StoreError::Database("closed".to_string())).http_status_code(),
            500
        );
    }
}
