//! Error types for the storage layer.

use thiserror::Error;

/// A result type using `StoreError`.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A database error occurred.
    #[error("database error: {0}")]
    Database(String),

    /// Serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The database was written by an incompatible version.
    #[error("unsupported schema version: expected {expected}, found {found}")]
    SchemaMismatch {
        /// Version this build understands.
        expected: u32,
        /// Version found on disk.
        found: u32,
    },
}
