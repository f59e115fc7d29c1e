//! `RocksDB` storage layer for rancher-integrator.
//!
//! This crate persists the registration record so that the controller's view of
//! the cluster registration survives process restarts and repeated event
//! deliveries.
//!
//! # Architecture
//!
//! The storage uses the following column families:
//!
//! - `registration`: the single [`RegistrationRecord`] owned by the controller
//! - `config`: the last [`IntegratorConfig`] supplied by the operator
//! - `meta`: bookkeeping such as the schema version
//!
//! # Example
//!
//! ```no_run
//! use rancher_integrator_store::{RocksStore, Store};
//!
//! let store = RocksStore::open("/tmp/rancher-integrator-db").unwrap();
//!
//! let record = store.load_registration().unwrap();
//! assert!(!record.registered);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod keys;
#[cfg(any(test, feature = "test-utils"))]
pub mod memory;
pub mod rocks;
pub mod schema;
pub mod types;

pub use error::{Result, StoreError};
#[cfg(any(test, feature = "test-utils"))]
pub use memory::MemoryStore;
pub use rocks::RocksStore;
pub use types::RegistrationRecord;

use rancher_integrator_core::IntegratorConfig;

/// The storage trait for the controller's persisted state.
///
/// This trait abstracts the storage layer, allowing for different implementations
/// (e.g., `RocksDB`, in-memory for testing).
pub trait Store: Send + Sync {
    /// Load the registration record.
    ///
    /// Returns an empty record if nothing has been saved yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails or the stored record
    /// cannot be decoded.
    fn load_registration(&self) -> Result<RegistrationRecord>;

    /// Replace the registration record.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn save_registration(&self, record: &RegistrationRecord) -> Result<()>;

    /// Remove the registration record entirely.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn clear_registration(&self) -> Result<()>;

    /// Load the last saved configuration, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails or the stored
    /// configuration cannot be decoded.
    fn load_config(&self) -> Result<Option<IntegratorConfig>>;

    /// Replace the saved configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn save_config(&self, config: &IntegratorConfig) -> Result<()>;
}
