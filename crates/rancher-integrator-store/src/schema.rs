//! Database schema definitions and column families.
//!
//! This module defines the column families used in `RocksDB` storage.

/// Schema version written on first open and checked afterwards.
pub const SCHEMA_VERSION: u32 = 1;

/// Column family names for the `RocksDB` database.
pub mod cf {
    /// The controller's registration record.
    pub const REGISTRATION: &str = "registration";

    /// The operator-supplied connection configuration.
    pub const CONFIG: &str = "config";

    /// Bookkeeping values.
    pub const META: &str = "meta";
}

/// Returns all column family names for database initialization.
#[must_use]
pub fn all_column_families() -> Vec<&'static str> {
    vec![cf::REGISTRATION, cf::CONFIG, cf::META]
}
