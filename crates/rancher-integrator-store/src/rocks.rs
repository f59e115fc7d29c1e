//! `RocksDB` storage implementation.
//!
//! This module provides the `RocksStore` implementation of the `Store` trait.

use std::path::Path;
use std::sync::Arc;

use rocksdb::{BoundColumnFamily, ColumnFamilyDescriptor, DBWithThreadMode, MultiThreaded, Options};

use crate::error::{Result, StoreError};
use crate::keys;
use crate::schema::{all_column_families, cf, SCHEMA_VERSION};
use crate::types::RegistrationRecord;
use crate::Store;
use rancher_integrator_core::IntegratorConfig;

/// RocksDB-backed storage implementation.
pub struct RocksStore {
    db: Arc<DBWithThreadMode<MultiThreaded>>,
}

impl RocksStore {
    /// Open or create a `RocksDB` database at the given path.
    ///
    /// A fresh database is stamped with the current schema version; an existing
    /// one must carry the same version.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or created, or if it
    /// was written with an unsupported schema version.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_descriptors: Vec<_> = all_column_families()
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect();

        let db = DBWithThreadMode::open_cf_descriptors(&opts, path, cf_descriptors)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        let store = Self { db: Arc::new(db) };
        store.check_schema()?;
        Ok(store)
    }

    /// Get a column family handle.
    fn cf(&self, name: &str) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::Database(format!("column family not found: {name}")))
    }

    fn check_schema(&self) -> Result<()> {
        let cf_meta = self.cf(cf::META)?;
        let stored = self
            .db
            .get_cf(&cf_meta, keys::SCHEMA_VERSION)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        match stored {
            None => {
                self.db
                    .put_cf(
                        &cf_meta,
                        keys::SCHEMA_VERSION,
                        keys::encode_version(SCHEMA_VERSION),
                    )
                    .map_err(|e| StoreError::Database(e.to_string()))?;
                tracing::debug!(version = SCHEMA_VERSION, "Initialized store schema");
                Ok(())
            }
            Some(bytes) => {
                let found = keys::decode_version(&bytes).ok_or_else(|| {
                    StoreError::Serialization("malformed schema version".to_string())
                })?;
                if found == SCHEMA_VERSION {
                    Ok(())
                } else {
                    Err(StoreError::SchemaMismatch {
                        expected: SCHEMA_VERSION,
                        found,
                    })
                }
            }
        }
    }

    /// Serialize a value using CBOR.
    fn serialize<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(value, &mut buf)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(buf)
    }

    /// Deserialize a value from CBOR.
    fn deserialize<T: serde::de::DeserializeOwned>(data: &[u8]) -> Result<T> {
        ciborium::from_reader(data).map_err(|e| StoreError::Serialization(e.to_string()))
    }
}

impl Store for RocksStore {
    fn load_registration(&self) -> Result<RegistrationRecord> {
        let cf = self.cf(cf::REGISTRATION)?;

        Ok(self
            .db
            .get_cf(&cf, keys::CURRENT_REGISTRATION)
            .map_err(|e| StoreError::Database(e.to_string()))?
            .map(|data| Self::deserialize(&data))
            .transpose()?
            .unwrap_or_default())
    }

    fn save_registration(&self, record: &RegistrationRecord) -> Result<()> {
        let cf = self.cf(cf::REGISTRATION)?;
        let value = Self::serialize(record)?;

        self.db
            .put_cf(&cf, keys::CURRENT_REGISTRATION, value)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        tracing::trace!(
            registered = record.registered,
            cluster_name = ?record.cluster_name,
            has_manifest = record.manifest.is_some(),
            "Saved registration record"
        );

        Ok(())
    }

    fn clear_registration(&self) -> Result<()> {
        let cf = self.cf(cf::REGISTRATION)?;

        self.db
            .delete_cf(&cf, keys::CURRENT_REGISTRATION)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(())
    }

    fn load_config(&self) -> Result<Option<IntegratorConfig>> {
        let cf = self.cf(cf::CONFIG)?;

        self.db
            .get_cf(&cf, keys::CURRENT_CONFIG)
            .map_err(|e| StoreError::Database(e.to_string()))?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    fn save_config(&self, config: &IntegratorConfig) -> Result<()> {
        let cf = self.cf(cf::CONFIG)?;
        let value = Self::serialize(config)?;

        self.db
            .put_cf(&cf, keys::CURRENT_CONFIG, value)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        tracing::trace!(url = ?config.url, "Saved configuration");
        Ok(())
    }
}
