//! In-memory store for tests.

use parking_lot::Mutex;
use rancher_integrator_core::IntegratorConfig;

use crate::error::{Result, StoreError};
use crate::types::RegistrationRecord;
use crate::Store;

#[derive(Debug, Default)]
struct Inner {
    record: Option<RegistrationRecord>,
    config: Option<IntegratorConfig>,
    saves: usize,
    fail_after: Option<usize>,
}

/// A store that keeps the registration record in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    /// Create an empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of times a registration record has been saved.
    #[must_use]
    pub fn save_count(&self) -> usize {
        self.inner.lock().saves
    }

    /// Let `saves` more registration saves succeed, then fail every later
    /// one. `None` makes saves succeed again.
    pub fn fail_saves_after(&self, saves: Option<usize>) {
        let mut inner = self.inner.lock();
        inner.fail_after = saves.map(|n| inner.saves + n);
    }
}

impl Store for MemoryStore {
    fn load_registration(&self) -> Result<RegistrationRecord> {
        Ok(self.inner.lock().record.clone().unwrap_or_default())
    }

    fn save_registration(&self, record: &RegistrationRecord) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.fail_after.is_some_and(|limit| inner.saves >= limit) {
            return Err(StoreError::Database("injected save failure".to_string()));
        }
        inner.record = Some(record.clone());
        inner.saves += 1;
        Ok(())
    }

    fn clear_registration(&self) -> Result<()> {
        self.inner.lock().record = None;
        Ok(())
    }

    fn load_config(&self) -> Result<Option<IntegratorConfig>> {
        Ok(self.inner.lock().config.clone())
    }

    fn save_config(&self, config: &IntegratorConfig) -> Result<()> {
        self.inner.lock().config = Some(config.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn injected_failure_starts_after_allowed_saves() {
        let store = MemoryStore::new();
        store.fail_saves_after(Some(1));

        let record = RegistrationRecord::default();
        store.save_registration(&record).unwrap();
        assert!(store.save_registration(&record).is_err());
        assert_eq!(store.save_count(), 1);

        store.fail_saves_after(None);
        store.save_registration(&record).unwrap();
        assert_eq!(store.save_count(), 2);
    }

    #[test]
    fn config_round_trips() {
        let store = MemoryStore::new();
        assert!(store.load_config().unwrap().is_none());

        store.save_config(&IntegratorConfig::default()).unwrap();
        assert_eq!(
            store.load_config().unwrap(),
            Some(IntegratorConfig::default())
        );
    }
}
