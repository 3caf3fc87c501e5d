//! In-memory storage backend
//!
//! Entries live only as long as the backend. Useful for tests and for runs
//! that should not touch the disk.

use super::StorageBackend;
use crate::{Error, Result};
use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

type Scopes = BTreeMap<String, BTreeMap<String, Vec<u8>>>;

/// Process-local backend
#[derive(Debug, Default)]
pub struct MemoryBackend {
    scopes: RwLock<Scopes>,
}

impl MemoryBackend {
    /// Empty backend
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<T>(operation: &str) -> impl FnOnce(PoisonError<T>) -> Error + '_ {
    move |_| {
        Error::storage_no_path(
            std::io::Error::other("in-memory cache lock poisoned"),
            operation,
        )
    }
}

impl StorageBackend for MemoryBackend {
    fn read(&self, scope: &str, key: &str) -> Result<Option<Vec<u8>>> {
        let scopes = self.scopes.read().map_err(poisoned("read"))?;
        Ok(scopes.get(scope).and_then(|s| s.get(key)).cloned())
    }

    fn write(&self, scope: &str, key: &str, bytes: &[u8]) -> Result<()> {
        let mut scopes = self.scopes.write().map_err(poisoned("write"))?;
        scopes
            .entry(scope.to_string())
            .or_default()
            .insert(key.to_string(), bytes.to_vec());
        Ok(())
    }

    fn scopes(&self) -> Result<Vec<String>> {
        let scopes = self.scopes.read().map_err(poisoned("read"))?;
        Ok(scopes.keys().cloned().collect())
    }

    fn keys(&self, scope: &str) -> Result<Vec<String>> {
        let scopes = self.scopes.read().map_err(poisoned("read"))?;
        Ok(scopes
            .get(scope)
            .map(|s| s.keys().cloned().collect())
            .unwrap_or_default())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
