//! Scoped persistent storage of cached task results
//!
//! One scope exists per task type. Within a scope, entries are keyed by the
//! task's [`Hash`] and hold a [`CacheResult`]. Writes are last-write-wins per
//! key; entries are never deleted here.
//!
//! Access goes through [`CacheStore::open`], which hands out a
//! [`ScopedStore`]. The handle flushes the scope when it is closed or dropped,
//! so every exit path, including early returns on error, releases it.

mod fs;
mod memory;

pub use fs::FsBackend;
pub use memory::MemoryBackend;

use crate::hash::Hash;
use crate::logs::{LogRecord, logs_key};
use crate::tree::RelativePath;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Stored outcome of one task execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheResult {
    /// The value returned by `run`
    pub result: Value,
    /// Hash of each direct sub-task at storage time, by relative path
    #[serde(default)]
    pub sub_results: BTreeMap<RelativePath, Hash>,
    /// Content hash of the task that produced this entry
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<Hash>,
    /// When the entry was created
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl CacheResult {
    /// New entry created now
    #[must_use]
    pub fn new(result: Value, sub_results: BTreeMap<RelativePath, Hash>) -> Self {
        Self {
            result,
            sub_results,
            content_hash: None,
            created_at: Some(Utc::now()),
        }
    }

    /// Attach the producing task's content hash
    #[must_use]
    pub fn with_content_hash(mut self, content_hash: Hash) -> Self {
        self.content_hash = Some(content_hash);
        self
    }
}

/// Key-value storage engine behind a [`CacheStore`].
///
/// Implementations must make each single-key `write` atomic; `read` of a key
/// that was never written returns `Ok(None)`. Real I/O failures must be
/// reported as errors, never as a missing key.
pub trait StorageBackend: Send + Sync {
    /// Read the bytes stored under `key` in `scope`
    fn read(&self, scope: &str, key: &str) -> Result<Option<Vec<u8>>>;

    /// Store `bytes` under `key` in `scope`, replacing any previous value
    fn write(&self, scope: &str, key: &str, bytes: &[u8]) -> Result<()>;

    /// Make previous writes to `scope` durable
    fn flush(&self, _scope: &str) -> Result<()> {
        Ok(())
    }

    /// Names of all scopes holding entries
    fn scopes(&self) -> Result<Vec<String>>;

    /// All keys stored in `scope`
    fn keys(&self, scope: &str) -> Result<Vec<String>>;

    /// Short name of the backend
    fn name(&self) -> &'static str;
}

/// Validate a scope or key name for use as a storage identifier
///
/// # Errors
///
/// Returns [`Error::Configuration`] for empty names, names starting with a dot
/// and names containing characters other than ASCII alphanumerics, `-`, `_`
/// and `.`.
pub fn validate_name(kind: &str, name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::configuration(format!("{kind} name must not be empty")));
    }
    if name.starts_with('.') {
        return Err(Error::configuration(format!(
            "{kind} name '{name}' must not start with '.'"
        )));
    }
    if let Some(bad) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
    {
        return Err(Error::configuration(format!(
            "{kind} name '{name}' contains invalid character '{bad}'"
        )));
    }
    Ok(())
}

/// Shared handle on a storage backend
#[derive(Clone)]
pub struct CacheStore {
    backend: Arc<dyn StorageBackend>,
}

impl fmt::Debug for CacheStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheStore")
            .field("backend", &self.backend.name())
            .finish()
    }
}

impl CacheStore {
    /// Wrap a backend
    #[must_use]
    pub fn new(backend: impl StorageBackend + 'static) -> Self {
        Self {
            backend: Arc::new(backend),
        }
    }

    /// Filesystem store rooted at `root`
    #[must_use]
    pub fn filesystem(root: impl Into<PathBuf>) -> Self {
        Self::new(FsBackend::new(root))
    }

    /// Process-local store
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(MemoryBackend::new())
    }

    /// Name of the underlying backend
    #[must_use]
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Acquire the store of one scope
    ///
    /// # Errors
    ///
    /// Returns error if `scope` is not a valid scope name.
    pub fn open(&self, scope: &str) -> Result<ScopedStore<'_>> {
        validate_name("Scope", scope)?;
        tracing::trace!(scope, backend = self.backend.name(), "Opened cache scope");
        Ok(ScopedStore {
            backend: self.backend.as_ref(),
            scope: scope.to_string(),
            dirty: false,
            released: false,
        })
    }

    /// Names of all scopes with entries
    ///
    /// # Errors
    ///
    /// Returns error if the backend cannot list scopes.
    pub fn scopes(&self) -> Result<Vec<String>> {
        self.backend.scopes()
    }

    /// All keys stored in `scope`, including log record keys
    ///
    /// # Errors
    ///
    /// Returns error if the backend cannot list the scope.
    pub fn keys(&self, scope: &str) -> Result<Vec<String>> {
        validate_name("Scope", scope)?;
        self.backend.keys(scope)
    }
}

/// Access to one scope of a [`CacheStore`], released on close or drop
pub struct ScopedStore<'s> {
    backend: &'s dyn StorageBackend,
    scope: String,
    dirty: bool,
    released: bool,
}

impl fmt::Debug for ScopedStore<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopedStore")
            .field("scope", &self.scope)
            .field("dirty", &self.dirty)
            .finish_non_exhaustive()
    }
}

impl ScopedStore<'_> {
    /// Scope name
    #[must_use]
    pub fn scope(&self) -> &str {
        &self.scope
    }

    /// Look up the entry stored under `key`
    ///
    /// # Errors
    ///
    /// Returns error on storage failures or when the entry cannot be decoded.
    pub fn get(&self, key: &Hash) -> Result<Option<CacheResult>> {
        self.read_json(key.as_str())
    }

    /// Store `result` under `key`, replacing any previous entry
    ///
    /// # Errors
    ///
    /// Returns error on storage failures.
    pub fn put(&mut self, key: &Hash, result: &CacheResult) -> Result<()> {
        self.write_json(key.as_str(), result)
    }

    /// Log records stored for the entry under `key`
    ///
    /// # Errors
    ///
    /// Returns error on storage failures or when the records cannot be decoded.
    pub fn get_logs(&self, key: &Hash) -> Result<Option<Vec<LogRecord>>> {
        self.read_json(&logs_key(key.as_str()))
    }

    /// Store log records for the entry under `key`
    ///
    /// # Errors
    ///
    /// Returns error on storage failures.
    pub fn put_logs(&mut self, key: &Hash, records: &[LogRecord]) -> Result<()> {
        self.write_json(&logs_key(key.as_str()), records)
    }

    /// Release the scope, flushing pending writes
    ///
    /// # Errors
    ///
    /// Returns error if the flush fails.
    pub fn close(mut self) -> Result<()> {
        self.release()
    }

    fn read_json<T: serde::de::DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        validate_name("Key", key)?;
        let Some(bytes) = self.backend.read(&self.scope, key)? else {
            return Ok(None);
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| Error::corrupt_entry(&self.scope, key, e.to_string()))
    }

    fn write_json<T: Serialize + ?Sized>(&mut self, key: &str, value: &T) -> Result<()> {
        validate_name("Key", key)?;
        let bytes = serde_json::to_vec(value).map_err(|e| {
            Error::encode(format!("{}/{key}", self.scope), e.to_string())
        })?;
        self.backend.write(&self.scope, key, &bytes)?;
        self.dirty = true;
        Ok(())
    }

    fn release(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        if self.dirty {
            self.backend.flush(&self.scope)?;
        }
        Ok(())
    }
}

impl Drop for ScopedStore<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            tracing::warn!(scope = %self.scope, error = %e, "Failed to flush cache scope on release");
        }
    }
}
