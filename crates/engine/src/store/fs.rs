//! Filesystem storage backend
//!
//! ## Directory Structure
//!
//! ```text
//! <cache root>/
//!   Crop/
//!     Crop_3fa1....json        (CacheResult)
//!     Crop_3fa1..._logs.json   (log records)
//!   LoadImage/
//!     ...
//! ```
//!
//! Entries are written to a temporary file in the scope directory and renamed
//! into place, so a reader never observes a partially written entry.

use super::StorageBackend;
use crate::{Error, Result};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

const ENTRY_EXTENSION: &str = "json";

/// Stores each scope as a directory of JSON files
#[derive(Debug, Clone)]
pub struct FsBackend {
    root: PathBuf,
}

impl FsBackend {
    /// Backend rooted at `root`; directories are created on first write
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Cache root directory
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn scope_dir(&self, scope: &str) -> PathBuf {
        self.root.join(scope)
    }

    fn entry_path(&self, scope: &str, key: &str) -> PathBuf {
        self.scope_dir(scope)
            .join(format!("{key}.{ENTRY_EXTENSION}"))
    }

    fn list_dir(dir: &Path) -> Result<Option<fs::ReadDir>> {
        match fs::read_dir(dir) {
            Ok(entries) => Ok(Some(entries)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::storage(e, dir, "read_dir")),
        }
    }
}

impl StorageBackend for FsBackend {
    fn read(&self, scope: &str, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.entry_path(scope, key);
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::storage(e, &path, "read")),
        }
    }

    fn write(&self, scope: &str, key: &str, bytes: &[u8]) -> Result<()> {
        let dir = self.scope_dir(scope);
        fs::create_dir_all(&dir).map_err(|e| Error::storage(e, &dir, "create_dir_all"))?;

        let path = self.entry_path(scope, key);
        let mut tmp =
            tempfile::NamedTempFile::new_in(&dir).map_err(|e| Error::storage(e, &dir, "create"))?;
        tmp.write_all(bytes)
            .map_err(|e| Error::storage(e, tmp.path(), "write"))?;
        tmp.as_file()
            .sync_all()
            .map_err(|e| Error::storage(e, tmp.path(), "sync"))?;
        tmp.persist(&path)
            .map_err(|e| Error::storage(e.error, &path, "rename"))?;

        tracing::trace!(path = %path.display(), bytes = bytes.len(), "Wrote cache entry");
        Ok(())
    }

    #[cfg(unix)]
    fn flush(&self, scope: &str) -> Result<()> {
        let dir = self.scope_dir(scope);
        match fs::File::open(&dir) {
            Ok(handle) => handle
                .sync_all()
                .map_err(|e| Error::storage(e, &dir, "sync")),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::storage(e, &dir, "open")),
        }
    }

    fn scopes(&self) -> Result<Vec<String>> {
        let Some(entries) = Self::list_dir(&self.root)? else {
            return Ok(Vec::new());
        };
        let mut scopes = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| Error::storage(e, &self.root, "read_dir"))?;
            let is_dir = entry
                .file_type()
                .map_err(|e| Error::storage(e, entry.path(), "metadata"))?
                .is_dir();
            if let (true, Some(name)) = (is_dir, entry.file_name().to_str()) {
                scopes.push(name.to_string());
            }
        }
        scopes.sort();
        Ok(scopes)
    }

    fn keys(&self, scope: &str) -> Result<Vec<String>> {
        let dir = self.scope_dir(scope);
        let Some(entries) = Self::list_dir(&dir)? else {
            return Ok(Vec::new());
        };
        let mut keys = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| Error::storage(e, &dir, "read_dir"))?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(ENTRY_EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                keys.push(stem.to_string());
            }
        }
        keys.sort();
        Ok(keys)
    }

    fn name(&self) -> &'static str {
        "filesystem"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn write_then_read() {
        let tmp = TempDir::new().unwrap();
        let backend = FsBackend::new(tmp.path());
        backend.write("Scope", "key", b"{\"a\":1}").unwrap();
        assert_eq!(
            backend.read("Scope", "key").unwrap().as_deref(),
            Some(&b"{\"a\":1}"[..])
        );
        assert!(tmp.path().join("Scope").join("key.json").exists());
    }

    #[test]
    fn missing_scope_and_key_read_as_none() {
        let tmp = TempDir::new().unwrap();
        let backend = FsBackend::new(tmp.path().join("not-created"));
        assert!(backend.read("Scope", "key").unwrap().is_none());
        assert!(backend.scopes().unwrap().is_empty());
        assert!(backend.keys("Scope").unwrap().is_empty());
        backend.flush("Scope").unwrap();
    }

    #[test]
    fn listing_ignores_foreign_files() {
        let tmp = TempDir::new().unwrap();
        let backend = FsBackend::new(tmp.path());
        backend.write("Scope", "b", b"1").unwrap();
        backend.write("Scope", "a", b"2").unwrap();
        fs::write(tmp.path().join("Scope").join("notes.txt"), "x").unwrap();
        fs::write(tmp.path().join("stray-file"), "x").unwrap();

        assert_eq!(backend.keys("Scope").unwrap(), vec!["a", "b"]);
        assert_eq!(backend.scopes().unwrap(), vec!["Scope"]);
    }

    #[test]
    fn unreadable_entry_is_a_storage_error() {
        let tmp = TempDir::new().unwrap();
        let backend = FsBackend::new(tmp.path());
        // A directory where the entry file should be cannot be read as a file
        fs::create_dir_all(tmp.path().join("Scope").join("key.json")).unwrap();
        let err = backend.read("Scope", "key").unwrap_err();
        assert!(matches!(err, Error::Storage { .. }));
    }

    #[test]
    fn root_that_is_a_file_fails_to_write() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("file-root");
        fs::write(&root, "occupied").unwrap();
        let backend = FsBackend::new(&root);
        let err = backend.write("Scope", "key", b"1").unwrap_err();
        assert!(err.is_storage());
    }
}
