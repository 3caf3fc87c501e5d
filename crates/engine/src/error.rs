//! Error types for the caching engine

// Rust 1.92 compiler bug: false positives for thiserror/miette derive macro fields
// https://github.com/rust-lang/rust/issues/147648
#![allow(unused_assignments)]

use miette::Diagnostic;
use std::path::Path;
use thiserror::Error;

/// Boxed error returned by a task's `run` implementation
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Error type for caching operations
///
/// Ordinary cache misses and structural mismatches found during invalidation
/// are not errors; they only trigger recomputation. Every variant here is
/// fatal and reaches the caller of `get_or_compute`.
#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    /// A hashed field has no canonical serialized form
    #[error("Cannot serialize field '{field}' of task {task_path}: {message}")]
    #[diagnostic(
        code(tessera::hash::serialization),
        help(
            "Hashed fields must serialize deterministically; declare live handles as tools or mark the field transient"
        )
    )]
    Serialization {
        /// Tree path of the task owning the field
        task_path: String,
        /// Name of the offending field
        field: String,
        /// Serializer message
        message: String,
    },

    /// Hashing a sub-task failed
    #[error("Failed to hash sub-task '{field}' of task {task_path}")]
    #[diagnostic(code(tessera::hash::child))]
    ChildHash {
        /// Tree path of the parent task
        task_path: String,
        /// Field holding the sub-task
        field: String,
        /// The sub-task's own error
        #[source]
        source: Box<Error>,
    },

    /// I/O failure in the underlying store
    #[error("Storage {operation} failed{}", path.as_ref().map_or(String::new(), |p| format!(": {}", p.display())))]
    #[diagnostic(
        code(tessera::store::io),
        help("Check permissions of the cache directory and that the disk is writable")
    )]
    Storage {
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
        /// Path that caused the error, if available
        path: Option<Box<Path>>,
        /// Operation that failed (e.g., "read", "write", "persist")
        operation: String,
    },

    /// A stored entry exists but cannot be decoded
    #[error("Corrupt cache entry '{key}' in scope '{scope}': {message}")]
    #[diagnostic(
        code(tessera::store::corrupt),
        help("Remove the entry from the cache directory; it will be recomputed")
    )]
    CorruptEntry {
        /// Scope the entry belongs to
        scope: String,
        /// Entry key
        key: String,
        /// Decoder message
        message: String,
    },

    /// A task result could not be encoded for storage
    #[error("Cannot encode result of task {task_path}: {message}")]
    #[diagnostic(code(tessera::store::encode))]
    Encode {
        /// Tree path of the task
        task_path: String,
        /// Encoder message
        message: String,
    },

    /// Configuration or validation error
    #[error("Configuration error: {message}")]
    #[diagnostic(code(tessera::config))]
    Configuration {
        /// Error message describing the configuration issue
        message: String,
    },

    /// Text that is not a `<TaskName>_<digest>` hash
    #[error("Invalid hash '{text}': {message}")]
    #[diagnostic(
        code(tessera::hash::parse),
        help("Hashes look like `Crop_` followed by 64 hex characters; list them with `tessera entries <scope>`")
    )]
    InvalidHash {
        /// The rejected text
        text: String,
        /// What is wrong with it
        message: String,
    },

    /// Task tree addressing failure
    #[error("Task path error: {message}")]
    #[diagnostic(code(tessera::tree::path))]
    Path {
        /// Error message describing the addressing issue
        message: String,
    },

    /// The task's own `run` failed
    #[error("Task {task_path} failed: {source}")]
    #[diagnostic(code(tessera::task::run))]
    Run {
        /// Tree path of the task
        task_path: String,
        /// Error returned by `run`
        #[source]
        source: BoxError,
    },
}

impl Error {
    /// Create a serialization error annotated with task path and field
    #[must_use]
    pub fn serialization(
        task_path: impl Into<String>,
        field: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Serialization {
            task_path: task_path.into(),
            field: field.into(),
            message: message.into(),
        }
    }

    /// Wrap a sub-task's hashing error with the parent's context
    #[must_use]
    pub fn child_hash(task_path: impl Into<String>, field: impl Into<String>, source: Self) -> Self {
        Self::ChildHash {
            task_path: task_path.into(),
            field: field.into(),
            source: Box::new(source),
        }
    }

    /// Create a storage error with path context
    #[must_use]
    pub fn storage(
        source: std::io::Error,
        path: impl AsRef<Path>,
        operation: impl Into<String>,
    ) -> Self {
        Self::Storage {
            source,
            path: Some(path.as_ref().into()),
            operation: operation.into(),
        }
    }

    /// Create a storage error without path context
    #[must_use]
    pub fn storage_no_path(source: std::io::Error, operation: impl Into<String>) -> Self {
        Self::Storage {
            source,
            path: None,
            operation: operation.into(),
        }
    }

    /// Create a corrupt entry error
    #[must_use]
    pub fn corrupt_entry(
        scope: impl Into<String>,
        key: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::CorruptEntry {
            scope: scope.into(),
            key: key.into(),
            message: message.into(),
        }
    }

    /// Create an encode error
    #[must_use]
    pub fn encode(task_path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Encode {
            task_path: task_path.into(),
            message: message.into(),
        }
    }

    /// Create a configuration error
    #[must_use]
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration {
            message: msg.into(),
        }
    }

    /// Create an invalid hash error
    #[must_use]
    pub fn invalid_hash(text: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidHash {
            text: text.into(),
            message: message.into(),
        }
    }

    /// Create a path error
    #[must_use]
    pub fn path(msg: impl Into<String>) -> Self {
        Self::Path {
            message: msg.into(),
        }
    }

    /// Convert an error returned by `run` into an engine error.
    ///
    /// Engine errors raised by nested `get_or_compute` calls keep their kind;
    /// anything else is wrapped as [`Error::Run`].
    #[must_use]
    pub fn from_run(task_path: impl Into<String>, source: BoxError) -> Self {
        match source.downcast::<Self>() {
            Ok(engine) => *engine,
            Err(other) => Self::Run {
                task_path: task_path.into(),
                source: other,
            },
        }
    }

    /// Whether this error originated in the storage layer
    #[must_use]
    pub const fn is_storage(&self) -> bool {
        matches!(self, Self::Storage { .. } | Self::CorruptEntry { .. })
    }
}

/// Result type for caching operations
pub type Result<T> = std::result::Result<T, Error>;
