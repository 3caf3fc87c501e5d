//! Persistent content-addressed caching for hierarchical tasks
//!
//! A task declares its fields, some of which may be sub-tasks. The engine
//! hashes the declared state, looks the hash up in a per-task-type scope of
//! the store, and either reuses the stored result or runs the task and stores
//! what it returns.
//!
//! # Overview
//!
//! - [`serializer`]: canonical bytes of field values
//! - [`hash`]: deterministic `<TaskName>_<sha256>` hashes over fields,
//!   sub-task hashes, call-time inputs and the task's definition identity
//! - [`store`]: scoped key-value storage of [`CacheResult`]s
//! - [`invalidation`]: recursive validity check over the sub-task tree
//! - [`Cache::get_or_compute`]: the reuse-or-run flow
//!
//! # Reuse
//!
//! A stored result is reused when the task's key is found and every sub-task
//! it was built from still resolves to a stored result of unchanged content.
//! Hashes, not timestamps, decide reuse: reverting a field restores the old
//! key and with it the old result.

mod error;
mod events;

pub mod config;
pub mod engine;
pub mod field;
pub mod hash;
pub mod invalidation;
pub mod logs;
pub mod registry;
pub mod serializer;
pub mod store;
pub mod task;
pub mod tree;

// Re-export error types at crate root
pub use error::{BoxError, Error, Result};

// Re-export main types
pub use config::{CacheMode, TesseraConfig};
pub use engine::{Cache, TaskContext};
pub use field::{Field, FieldKind};
pub use hash::{Hash, TaskHashes, compute_hash};
pub use logs::{LogLevel, LogRecord};
pub use registry::Registry;
pub use serializer::{ContentError, ContentValue};
pub use store::{CacheResult, CacheStore, FsBackend, MemoryBackend, ScopedStore, StorageBackend};
pub use task::{CachableTask, CallArgs, TaskNode, TaskState};
pub use tree::{RelativePath, TaskPath};
