//! `get_or_compute`: reuse a stored result or run the task and store it

use crate::config::{CacheMode, TesseraConfig};
use crate::hash::{Hash, TaskHashes, compute_hashes, content_hash};
use crate::invalidation;
use crate::logs::{self, LogLevel, LogRecord};
use crate::registry::Registry;
use crate::store::{CacheResult, CacheStore, ScopedStore};
use crate::task::{CachableTask, CallArgs, TaskNode};
use crate::tree::{RelativePath, TaskPath, ensure_paths, path_of};
use crate::{Error, Result};
use std::collections::BTreeMap;

/// The caching subsystem: store, scope registry and policy
#[derive(Debug, Clone)]
pub struct Cache {
    store: CacheStore,
    registry: Registry,
    mode: CacheMode,
    replay_logs: bool,
}

impl Cache {
    /// Cache over `store` with default scopes, reading and writing
    #[must_use]
    pub fn new(store: CacheStore) -> Self {
        Self {
            store,
            registry: Registry::new(),
            mode: CacheMode::ReadWrite,
            replay_logs: true,
        }
    }

    /// Process-local cache
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(CacheStore::in_memory())
    }

    /// Filesystem cache configured by `config`
    ///
    /// # Errors
    ///
    /// Returns error if no writable cache root can be resolved.
    pub fn from_config(config: &TesseraConfig) -> Result<Self> {
        let root = config.resolve_cache_root()?;
        tracing::debug!(root = %root.display(), mode = %config.effective_mode(), "Opening cache");
        Ok(Self::new(CacheStore::filesystem(root))
            .with_mode(config.effective_mode())
            .with_replay_logs(config.replay_logs()))
    }

    /// Use `registry` to map task types to scopes
    #[must_use]
    pub fn with_registry(mut self, registry: Registry) -> Self {
        self.registry = registry;
        self
    }

    /// Restrict cache traffic
    #[must_use]
    pub const fn with_mode(mut self, mode: CacheMode) -> Self {
        self.mode = mode;
        self
    }

    /// Whether captured logs are replayed on hits
    #[must_use]
    pub const fn with_replay_logs(mut self, replay: bool) -> Self {
        self.replay_logs = replay;
        self
    }

    /// Underlying store
    #[must_use]
    pub const fn store(&self) -> &CacheStore {
        &self.store
    }

    /// Scope registry
    #[must_use]
    pub const fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Active cache mode
    #[must_use]
    pub const fn mode(&self) -> CacheMode {
        self.mode
    }

    /// Cache key of `task` for one invocation; recorded as its last hash
    ///
    /// # Errors
    ///
    /// Serialization failures of hashed fields, wrapped per sub-task level.
    pub fn compute_hash(&self, task: &dyn TaskNode, call: &CallArgs) -> Result<Hash> {
        ensure_paths(task);
        crate::hash::compute_hash(task, Some(call))
    }

    /// Entry stored for `task` under `key`
    ///
    /// # Errors
    ///
    /// Storage failures and undecodable entries.
    pub fn lookup(&self, task: &dyn TaskNode, key: &Hash) -> Result<Option<CacheResult>> {
        let handle = self.store.open(&self.registry.scope_for(task))?;
        let entry = handle.get(key)?;
        handle.close()?;
        Ok(entry)
    }

    /// Whether `cached` must be recomputed for `task`
    ///
    /// # Errors
    ///
    /// See [`invalidation::is_invalid`].
    pub fn is_invalid(&self, task: &dyn TaskNode, cached: &CacheResult) -> Result<bool> {
        invalidation::is_invalid(task, cached, &self.store, &self.registry)
    }

    /// Return the stored result of `task` for `call`, or run the task and
    /// store what it returns.
    ///
    /// Within one caller, `run` executes at most once per distinct key.
    ///
    /// # Errors
    ///
    /// Hashing, storage and encoding failures, and whatever `run` returns.
    /// None of them are turned into cache misses.
    pub fn get_or_compute<T: CachableTask>(
        &self,
        task: &mut T,
        call: &CallArgs,
    ) -> Result<T::Output> {
        ensure_paths(&*task);
        let path = path_of(&*task);

        if self.mode == CacheMode::Off {
            tracing::debug!(task = %path, "Caching disabled, running task");
            return self.run(task, call, &path).map(|(output, _)| output);
        }

        let hashes = compute_hashes(&*task, Some(call))?;
        task.state().set_last_hash(hashes.key.clone());
        let scope = self.registry.scope_for(&*task);

        if self.mode.reads() {
            let handle = self.store.open(&scope)?;
            let reused = match handle.get(&hashes.key)? {
                Some(cached) => self.reuse(&*task, &hashes.key, cached, &handle)?,
                None => {
                    crate::emit_cache_miss!(path, hashes.key);
                    None
                }
            };
            handle.close()?;
            if let Some(output) = reused {
                return Ok(output);
            }
        }

        let (output, records) = self.run(task, call, &path)?;
        if self.mode.writes() {
            self.store_result(&*task, &scope, &path, &hashes, &output, &records)?;
        }
        Ok(output)
    }

    fn reuse<T: CachableTask>(
        &self,
        task: &T,
        key: &Hash,
        cached: CacheResult,
        handle: &ScopedStore<'_>,
    ) -> Result<Option<T::Output>> {
        let path = path_of(task);
        if invalidation::is_invalid_at(task, key, &cached, &self.store, &self.registry)? {
            return Ok(None);
        }

        let output = match serde_json::from_value::<T::Output>(cached.result) {
            Ok(output) => output,
            Err(e) => {
                tracing::warn!(
                    task = %path,
                    cache_key = %key,
                    error = %e,
                    "Stored result does not match the task output type, recomputing"
                );
                task.state().mark_invalid();
                return Ok(None);
            }
        };

        crate::emit_cache_hit!(path, key);
        if self.replay_logs
            && let Some(records) = handle.get_logs(key)?
        {
            logs::replay(&path.to_string(), &records);
        }
        Ok(Some(output))
    }

    fn run<T: CachableTask>(
        &self,
        task: &mut T,
        call: &CallArgs,
        path: &TaskPath,
    ) -> Result<(T::Output, Vec<LogRecord>)> {
        let mut ctx = TaskContext::new(self, path.clone());
        let output = task
            .run(&mut ctx, call)
            .map_err(|e| Error::from_run(path.to_string(), e))?;
        Ok((output, ctx.into_records()))
    }

    fn store_result<T: CachableTask>(
        &self,
        task: &T,
        scope: &str,
        path: &TaskPath,
        hashes: &TaskHashes,
        output: &T::Output,
        records: &[LogRecord],
    ) -> Result<()> {
        let value =
            serde_json::to_value(output).map_err(|e| Error::encode(path.to_string(), e.to_string()))?;
        let sub_results = collect_sub_results(task, path)?;
        let count = sub_results.len();
        let entry = CacheResult::new(value, sub_results).with_content_hash(hashes.content.clone());

        let mut handle = self.store.open(scope)?;
        handle.put(&hashes.key, &entry)?;
        if !records.is_empty() {
            handle.put_logs(&hashes.key, records)?;
        }
        handle.close()?;

        task.state().set_stored_hash(hashes.key.clone());
        crate::emit_cache_stored!(path, hashes.key, count);
        Ok(())
    }
}

/// Hash of each direct sub-task, keyed by its path relative to `task`.
///
/// Uses the key a sub-task was last executed under, falling back to its
/// content hash for sub-tasks that were never executed.
fn collect_sub_results(
    task: &dyn TaskNode,
    path: &TaskPath,
) -> Result<BTreeMap<RelativePath, Hash>> {
    let mut sub_results = BTreeMap::new();
    for field in task.fields() {
        let Some(sub) = field.cached_subtask() else {
            continue;
        };
        let relpath = path_of(sub).relative_to(path)?;
        let hash = match sub.state().last_hash() {
            Some(hash) => hash,
            None => content_hash(sub)
                .map_err(|e| Error::child_hash(path.to_string(), field.name(), e))?,
        };
        sub_results.insert(relpath, hash);
    }
    Ok(sub_results)
}

/// Execution context handed to [`CachableTask::run`].
///
/// Logs written here are emitted immediately and stored with the result, to
/// be replayed when the result is reused.
#[derive(Debug)]
pub struct TaskContext<'c> {
    cache: &'c Cache,
    path: TaskPath,
    label: String,
    records: Vec<LogRecord>,
}

impl<'c> TaskContext<'c> {
    fn new(cache: &'c Cache, path: TaskPath) -> Self {
        Self {
            cache,
            label: path.to_string(),
            path,
            records: Vec::new(),
        }
    }

    /// Cache the task is running under
    #[must_use]
    pub const fn cache(&self) -> &'c Cache {
        self.cache
    }

    /// Path of the running task
    #[must_use]
    pub const fn path(&self) -> &TaskPath {
        &self.path
    }

    /// Run a sub-task through the same cache
    ///
    /// # Errors
    ///
    /// Same as [`Cache::get_or_compute`].
    pub fn get_or_compute<S: CachableTask>(
        &mut self,
        task: &mut S,
        call: &CallArgs,
    ) -> Result<S::Output> {
        self.cache.get_or_compute(task, call)
    }

    /// Log `message` at `level`
    pub fn log(&mut self, level: LogLevel, message: impl Into<String>) {
        let message = message.into();
        logs::emit(&self.label, level, &message);
        self.records.push(LogRecord::now(level, message));
    }

    /// Log at debug level
    pub fn debug(&mut self, message: impl Into<String>) {
        self.log(LogLevel::Debug, message);
    }

    /// Log at info level
    pub fn info(&mut self, message: impl Into<String>) {
        self.log(LogLevel::Info, message);
    }

    /// Log at warn level
    pub fn warn(&mut self, message: impl Into<String>) {
        self.log(LogLevel::Warn, message);
    }

    /// Log at error level
    pub fn error(&mut self, message: impl Into<String>) {
        self.log(LogLevel::Error, message);
    }

    /// Records logged so far
    #[must_use]
    pub fn records(&self) -> &[LogRecord] {
        &self.records
    }

    fn into_records(self) -> Vec<LogRecord> {
        self.records
    }
}
