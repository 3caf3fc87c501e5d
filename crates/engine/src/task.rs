//! Task node abstractions
//!
//! A task is any type that declares its fields through [`TaskNode`] and knows
//! how to produce a result through [`CachableTask::run`]. The engine never
//! inspects task values beyond the declared schema.

use crate::engine::TaskContext;
use crate::error::BoxError;
use crate::field::Field;
use crate::hash::Hash;
use crate::tree::TaskPath;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;

/// Object-safe view of a task instance used for hashing and invalidation
pub trait TaskNode {
    /// Name of the task type.
    ///
    /// Prefixes every hash of this type and selects its cache scope, so it
    /// must be stable and unique among task types sharing a cache. Characters
    /// other than ASCII alphanumerics, `-`, `_` and `.` become `_` in both.
    fn task_name(&self) -> &str;

    /// Identity of the task's logic.
    ///
    /// Part of every hash: bump it whenever `run` changes in a way that makes
    /// previously cached results wrong, even if no field changed.
    fn definition(&self) -> &str;

    /// Declared fields in a fixed order.
    ///
    /// The order is part of the hash; reordering fields invalidates entries.
    fn fields(&self) -> Vec<Field<'_>>;

    /// Per-instance engine state
    fn state(&self) -> &TaskState;

    /// Domain-specific staleness check on a stored result.
    ///
    /// Returning `false` (for example because a file referenced by the result
    /// was deleted) invalidates the entry.
    fn check_is_cache_valid(&self, _result: &Value) -> bool {
        true
    }
}

/// A task whose result can be cached
pub trait CachableTask: TaskNode {
    /// Result of one execution; stored as JSON
    type Output: Serialize + DeserializeOwned;

    /// Execute the task.
    ///
    /// Sub-tasks should be executed through [`TaskContext::get_or_compute`] so
    /// they are cached in their own scope and recorded in this task's entry.
    ///
    /// # Errors
    ///
    /// Any error; engine errors raised by nested calls keep their kind.
    fn run(
        &mut self,
        ctx: &mut TaskContext<'_>,
        call: &CallArgs,
    ) -> Result<Self::Output, BoxError>;
}

/// Engine bookkeeping carried by each task instance.
///
/// `is_invalid` only ever goes from `false` to `true`. Cloning yields fresh
/// state, so a cloned task behaves like a newly created instance.
#[derive(Debug, Default)]
pub struct TaskState {
    invalid: Cell<bool>,
    last_hash: RefCell<Option<Hash>>,
    content_hash: RefCell<Option<Hash>>,
    stored_hash: RefCell<Option<Hash>>,
    path: RefCell<Option<TaskPath>>,
}

impl Clone for TaskState {
    fn clone(&self) -> Self {
        Self::default()
    }
}

impl TaskState {
    /// Fresh state
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether this instance has been found invalid
    #[must_use]
    pub fn is_invalid(&self) -> bool {
        self.invalid.get()
    }

    /// Mark this instance invalid for the rest of its lifetime
    pub fn mark_invalid(&self) {
        self.invalid.set(true);
    }

    /// Key computed by the most recent `compute_hash` on this instance
    #[must_use]
    pub fn last_hash(&self) -> Option<Hash> {
        self.last_hash.borrow().clone()
    }

    pub(crate) fn set_last_hash(&self, hash: Hash) {
        *self.last_hash.borrow_mut() = Some(hash);
    }

    /// Hash of the fields and definition, without call-time inputs
    #[must_use]
    pub fn content_hash(&self) -> Option<Hash> {
        self.content_hash.borrow().clone()
    }

    pub(crate) fn set_content_hash(&self, hash: Hash) {
        *self.content_hash.borrow_mut() = Some(hash);
    }

    /// Key this instance last wrote a fresh result under
    #[must_use]
    pub fn stored_hash(&self) -> Option<Hash> {
        self.stored_hash.borrow().clone()
    }

    pub(crate) fn set_stored_hash(&self, hash: Hash) {
        *self.stored_hash.borrow_mut() = Some(hash);
    }

    /// Position in the task tree, once assigned
    #[must_use]
    pub fn path(&self) -> Option<TaskPath> {
        self.path.borrow().clone()
    }

    /// Place this instance in a task tree
    pub fn set_path(&self, path: TaskPath) {
        *self.path.borrow_mut() = Some(path);
    }
}

/// Call-time inputs of one `get_or_compute` invocation.
///
/// All of them take part in the hash, in the order given.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CallArgs {
    params: Option<BTreeMap<String, Value>>,
    args: Vec<Value>,
    kwargs: BTreeMap<String, Value>,
}

impl CallArgs {
    /// No call-time inputs
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a call parameter
    #[must_use]
    pub fn param(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params
            .get_or_insert_with(BTreeMap::new)
            .insert(name.into(), value.into());
        self
    }

    /// Append a positional argument
    #[must_use]
    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.args.push(value.into());
        self
    }

    /// Add a keyword argument
    #[must_use]
    pub fn kwarg(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.kwargs.insert(name.into(), value.into());
        self
    }

    /// Call parameters, if any were given
    #[must_use]
    pub const fn params(&self) -> Option<&BTreeMap<String, Value>> {
        self.params.as_ref()
    }

    /// Look up one call parameter
    #[must_use]
    pub fn get_param(&self, name: &str) -> Option<&Value> {
        self.params.as_ref().and_then(|p| p.get(name))
    }

    /// Positional arguments
    #[must_use]
    pub fn args(&self) -> &[Value] {
        &self.args
    }

    /// Positional argument at `idx`
    #[must_use]
    pub fn get_arg(&self, idx: usize) -> Option<&Value> {
        self.args.get(idx)
    }

    /// Keyword arguments
    #[must_use]
    pub const fn kwargs(&self) -> &BTreeMap<String, Value> {
        &self.kwargs
    }

    /// Look up one keyword argument
    #[must_use]
    pub fn get_kwarg(&self, name: &str) -> Option<&Value> {
        self.kwargs.get(name)
    }

    /// Whether no call-time input was given
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.params.is_none() && self.args.is_empty() && self.kwargs.is_empty()
    }
}
