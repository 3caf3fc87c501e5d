//! Recursive validity check of stored results
//!
//! A stored [`CacheResult`] is reusable only if every sub-task it was built
//! from still resolves to a stored, valid result of unchanged content, and the
//! task's own [`check_is_cache_valid`](TaskNode::check_is_cache_valid) hook
//! agrees. Once a task instance is found invalid it stays invalid, except
//! towards the entry it stored itself after recomputing.

use crate::hash::{Hash, content_hash};
use crate::registry::Registry;
use crate::store::{CacheResult, CacheStore};
use crate::task::TaskNode;
use crate::tree::{ensure_paths, path_of};
use crate::{Error, Result};

/// Decide whether `cached` must be recomputed for `task`.
///
/// Returns `Ok(true)` and marks the task invalid when:
///
/// - the task is already marked invalid
/// - a sub-task is missing from `cached.sub_results`
/// - the sub-result it points to is no longer stored
/// - the sub-task's content differs from the stored sub-result's content
/// - a sub-task's own stored result is invalid
/// - the task's `check_is_cache_valid` hook rejects the result
///
/// # Errors
///
/// Storage failures while reading sub-results and hashing failures of
/// sub-tasks. Structural mismatches are not errors.
pub fn is_invalid(
    task: &dyn TaskNode,
    cached: &CacheResult,
    store: &CacheStore,
    registry: &Registry,
) -> Result<bool> {
    check(task, None, cached, store, registry)
}

/// Like [`is_invalid`] for the entry stored under `key`.
///
/// When `key` is the entry the task stored itself, its invalid flag is not
/// consulted; the sub-task walk and the `check_is_cache_valid` hook still run.
///
/// # Errors
///
/// Same as [`is_invalid`].
pub fn is_invalid_at(
    task: &dyn TaskNode,
    key: &Hash,
    cached: &CacheResult,
    store: &CacheStore,
    registry: &Registry,
) -> Result<bool> {
    check(task, Some(key), cached, store, registry)
}

fn check(
    task: &dyn TaskNode,
    key: Option<&Hash>,
    cached: &CacheResult,
    store: &CacheStore,
    registry: &Registry,
) -> Result<bool> {
    let stored_by_task = key.is_some() && task.state().stored_hash().as_ref() == key;
    if task.state().is_invalid() && !stored_by_task {
        return Ok(true);
    }

    ensure_paths(task);
    let path = path_of(task);

    for field in task.fields() {
        let Some(sub) = field.cached_subtask() else {
            continue;
        };
        let relpath = path_of(sub).relative_to(&path)?;

        let Some(last_hash) = cached.sub_results.get(&relpath) else {
            return Ok(invalidate(task, &format!("sub-task '{relpath}' not in stored entry")));
        };

        let scope = registry.scope_for(sub);
        let sub_cached = {
            let handle = store.open(&scope)?;
            let entry = handle.get(last_hash)?;
            handle.close()?;
            entry
        };
        let Some(sub_cached) = sub_cached else {
            return Ok(invalidate(
                task,
                &format!("stored result {last_hash} of sub-task '{relpath}' is gone"),
            ));
        };

        if let Some(stored_content) = &sub_cached.content_hash {
            let current = content_hash(sub)
                .map_err(|e| Error::child_hash(path.to_string(), field.name(), e))?;
            if &current != stored_content {
                return Ok(invalidate(
                    task,
                    &format!("sub-task '{relpath}' changed since it was stored"),
                ));
            }
        }

        if check(sub, Some(last_hash), &sub_cached, store, registry)? {
            return Ok(invalidate(task, &format!("sub-task '{relpath}' is invalid")));
        }
    }

    if !task.check_is_cache_valid(&cached.result) {
        return Ok(invalidate(task, "rejected by check_is_cache_valid"));
    }

    Ok(false)
}

fn invalidate(task: &dyn TaskNode, reason: &str) -> bool {
    task.state().mark_invalid();
    crate::emit_cache_invalidated!(path_of(task), reason);
    true
}
