//! Task type to cache scope mapping
//!
//! Every task type gets its own scope. By default the scope is named after
//! the task type; [`Registry::bind`] overrides that, e.g. to share one scope
//! between renamed versions of a task.

use crate::store::validate_name;
use crate::task::TaskNode;
use crate::Result;
use std::collections::BTreeMap;

/// Resolves the cache scope of task types
#[derive(Debug, Clone, Default)]
pub struct Registry {
    bindings: BTreeMap<String, String>,
}

impl Registry {
    /// Registry with default scope names only
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store results of task type `task_name` in `scope`
    ///
    /// # Errors
    ///
    /// Returns error if `scope` is not a valid scope name.
    pub fn bind(&mut self, task_name: impl Into<String>, scope: impl Into<String>) -> Result<()> {
        let scope = scope.into();
        validate_name("Scope", &scope)?;
        self.bindings.insert(task_name.into(), scope);
        Ok(())
    }

    /// Scope of the task type named `task_name`
    #[must_use]
    pub fn scope_for_name(&self, task_name: &str) -> String {
        self.bindings
            .get(task_name)
            .cloned()
            .unwrap_or_else(|| default_scope(task_name))
    }

    /// Scope of `task`
    #[must_use]
    pub fn scope_for(&self, task: &dyn TaskNode) -> String {
        self.scope_for_name(task.task_name())
    }
}

/// Default scope name of a task type: its name with unsupported characters
/// replaced by `_`
#[must_use]
pub fn default_scope(task_name: &str) -> String {
    let mut scope: String = task_name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if scope.is_empty() || scope.starts_with('.') {
        scope.insert(0, '_');
    }
    scope
}
