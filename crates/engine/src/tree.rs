//! Tree addressing for task hierarchies
//!
//! Every task node sits at a [`TaskPath`] below the root it was reached from.
//! A sub-task's path is its parent's path extended by the name of the field
//! holding it, so `relative_to` the parent yields that field name.

use crate::field::FieldKind;
use crate::task::TaskNode;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

const SEPARATOR: char = '.';

/// Absolute position of a task instance in its hierarchy
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskPath {
    steps: Vec<String>,
}

impl TaskPath {
    /// Path of a root task
    #[must_use]
    pub fn root(name: impl Into<String>) -> Self {
        Self {
            steps: vec![name.into()],
        }
    }

    /// Path of a child reached through `field`
    #[must_use]
    pub fn child(&self, field: impl Into<String>) -> Self {
        let mut steps = self.steps.clone();
        steps.push(field.into());
        Self { steps }
    }

    /// Individual path steps, root first
    #[must_use]
    pub fn steps(&self) -> &[String] {
        &self.steps
    }

    /// Number of steps
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Whether the path has no steps
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Last step of the path
    #[must_use]
    pub fn target(&self) -> Option<&str> {
        self.steps.last().map(String::as_str)
    }

    /// Whether `self` is a strict ancestor of `other`
    #[must_use]
    pub fn is_ancestor_of(&self, other: &Self) -> bool {
        other.steps.len() > self.steps.len() && other.steps.starts_with(&self.steps)
    }

    /// Position of `self` below `ancestor`
    ///
    /// # Errors
    ///
    /// Returns [`Error::Path`] when `ancestor` is not a strict ancestor of `self`.
    pub fn relative_to(&self, ancestor: &Self) -> Result<RelativePath> {
        if !ancestor.is_ancestor_of(self) {
            return Err(Error::path(format!("{self} is not below {ancestor}")));
        }
        Ok(RelativePath::from_steps(&self.steps[ancestor.steps.len()..]))
    }
}

impl fmt::Display for TaskPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, step) in self.steps.iter().enumerate() {
            if idx > 0 {
                write!(f, "{SEPARATOR}")?;
            }
            f.write_str(step)?;
        }
        Ok(())
    }
}

/// Position of a task relative to one of its ancestors, e.g. `"b"` or `"b.c"`.
///
/// Used as the key of [`CacheResult::sub_results`](crate::CacheResult).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RelativePath(String);

impl RelativePath {
    fn from_steps(steps: &[String]) -> Self {
        Self(steps.join(&SEPARATOR.to_string()))
    }

    /// Create from its text form
    #[must_use]
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    /// Text form
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RelativePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RelativePath {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Path of `task`, defaulting to a root path named after its task type
#[must_use]
pub fn path_of(task: &dyn TaskNode) -> TaskPath {
    task.state()
        .path()
        .unwrap_or_else(|| TaskPath::root(task.task_name()))
}

/// Assign paths to `task` and every sub-task below it.
///
/// A task without a path becomes a root. Tasks that already carry a path keep
/// it, so calling this on a nested task preserves its position in the tree.
pub fn ensure_paths(task: &dyn TaskNode) {
    let path = path_of(task);
    task.state().set_path(path.clone());
    assign_children(task, &path);
}

fn assign_children(task: &dyn TaskNode, path: &TaskPath) {
    for field in task.fields() {
        if let FieldKind::Subtask(child) = field.kind() {
            let child_path = path.child(field.name());
            child.state().set_path(child_path.clone());
            assign_children(*child, &child_path);
        }
    }
}
