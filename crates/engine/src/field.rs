//! Declared field schema of a task
//!
//! Instead of discovering state at runtime, each task lists its fields in a
//! fixed order through [`TaskNode::fields`](crate::TaskNode::fields). The
//! [`FieldKind`] decides how a field takes part in hashing:
//!
//! - [`FieldKind::Plain`]: serialized canonically and hashed
//! - [`FieldKind::Subtask`]: contributes the sub-task's own hash
//! - [`FieldKind::Tool`]: execution context, never hashed
//!
//! Any field can additionally be marked transient, which excludes it from
//! hashing and invalidation.

use crate::serializer::ContentValue;
use crate::task::TaskNode;
use serde::Serialize;
use std::borrow::Cow;
use std::fmt;

/// Names that never contribute to a hash even if a schema declares them.
///
/// They refer to engine bookkeeping (memoized hashes and results, the run
/// entry point, logging handles, default-value registries).
pub const RESERVED_FIELD_NAMES: &[&str] = &[
    "run",
    "state",
    "task_hash",
    "task_result",
    "is_invalid",
    "log",
    "logger",
    "default_params",
];

/// Whether `name` is one of [`RESERVED_FIELD_NAMES`]
#[must_use]
pub fn is_reserved(name: &str) -> bool {
    RESERVED_FIELD_NAMES.contains(&name)
}

/// How a field takes part in hashing
pub enum FieldKind<'a> {
    /// A plain value, hashed through the content serializer
    Plain(&'a dyn ContentValue),
    /// A nested task contributing its own hash
    Subtask(&'a dyn TaskNode),
    /// Execution context such as credentials or connections
    Tool,
}

impl fmt::Debug for FieldKind<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Plain(_) => f.write_str("Plain"),
            Self::Subtask(task) => write!(f, "Subtask({})", task.task_name()),
            Self::Tool => f.write_str("Tool"),
        }
    }
}

/// One declared field of a task
#[derive(Debug)]
pub struct Field<'a> {
    name: Cow<'static, str>,
    kind: FieldKind<'a>,
    transient: bool,
}

impl<'a> Field<'a> {
    /// A hashed value field
    pub fn plain<T: Serialize>(name: impl Into<Cow<'static, str>>, value: &'a T) -> Self {
        Self {
            name: name.into(),
            kind: FieldKind::Plain(value),
            transient: false,
        }
    }

    /// A sub-task field
    pub fn subtask(name: impl Into<Cow<'static, str>>, task: &'a dyn TaskNode) -> Self {
        Self {
            name: name.into(),
            kind: FieldKind::Subtask(task),
            transient: false,
        }
    }

    /// A tool field, never hashed
    pub fn tool(name: impl Into<Cow<'static, str>>) -> Self {
        Self {
            name: name.into(),
            kind: FieldKind::Tool,
            transient: false,
        }
    }

    /// Mark this field transient
    #[must_use]
    pub fn transient(mut self) -> Self {
        self.transient = true;
        self
    }

    /// Field name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Field kind
    #[must_use]
    pub const fn kind(&self) -> &FieldKind<'a> {
        &self.kind
    }

    /// Whether the field was marked transient
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        self.transient
    }

    /// Whether the field takes part in hashing and invalidation
    #[must_use]
    pub fn is_cached(&self) -> bool {
        !self.transient && !matches!(self.kind, FieldKind::Tool) && !is_reserved(&self.name)
    }

    /// The sub-task held by this field, if it is a cached sub-task field
    #[must_use]
    pub fn cached_subtask(&self) -> Option<&'a dyn TaskNode> {
        match self.kind {
            FieldKind::Subtask(task) if self.is_cached() => Some(task),
            _ => None,
        }
    }
}
