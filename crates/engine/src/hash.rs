//! Deterministic task hashing
//!
//! A task's hash covers, in declared order:
//!
//! 1. every cached field (`field:<name>` → canonical bytes, or
//!    `subtask:<name>` → the sub-task's content hash)
//! 2. call-time inputs, when present (`params`, `arg:<i>`, `kwarg:<name>`)
//! 3. the task's definition identity
//!
//! Each contribution is length-prefixed before it enters SHA-256, so
//! boundaries between labels and payloads cannot be shifted to forge a
//! collision. The text form is `<TaskName>_<hex digest>`, with characters
//! that cannot appear in a store key replaced by `_` in the name part.

use crate::field::FieldKind;
use crate::registry::default_scope;
use crate::serializer;
use crate::task::{CallArgs, TaskNode};
use crate::tree::path_of;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

const DIGEST_HEX_LEN: usize = 64;

/// Content identifier of a task: `<TaskName>_<hex sha256>`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Hash(String);

impl Hash {
    fn from_digest(task_name: &str, digest: &[u8]) -> Self {
        Self(format!("{}_{}", default_scope(task_name), hex::encode(digest)))
    }

    /// Parse and validate the text form
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidHash`] if the text is not `<name>_<64 hex
    /// characters>` with a name made of ASCII alphanumerics, `-`, `_` and `.`.
    pub fn parse(text: impl Into<String>) -> Result<Self> {
        let text = text.into();
        let Some((name, digest)) = text.rsplit_once('_') else {
            return Err(Error::invalid_hash(
                &text,
                "expected the form <TaskName>_<digest>",
            ));
        };
        if name.is_empty() {
            return Err(Error::invalid_hash(&text, "the task name is empty"));
        }
        if let Some(bad) = name
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
        {
            return Err(Error::invalid_hash(
                &text,
                format!("the task name contains invalid character '{bad}'"),
            ));
        }
        if digest.len() != DIGEST_HEX_LEN || !digest.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(Error::invalid_hash(
                &text,
                format!("the digest must be {DIGEST_HEX_LEN} hex characters"),
            ));
        }
        Ok(Self(text))
    }

    /// Text form
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Task name part, as sanitized for storage
    #[must_use]
    pub fn task_name(&self) -> &str {
        self.0.rsplit_once('_').map_or("", |(name, _)| name)
    }

    /// Hex digest part
    #[must_use]
    pub fn digest_hex(&self) -> &str {
        self.0.rsplit_once('_').map_or("", |(_, digest)| digest)
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Hash {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Both hashes produced for one task
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskHashes {
    /// Cache key: content plus call-time inputs
    pub key: Hash,
    /// Fields and definition only; what a parent embeds for this task
    pub content: Hash,
}

#[derive(Debug, Clone, Default)]
struct Contributions {
    parts: Vec<(String, Vec<u8>)>,
}

impl Contributions {
    fn push(&mut self, label: impl Into<String>, bytes: Vec<u8>) {
        self.parts.push((label.into(), bytes));
    }

    fn digest(&self) -> Vec<u8> {
        let mut hasher = Sha256::new();
        for (label, bytes) in &self.parts {
            hasher.update((label.len() as u64).to_le_bytes());
            hasher.update(label.as_bytes());
            hasher.update((bytes.len() as u64).to_le_bytes());
            hasher.update(bytes);
        }
        hasher.finalize().as_slice().to_vec()
    }
}

/// Compute the cache key of `task` for one invocation.
///
/// Records the key as the task's last computed hash and the content hash of
/// the task and every sub-task below it.
///
/// # Errors
///
/// [`Error::Serialization`] when a cached field cannot be serialized and
/// [`Error::ChildHash`] when a sub-task's hashing fails.
pub fn compute_hash(task: &dyn TaskNode, call: Option<&CallArgs>) -> Result<Hash> {
    let hashes = compute_hashes(task, call)?;
    task.state().set_last_hash(hashes.key.clone());
    Ok(hashes.key)
}

/// Content hash of `task`, without touching its last computed key
///
/// # Errors
///
/// Same as [`compute_hash`].
pub fn content_hash(task: &dyn TaskNode) -> Result<Hash> {
    compute_hashes(task, None).map(|h| h.content)
}

/// Compute key and content hash of `task` without recording the key
///
/// # Errors
///
/// Same as [`compute_hash`].
pub fn compute_hashes(task: &dyn TaskNode, call: Option<&CallArgs>) -> Result<TaskHashes> {
    let task_path = path_of(task).to_string();
    let mut content = Contributions::default();

    for field in task.fields() {
        if !field.is_cached() {
            tracing::trace!(task = %task_path, field = field.name(), "Field excluded from hash");
            continue;
        }
        match field.kind() {
            FieldKind::Plain(value) => {
                let bytes = value
                    .canonical_bytes()
                    .map_err(|e| Error::serialization(&task_path, field.name(), e.message()))?;
                content.push(format!("field:{}", field.name()), bytes);
            }
            FieldKind::Subtask(child) => {
                let child_hash = content_hash(*child)
                    .map_err(|e| Error::child_hash(&task_path, field.name(), e))?;
                content.push(
                    format!("subtask:{}", field.name()),
                    child_hash.as_str().as_bytes().to_vec(),
                );
            }
            FieldKind::Tool => {}
        }
    }

    let mut keyed = content.clone();
    if let Some(call) = call.filter(|c| !c.is_empty()) {
        push_call_inputs(&mut keyed, call, &task_path)?;
    }

    let definition = task.definition().as_bytes().to_vec();
    content.push("definition", definition.clone());
    keyed.push("definition", definition);

    let hashes = TaskHashes {
        key: Hash::from_digest(task.task_name(), &keyed.digest()),
        content: Hash::from_digest(task.task_name(), &content.digest()),
    };
    task.state().set_content_hash(hashes.content.clone());
    tracing::trace!(task = %task_path, key = %hashes.key, "Computed task hash");
    Ok(hashes)
}

fn push_call_inputs(parts: &mut Contributions, call: &CallArgs, task_path: &str) -> Result<()> {
    let encode = |label: &str, value: &serde_json::Value| {
        serializer::canonical_value_bytes(value)
            .map_err(|e| Error::serialization(task_path, label, e.message()))
    };

    if let Some(params) = call.params() {
        let bytes = serializer::serialize(params)
            .map_err(|e| Error::serialization(task_path, "params", e.message()))?;
        parts.push("params", bytes);
    }
    for (idx, value) in call.args().iter().enumerate() {
        let label = format!("arg:{idx}");
        let bytes = encode(&label, value)?;
        parts.push(label, bytes);
    }
    for (name, value) in call.kwargs() {
        let label = format!("kwarg:{name}");
        let bytes = encode(&label, value)?;
        parts.push(label, bytes);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::Field;
    use crate::task::TaskState;
    use std::collections::BTreeMap;

    struct Leaf {
        x: i64,
        note: String,
        state: TaskState,
    }

    impl TaskNode for Leaf {
        fn task_name(&self) -> &str {
            "Leaf"
        }
        fn definition(&self) -> &str {
            "1"
        }
        fn fields(&self) -> Vec<Field<'_>> {
            vec![
                Field::plain("x", &self.x),
                Field::plain("note", &self.note).transient(),
                Field::tool("client"),
            ]
        }
        fn state(&self) -> &TaskState {
            &self.state
        }
    }

    struct Parent {
        label: String,
        leaf: Leaf,
        bad: BTreeMap<(u8, u8), u8>,
        state: TaskState,
    }

    impl TaskNode for Parent {
        fn task_name(&self) -> &str {
            "Parent"
        }
        fn definition(&self) -> &str {
            "1"
        }
        fn fields(&self) -> Vec<Field<'_>> {
            let mut fields = vec![
                Field::plain("label", &self.label),
                Field::subtask("leaf", &self.leaf),
            ];
            if !self.bad.is_empty() {
                fields.push(Field::plain("bad", &self.bad));
            }
            fields
        }
        fn state(&self) -> &TaskState {
            &self.state
        }
    }

    fn leaf(x: i64) -> Leaf {
        Leaf {
            x,
            note: "n".into(),
            state: TaskState::new(),
        }
    }

    fn parent(x: i64) -> Parent {
        Parent {
            label: "p".into(),
            leaf: leaf(x),
            bad: BTreeMap::new(),
            state: TaskState::new(),
        }
    }

    #[test]
    fn hash_has_name_prefix_and_hex_digest() {
        let hash = compute_hash(&leaf(1), None).unwrap();
        assert!(hash.as_str().starts_with("Leaf_"));
        assert_eq!(hash.task_name(), "Leaf");
        assert_eq!(hash.digest_hex().len(), 64);
        assert_eq!(Hash::parse(hash.as_str()).unwrap(), hash);
    }

    #[test]
    fn hash_is_deterministic() {
        let task = parent(1);
        assert_eq!(
            compute_hash(&task, None).unwrap(),
            compute_hash(&task, None).unwrap()
        );
    }

    #[test]
    fn field_change_changes_hash() {
        let mut task = leaf(1);
        let before = compute_hash(&task, None).unwrap();
        task.x = 2;
        assert_ne!(before, compute_hash(&task, None).unwrap());
    }

    #[test]
    fn transient_change_keeps_hash() {
        let mut task = leaf(1);
        let before = compute_hash(&task, None).unwrap();
        task.note = "different".into();
        assert_eq!(before, compute_hash(&task, None).unwrap());
    }

    #[test]
    fn subtask_change_propagates_to_parent() {
        let mut task = parent(1);
        let before = compute_hash(&task, None).unwrap();
        task.leaf.x = 5;
        assert_ne!(before, compute_hash(&task, None).unwrap());
    }

    #[test]
    fn call_inputs_change_key_but_not_content() {
        let task = leaf(1);
        let plain = compute_hashes(&task, None).unwrap();
        let with_args = compute_hashes(&task, Some(&CallArgs::new().arg(3))).unwrap();
        assert_eq!(plain.key, plain.content);
        assert_ne!(with_args.key, plain.key);
        assert_eq!(with_args.content, plain.content);

        let empty = compute_hashes(&task, Some(&CallArgs::new())).unwrap();
        assert_eq!(empty.key, plain.key);
    }

    #[test]
    fn compute_hash_records_state() {
        let task = parent(1);
        let key = compute_hash(&task, Some(&CallArgs::new().kwarg("k", 1))).unwrap();
        assert_eq!(task.state.last_hash(), Some(key));
        assert!(task.leaf.state.content_hash().is_some());
        assert!(task.leaf.state.last_hash().is_none());
    }

    #[test]
    fn unserializable_field_is_annotated() {
        let mut task = parent(1);
        task.bad.insert((1, 2), 3);
        let err = compute_hash(&task, None).unwrap_err();
        match err {
            Error::Serialization { field, task_path, .. } => {
                assert_eq!(field, "bad");
                assert_eq!(task_path, "Parent");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    struct Namespaced {
        state: TaskState,
    }

    impl TaskNode for Namespaced {
        fn task_name(&self) -> &str {
            "img::Crop<u8>"
        }
        fn definition(&self) -> &str {
            "1"
        }
        fn fields(&self) -> Vec<Field<'_>> {
            Vec::new()
        }
        fn state(&self) -> &TaskState {
            &self.state
        }
    }

    #[test]
    fn task_name_is_sanitized_in_hash_text() {
        let task = Namespaced {
            state: TaskState::new(),
        };
        let hash = compute_hash(&task, None).unwrap();
        assert_eq!(hash.task_name(), "img__Crop_u8_");
        assert_eq!(Hash::parse(hash.as_str()).unwrap(), hash);
        assert!(crate::store::validate_name("Key", hash.as_str()).is_ok());
    }

    #[test]
    fn parse_rejects_malformed_hashes() {
        assert!(matches!(
            Hash::parse("nounderscore"),
            Err(Error::InvalidHash { .. })
        ));
        assert!(Hash::parse("nounderscore").is_err());
        assert!(Hash::parse("_abc").is_err());
        assert!(Hash::parse("Leaf_xyz").is_err());
        assert!(Hash::parse(format!("Leaf_{}", "g".repeat(64))).is_err());
        assert!(Hash::parse(format!("img::Crop_{}", "a".repeat(64))).is_err());
        assert!(Hash::parse(format!("My_Task_{}", "a".repeat(64))).is_ok());
    }
}
