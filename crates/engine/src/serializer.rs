//! Canonical byte encoding of field values
//!
//! Values are routed through `serde` into a [`serde_json::Value`] and then
//! written out with object keys in sorted order, so the bytes depend only on
//! the logical content of a value and never on map insertion order or memory
//! layout. Values that `serde_json` refuses (non-string map keys, custom
//! `Serialize` impls that fail for live handles) surface as [`ContentError`].
//!
//! Sequences keep their order, so unordered containers whose iteration order
//! varies between runs (`HashSet`) must not be used in hashed fields; prefer
//! `BTreeSet`. Maps of any kind are fine since their keys are sorted here.

use serde::Serialize;
use serde_json::Value;
use std::fmt;

/// A value has no canonical serialized form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentError {
    message: String,
}

impl ContentError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// The serializer's message
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for ContentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for ContentError {}

/// Object-safe view of a serializable field value.
///
/// Implemented for every `Serialize` type so task schemas can hold
/// heterogeneous field references behind `&dyn ContentValue`.
pub trait ContentValue {
    /// Encode this value canonically
    ///
    /// # Errors
    ///
    /// Returns [`ContentError`] when the value cannot be represented canonically.
    fn canonical_bytes(&self) -> Result<Vec<u8>, ContentError>;
}

impl<T: Serialize + ?Sized> ContentValue for T {
    fn canonical_bytes(&self) -> Result<Vec<u8>, ContentError> {
        serialize(self)
    }
}

/// Serialize a value into its canonical byte representation
///
/// # Errors
///
/// Returns [`ContentError`] when the value cannot be represented canonically.
pub fn serialize<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, ContentError> {
    let value = serde_json::to_value(value).map_err(|e| ContentError::new(e.to_string()))?;
    canonical_value_bytes(&value)
}

/// Canonical bytes of an already-built JSON value
///
/// # Errors
///
/// Returns [`ContentError`] if a scalar cannot be written.
pub fn canonical_value_bytes(value: &Value) -> Result<Vec<u8>, ContentError> {
    let mut out = Vec::with_capacity(64);
    write_canonical(value, &mut out)?;
    Ok(out)
}

fn write_canonical(value: &Value, out: &mut Vec<u8>) -> Result<(), ContentError> {
    match value {
        Value::Array(items) => {
            out.push(b'[');
            for (idx, item) in items.iter().enumerate() {
                if idx > 0 {
                    out.push(b',');
                }
                write_canonical(item, out)?;
            }
            out.push(b']');
        }
        Value::Object(map) => {
            // Sort explicitly: serde_json's map order depends on the
            // `preserve_order` feature, which any crate in the graph may enable.
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by(|(a, _), (b, _)| a.cmp(b));
            out.push(b'{');
            for (idx, (key, item)) in entries.into_iter().enumerate() {
                if idx > 0 {
                    out.push(b',');
                }
                serde_json::to_writer(&mut *out, key)
                    .map_err(|e| ContentError::new(e.to_string()))?;
                out.push(b':');
                write_canonical(item, out)?;
            }
            out.push(b'}');
        }
        scalar => {
            serde_json::to_writer(&mut *out, scalar)
                .map_err(|e| ContentError::new(e.to_string()))?;
        }
    }
    Ok(())
}
