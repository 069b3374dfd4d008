//! # Delta Algebra
//!
//! Field-level forward diffs between two flat attribute maps.
//!
//! A delta maps changed keys to their new values and removed keys to the
//! explicit tombstone (`null`). Values compare under deep structural
//! equality; arrays are replaced wholesale rather than patched, so there
//! is never an ambiguous element-level merge.

use serde_json::Value;

use crate::backend::Document;
use crate::model::is_reserved_key;

/// Compute the forward delta that turns `original` into `updated`.
///
/// Reserved host keys are skipped. Keys present in `original` but absent
/// from `updated` appear in the delta with the tombstone value.
pub fn compute(original: &Document, updated: &Document) -> Document {
    let mut delta = Document::new();

    for (key, value) in updated {
        if is_reserved_key(key) {
            continue;
        }
        if original.get(key) != Some(value) {
            delta.insert(key.clone(), value.clone());
        }
    }

    for key in original.keys() {
        if is_reserved_key(key) {
            continue;
        }
        if !updated.contains_key(key) {
            delta.insert(key.clone(), Value::Null);
        }
    }

    delta
}

/// Apply a delta to a base state, producing the next state.
///
/// Tombstoned keys are removed; all other keys are set. `base` is not
/// mutated.
pub fn apply(base: &Document, delta: &Document) -> Document {
    let mut next = base.clone();
    for (key, value) in delta {
        if value.is_null() {
            next.remove(key);
        } else {
            next.insert(key.clone(), value.clone());
        }
    }
    next
}

/// True iff the delta changes nothing.
pub fn is_empty(delta: &Document) -> bool {
    delta.is_empty()
}
