#![forbid(unsafe_code)]

//! Immutable snapshots of committed values.
//!
//! All recompute and gating logic runs against a [`Snapshot`] taken at the
//! start of the pass, never against the live store, so one pass sees one
//! consistent world even if callbacks mutate values mid-flight.
//!
//! Besides committed values, a snapshot carries the names of fields with a
//! pending (unconfirmed) side value. Deferred-commit controls update that
//! side value on every input; section mode variants use the pending set to
//! narrow field lists while a confirmation is outstanding.

use std::collections::{HashMap, HashSet};

use crate::value::FieldValue;

/// An immutable-for-the-duration copy of all committed values.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Snapshot {
    values: HashMap<String, FieldValue>,
    pending: HashSet<String>,
}

impl Snapshot {
    /// Build a snapshot from committed values and the pending-field set.
    #[must_use]
    pub fn new(values: HashMap<String, FieldValue>, pending: HashSet<String>) -> Self {
        Self { values, pending }
    }

    /// The committed value for `name`, if any.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.values.get(name)
    }

    /// The text value for `name`, or `""` when absent or not text.
    #[must_use]
    pub fn text(&self, name: &str) -> &str {
        self.values
            .get(name)
            .and_then(FieldValue::as_text)
            .unwrap_or("")
    }

    /// The list value for `name`, or an empty slice.
    #[must_use]
    pub fn list(&self, name: &str) -> &[String] {
        self.values
            .get(name)
            .and_then(FieldValue::as_list)
            .unwrap_or(&[])
    }

    /// Whether `name` holds an affirmative answer (`yes` sentinel or `true`).
    #[must_use]
    pub fn flag(&self, name: &str) -> bool {
        self.values
            .get(name)
            .is_some_and(FieldValue::is_affirmative)
    }

    /// Whether `name` holds a non-empty committed value.
    #[must_use]
    pub fn has(&self, name: &str) -> bool {
        self.values.get(name).is_some_and(|v| !v.is_empty())
    }

    /// Whether `name` has a pending, unconfirmed side value.
    #[must_use]
    pub fn has_pending(&self, name: &str) -> bool {
        self.pending.contains(name)
    }

    /// All committed values.
    #[must_use]
    pub fn values(&self) -> &HashMap<String, FieldValue> {
        &self.values
    }

    /// Number of committed values.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether no values are committed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
