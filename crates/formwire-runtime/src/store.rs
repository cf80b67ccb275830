#![forbid(unsafe_code)]

//! Per-instance value store.
//!
//! Holds the committed values, the pending side values of deferred-commit
//! controls, and weak handles to the controls each field is bound to. One
//! store per instance; only that instance's binder and effects path write
//! to it.
//!
//! # Design Invariants
//!
//! 1. **No stored nulls**: a value that normalizes to empty is removed,
//!    never stored.
//! 2. **Defensive copies**: list values are cloned on the way in and on the
//!    way out; callers can never alias stored state.
//! 3. **Commit guard**: an empty commit onto a protected field that holds a
//!    non-empty value is refused, so transient host churn cannot erase
//!    confirmed input.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};

use formwire_core::host::Control;
use formwire_core::snapshot::Snapshot;
use formwire_core::value::FieldValue;

/// What a commit did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommitOutcome {
    /// The stored value changed (set, replaced, or removed).
    Changed,
    /// The commit was a no-op; the stored value already matched.
    Unchanged,
    /// An empty commit was refused by the protected-field guard.
    Guarded,
}

/// Committed values, pending side values, and bound-control handles for
/// one instance.
#[derive(Default)]
pub struct ValueStore {
    values: HashMap<String, FieldValue>,
    pending: HashMap<String, FieldValue>,
    elements: HashMap<String, Vec<Weak<dyn Control>>>,
}

impl ValueStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The committed value for `name`, as a defensive copy.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<FieldValue> {
        self.values.get(name).cloned()
    }

    /// Whether `name` holds a non-empty committed value.
    #[must_use]
    pub fn has(&self, name: &str) -> bool {
        self.values.get(name).is_some_and(|v| !v.is_empty())
    }

    /// Commit a value read for `name`.
    ///
    /// `value` is the resolved read (`None` when nothing resolved); it is
    /// normalized here. `protected` enables the guard: an empty result
    /// never overwrites a non-empty committed value of a protected field.
    pub fn commit(
        &mut self,
        name: &str,
        value: Option<FieldValue>,
        protected: bool,
    ) -> CommitOutcome {
        let normalized = value.map(|v| v.normalized()).filter(|v| !v.is_empty());
        match normalized {
            Some(v) => {
                if self.values.get(name) == Some(&v) {
                    CommitOutcome::Unchanged
                } else {
                    self.values.insert(name.to_owned(), v);
                    CommitOutcome::Changed
                }
            }
            None => {
                if protected && self.has(name) {
                    tracing::debug!(field = name, "empty read refused by commit guard");
                    return CommitOutcome::Guarded;
                }
                if self.values.remove(name).is_some() {
                    CommitOutcome::Changed
                } else {
                    CommitOutcome::Unchanged
                }
            }
        }
    }

    /// Remove the committed value for `name` regardless of the guard.
    pub fn clear(&mut self, name: &str) -> bool {
        self.values.remove(name).is_some()
    }

    /// Set the pending side value for a deferred-commit field.
    pub fn set_pending(&mut self, name: &str, value: FieldValue) {
        self.pending.insert(name.to_owned(), value.normalized());
    }

    /// The pending side value for `name`, as a defensive copy.
    #[must_use]
    pub fn pending(&self, name: &str) -> Option<FieldValue> {
        self.pending.get(name).cloned()
    }

    /// Drop the pending side value for `name` (after its confirming commit).
    pub fn clear_pending(&mut self, name: &str) {
        self.pending.remove(name);
    }

    /// Register the controls a field is currently bound to.
    ///
    /// Handles are weak on purpose: the host owns its controls and may
    /// destroy them at any time.
    pub fn register_elements(&mut self, name: &str, controls: Vec<Weak<dyn Control>>) {
        if controls.is_empty() {
            self.elements.remove(name);
        } else {
            self.elements.insert(name.to_owned(), controls);
        }
    }

    /// The still-live, still-connected controls bound to `name`.
    #[must_use]
    pub fn elements(&self, name: &str) -> Vec<Arc<dyn Control>> {
        self.elements
            .get(name)
            .map(|handles| {
                handles
                    .iter()
                    .filter_map(Weak::upgrade)
                    .filter(|c| c.connected())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Drop the control handles for `name`.
    pub fn clear_elements(&mut self, name: &str) {
        self.elements.remove(name);
    }

    /// All committed values (for the persistence merge).
    #[must_use]
    pub fn values(&self) -> &HashMap<String, FieldValue> {
        &self.values
    }

    /// Take an immutable snapshot of committed values and pending names.
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        let pending: HashSet<String> = self.pending.keys().cloned().collect();
        Snapshot::new(self.values.clone(), pending)
    }

    /// Number of committed values.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether nothing is committed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
