#![forbid(unsafe_code)]

//! Field binder: attaching and detaching control listeners.
//!
//! Binding a field resolves its selector inside the instance's scope,
//! subscribes a change listener on every resolved control, and hands back
//! weak element handles plus paired disposers. Rebinding is idempotent:
//! the engine always disposes a field's previous listeners before storing
//! a new binding, so a host re-render never stacks handlers.
//!
//! # Commit strategies
//!
//! Two strategies coexist, chosen per field rule by [`reaction`]:
//!
//! - **Commit-on-change** (default): settled changes commit; text-like
//!   kinds also commit on keystroke-granularity input.
//! - **Deferred-commit** ([`CommitPolicy::Confirmed`]): input events only
//!   update a pending side value, keeping downstream fields locked until
//!   the confirming change event commits.

use std::sync::{Arc, Weak};

use formwire_core::host::{BindingScope, ChangeKind, ChangeListener, Control, ListenerId};
use formwire_core::rules::{CommitPolicy, FieldRule};

/// Disposer for one attached control listener.
///
/// Holds the control weakly: if the host already destroyed the control,
/// there is nothing left to detach.
pub struct ListenerDisposer {
    control: Weak<dyn Control>,
    id: ListenerId,
}

impl ListenerDisposer {
    /// Pair a weak control handle with its listener id.
    #[must_use]
    pub fn new(control: Weak<dyn Control>, id: ListenerId) -> Self {
        Self { control, id }
    }

    /// Detach the listener if its control is still alive.
    pub fn dispose(&self) {
        if let Some(control) = self.control.upgrade() {
            control.unsubscribe(self.id);
        }
    }
}

/// Result of binding one field.
pub struct FieldBinding {
    /// Weak handles to the resolved controls, for the value store.
    pub elements: Vec<Weak<dyn Control>>,
    /// Disposers paired with every attached listener.
    pub disposers: Vec<ListenerDisposer>,
}

impl FieldBinding {
    /// Number of controls bound.
    #[must_use]
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// Whether the selector resolved nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
}

/// Resolve a field's controls and attach `listener` to each.
///
/// An empty resolution is not an error; the field stays unbound until the
/// host re-renders and the engine rebinds.
#[must_use]
pub fn bind(scope: &dyn BindingScope, rule: &FieldRule, listener: ChangeListener) -> FieldBinding {
    let controls = scope.resolve(&rule.selector);
    let mut elements = Vec::with_capacity(controls.len());
    let mut disposers = Vec::with_capacity(controls.len());
    for control in controls {
        let id = control.subscribe(listener.clone());
        elements.push(Arc::downgrade(&control));
        disposers.push(ListenerDisposer::new(Arc::downgrade(&control), id));
    }
    tracing::trace!(
        field = %rule.name,
        selector = %rule.selector,
        controls = elements.len(),
        "field bound"
    );
    FieldBinding {
        elements,
        disposers,
    }
}

/// How the engine reacts to one change notification for one field.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BindReaction {
    /// Commit the read and, if it changed, run effects and recompute.
    CommitAndRecompute,
    /// Update the pending side value only; no commit, no recompute.
    UpdatePending,
    /// Ignore the notification.
    Ignore,
}

/// Select the commit strategy for a notification.
#[must_use]
pub fn reaction(rule: &FieldRule, kind: ChangeKind) -> BindReaction {
    match (kind, rule.commit) {
        (ChangeKind::Commit, _) => BindReaction::CommitAndRecompute,
        (ChangeKind::Input, CommitPolicy::Confirmed) => BindReaction::UpdatePending,
        (ChangeKind::Input, CommitPolicy::OnChange) => {
            if rule.control.commits_on_input() {
                BindReaction::CommitAndRecompute
            } else {
                BindReaction::Ignore
            }
        }
    }
}
