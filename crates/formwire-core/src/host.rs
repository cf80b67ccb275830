#![forbid(unsafe_code)]

//! Host abstraction: binding scopes and bound controls.
//!
//! The engine never touches a DOM. Hosts expose their input controls
//! through the [`Control`] trait and selector resolution through
//! [`BindingScope`]; any host that can do both can drive the engine:
//! a browser bridge, a native toolkit, or the deterministic test host.
//!
//! # Staleness
//!
//! Hosts re-render and destroy controls at will, so the engine only ever
//! keeps `Weak` handles to controls. A handle that no longer upgrades, or
//! whose control reports `connected() == false`, is treated as absent and
//! the value reader falls back to committed or persisted values.
//!
//! # Change delivery
//!
//! Controls deliver change notifications synchronously on the host's event
//! loop. [`ChangeKind::Input`] mirrors a keystroke-granularity event,
//! [`ChangeKind::Commit`] a settled change. Every subscription returns a
//! [`ListenerId`] so the binder can detach it again; cross-instance
//! listener leakage is a correctness violation on the engine side.

use std::sync::Arc;

/// Granularity of a control change notification.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChangeKind {
    /// Keystroke-granularity update (the host's `input` event).
    Input,
    /// Settled change (the host's `change` event).
    Commit,
}

/// Identifier of one attached change listener, scoped to its control.
pub type ListenerId = u64;

/// Callback attached to a control; invoked synchronously by the host.
pub type ChangeListener = Arc<dyn Fn(ChangeKind) + Send + Sync>;

/// What the engine can read from one control in one call.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ControlReading {
    /// The raw control value.
    pub value: String,
    /// Checked state for radios and checkboxes; `None` for other kinds.
    pub checked: Option<bool>,
    /// Selected values for multi-selects; empty for other kinds.
    pub selected: Vec<String>,
}

impl ControlReading {
    /// Reading for a plain value-bearing control.
    #[must_use]
    pub fn text(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            ..Self::default()
        }
    }

    /// Reading for a checkable control (radio, checkbox).
    #[must_use]
    pub fn checkable(value: impl Into<String>, checked: bool) -> Self {
        Self {
            value: value.into(),
            checked: Some(checked),
            ..Self::default()
        }
    }

    /// Reading for a multi-select control.
    #[must_use]
    pub fn selection(selected: Vec<String>) -> Self {
        Self {
            selected,
            ..Self::default()
        }
    }
}

/// A bound input control exposed by the host.
pub trait Control: Send + Sync {
    /// Read the control's current state.
    fn reading(&self) -> ControlReading;

    /// Whether the control is still attached to the host's live tree.
    ///
    /// Disconnected controls are skipped by the value reader even while
    /// their handle still upgrades.
    fn connected(&self) -> bool {
        true
    }

    /// Attach a change listener; returns an id for detachment.
    ///
    /// Must not invoke `listener` synchronously during subscription;
    /// deliver the current value through a change event instead.
    fn subscribe(&self, listener: ChangeListener) -> ListenerId;

    /// Detach a previously attached listener. Unknown ids are a no-op.
    fn unsubscribe(&self, id: ListenerId);
}

/// Selector resolution scoped to one widget root.
///
/// Each engine instance binds inside exactly one scope; resolving through
/// the instance's own scope is what keeps listeners from leaking across
/// widget copies on the same page.
pub trait BindingScope: Send + Sync {
    /// Resolve a selector to the currently matching controls.
    ///
    /// An empty result is not an error: the field is simply unbound until
    /// the host re-renders and the engine rebinds.
    fn resolve(&self, selector: &str) -> Vec<Arc<dyn Control>>;
}
