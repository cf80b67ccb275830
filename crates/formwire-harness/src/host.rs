#![forbid(unsafe_code)]

//! In-memory controls and binding scope.
//!
//! [`MockControl`] mimics a host input control: it holds a reading,
//! dispatches change notifications synchronously, and can be connected or
//! disconnected to simulate host re-renders. [`MockScope`] maps selectors
//! to control lists and can be mutated mid-test to simulate a host adding
//! or removing nodes.
//!
//! Listener dispatch clones the listener list out of the lock before
//! invoking anything, so a listener that re-enters the host (rebinds,
//! reads) never deadlocks.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use formwire_core::host::{
    BindingScope, ChangeKind, ChangeListener, Control, ControlReading, ListenerId,
};

/// An in-memory host control.
pub struct MockControl {
    reading: Mutex<ControlReading>,
    listeners: Mutex<Vec<(ListenerId, ChangeListener)>>,
    next_id: AtomicU64,
    connected: AtomicBool,
}

impl MockControl {
    fn with_reading(reading: ControlReading) -> Arc<Self> {
        Arc::new(Self {
            reading: Mutex::new(reading),
            listeners: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            connected: AtomicBool::new(true),
        })
    }

    /// A text-like control (text, number, range, hidden, slider).
    #[must_use]
    pub fn text(initial: &str) -> Arc<Self> {
        Self::with_reading(ControlReading::text(initial))
    }

    /// One radio button of a group.
    #[must_use]
    pub fn radio(value: &str, checked: bool) -> Arc<Self> {
        Self::with_reading(ControlReading::checkable(value, checked))
    }

    /// A checkbox (standalone or group member).
    #[must_use]
    pub fn checkbox(value: &str, checked: bool) -> Arc<Self> {
        Self::with_reading(ControlReading::checkable(value, checked))
    }

    /// A multi-select with the given initial selection.
    #[must_use]
    pub fn multi_select(selected: Vec<String>) -> Arc<Self> {
        Self::with_reading(ControlReading::selection(selected))
    }

    /// Simulate keystroke input: update the value, notify at input
    /// granularity.
    pub fn type_value(&self, value: &str) {
        self.reading.lock().unwrap().value = value.to_owned();
        self.emit(ChangeKind::Input);
    }

    /// Simulate a settled change: update the value, notify with a commit.
    pub fn commit_value(&self, value: &str) {
        self.reading.lock().unwrap().value = value.to_owned();
        self.emit(ChangeKind::Commit);
    }

    /// Toggle a checkable control and notify with a commit.
    pub fn set_checked(&self, checked: bool) {
        self.reading.lock().unwrap().checked = Some(checked);
        self.emit(ChangeKind::Commit);
    }

    /// Replace a multi-select's selection and notify with a commit.
    pub fn select(&self, selected: Vec<String>) {
        self.reading.lock().unwrap().selected = selected;
        self.emit(ChangeKind::Commit);
    }

    /// Simulate dragging a slider: value moves at input granularity only.
    pub fn slide(&self, value: &str) {
        self.reading.lock().unwrap().value = value.to_owned();
        self.emit(ChangeKind::Input);
    }

    /// Simulate the explicit confirmation step after a drag.
    pub fn confirm(&self) {
        self.emit(ChangeKind::Commit);
    }

    /// Detach the control from the simulated live tree.
    pub fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    /// Reattach the control to the simulated live tree.
    pub fn reconnect(&self) {
        self.connected.store(true, Ordering::SeqCst);
    }

    /// Number of listeners currently attached.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.listeners.lock().unwrap().len()
    }

    /// Dispatch a change notification to every attached listener.
    pub fn emit(&self, kind: ChangeKind) {
        let listeners: Vec<ChangeListener> = self
            .listeners
            .lock()
            .unwrap()
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();
        for listener in listeners {
            listener(kind);
        }
    }
}

impl Control for MockControl {
    fn reading(&self) -> ControlReading {
        self.reading.lock().unwrap().clone()
    }

    fn connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn subscribe(&self, listener: ChangeListener) -> ListenerId {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.listeners.lock().unwrap().push((id, listener));
        id
    }

    fn unsubscribe(&self, id: ListenerId) {
        self.listeners.lock().unwrap().retain(|(l, _)| *l != id);
    }
}

/// Selector → controls mapping for one simulated widget root.
#[derive(Default)]
pub struct MockScope {
    controls: Mutex<HashMap<String, Vec<Arc<MockControl>>>>,
}

impl MockScope {
    /// Create an empty scope.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Install (or replace) the controls a selector resolves to.
    pub fn install(&self, selector: &str, controls: Vec<Arc<MockControl>>) {
        self.controls
            .lock()
            .unwrap()
            .insert(selector.to_owned(), controls);
    }

    /// Remove a selector entirely, simulating destroyed nodes.
    pub fn remove(&self, selector: &str) {
        self.controls.lock().unwrap().remove(selector);
    }
}

impl BindingScope for MockScope {
    fn resolve(&self, selector: &str) -> Vec<Arc<dyn Control>> {
        self.controls
            .lock()
            .unwrap()
            .get(selector)
            .map(|controls| {
                controls
                    .iter()
                    .map(|c| c.clone() as Arc<dyn Control>)
                    .collect()
            })
            .unwrap_or_default()
    }
}
