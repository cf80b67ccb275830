#![forbid(unsafe_code)]

//! Instance registry and the active-instance pointer.
//!
//! One [`InstanceRecord`] per logical widget instance, created lazily on
//! first reference. A single *active* pointer provides ambient context for
//! calls that do not name an instance: call sites in the surrounding
//! system were written against one global engine, and this indirection
//! lets duplicated widgets coexist without rewriting them.
//!
//! Separately from *active*, at most one instance is *live*: actually
//! bound to host controls. A second initialization while another instance
//! is live is refused, never raced (multi-instance operation isolates
//! state; it does not interleave live bindings).

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use formwire_core::host::BindingScope;

use crate::binder::ListenerDisposer;
use crate::persistence::AppState;
use crate::recompute::ViewPlan;
use crate::scheduler::TaskHandle;
use crate::store::ValueStore;

/// Opaque id of one logical widget instance.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceId(String);

impl InstanceId {
    /// The id as a string slice (also the persisted-store key).
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for InstanceId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<String> for InstanceId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// State record of one widget instance.
pub(crate) struct InstanceRecord {
    pub(crate) id: InstanceId,
    pub(crate) store: ValueStore,
    pub(crate) scope: Option<Arc<dyn BindingScope>>,
    pub(crate) listeners: HashMap<String, Vec<ListenerDisposer>>,
    pub(crate) app_state: Option<AppState>,
    pub(crate) save_timer: Option<TaskHandle>,
    pub(crate) last_plan: Option<ViewPlan>,
    pub(crate) initialized: bool,
}

impl InstanceRecord {
    fn new(id: InstanceId) -> Self {
        Self {
            id,
            store: ValueStore::new(),
            scope: None,
            listeners: HashMap::new(),
            app_state: None,
            save_timer: None,
            last_plan: None,
            initialized: false,
        }
    }

    /// Detach every listener for `field` and drop its element handles.
    pub(crate) fn unbind_field(&mut self, field: &str) {
        if let Some(disposers) = self.listeners.remove(field) {
            for disposer in &disposers {
                disposer.dispose();
            }
        }
        self.store.clear_elements(field);
    }

    /// Tear the record down: listeners off, timer cancelled, state cleared.
    pub(crate) fn teardown(&mut self) {
        let fields: Vec<String> = self.listeners.keys().cloned().collect();
        for field in fields {
            self.unbind_field(&field);
        }
        if let Some(timer) = self.save_timer.take() {
            timer.cancel();
        }
        self.app_state = None;
        self.scope = None;
        self.initialized = false;
    }
}

/// All instance records plus the active and live pointers.
pub(crate) struct Registry {
    records: HashMap<InstanceId, InstanceRecord>,
    active: Option<InstanceId>,
    live: Option<InstanceId>,
}

impl Registry {
    pub(crate) fn new() -> Self {
        Self {
            records: HashMap::new(),
            active: None,
            live: None,
        }
    }

    /// The record for `id`, created on first reference.
    pub(crate) fn get_or_create(&mut self, id: &InstanceId) -> &mut InstanceRecord {
        self.records
            .entry(id.clone())
            .or_insert_with(|| InstanceRecord::new(id.clone()))
    }

    pub(crate) fn record(&self, id: &InstanceId) -> Option<&InstanceRecord> {
        self.records.get(id)
    }

    pub(crate) fn record_mut(&mut self, id: &InstanceId) -> Option<&mut InstanceRecord> {
        self.records.get_mut(id)
    }

    /// Point the ambient context at `id`, creating its record lazily.
    pub(crate) fn set_active(&mut self, id: &InstanceId) {
        self.get_or_create(id);
        self.active = Some(id.clone());
    }

    pub(crate) fn active_id(&self) -> Option<&InstanceId> {
        self.active.as_ref()
    }

    pub(crate) fn active_mut(&mut self) -> Option<&mut InstanceRecord> {
        let id = self.active.clone()?;
        self.records.get_mut(&id)
    }

    /// The currently live-bound instance, if any.
    pub(crate) fn live_id(&self) -> Option<&InstanceId> {
        self.live.as_ref()
    }

    pub(crate) fn set_live(&mut self, id: &InstanceId) {
        self.live = Some(id.clone());
    }

    /// Remove the record for `id`, returning it for teardown.
    pub(crate) fn remove(&mut self, id: &InstanceId) -> Option<InstanceRecord> {
        if self.active.as_ref() == Some(id) {
            self.active = None;
        }
        if self.live.as_ref() == Some(id) {
            self.live = None;
        }
        self.records.remove(id)
    }

    pub(crate) fn len(&self) -> usize {
        self.records.len()
    }
}
