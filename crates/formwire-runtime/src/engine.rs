#![forbid(unsafe_code)]

//! The engine facade: instances, commits, and the reactive pipeline.
//!
//! [`FormEngine`] ties the registry, value stores, binder, reader,
//! recompute pipeline, gate evaluator, effects dispatcher, and persistence
//! bridge together behind the public surface hosts call.
//!
//! # Ordering
//!
//! Within one instance, one triggering change event runs the sequence
//! *commit → effects → recompute → section gates* synchronously, in that
//! order. Collaborator callbacks (effects, renderer, validator, store)
//! always run with the registry lock released, so they may re-enter the
//! engine freely.
//!
//! # Error policy
//!
//! No internal failure escapes a public entry point: per-field hydration
//! errors, effect panics, and store failures are logged and degraded.
//! A broken collaborator leaves a degraded-but-running widget, never a
//! crashed one.

use std::collections::HashSet;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use formwire_core::host::{BindingScope, ChangeKind, ChangeListener};
use formwire_core::rules::{FieldRule, RuleSet};
use formwire_core::snapshot::Snapshot;
use formwire_core::value::FieldValue;

use crate::binder::{self, BindReaction};
use crate::effects;
use crate::error::EngineError;
use crate::gate::{self, GatePolicy, GateReport, PayloadValidator};
use crate::persistence::{self, AppState, PersistedStore};
use crate::reader;
use crate::recompute::{RecomputeScope, Renderer, ViewPlan, compute_plan};
use crate::registry::{InstanceId, InstanceRecord, Registry};
use crate::scheduler::{Scheduler, TaskHandle};
use crate::store::CommitOutcome;

/// Bounded-retry policy for waiting on a late-loading dependency.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Fixed delay between attempts.
    pub delay: Duration,
    /// Attempts before the wait is abandoned and the degraded path taken.
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            delay: Duration::from_millis(250),
            max_attempts: 12,
        }
    }
}

/// Engine configuration.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Fields protected by the non-regression commit guard in addition to
    /// every `required` field.
    pub sticky_fields: HashSet<String>,
    /// Debounce delay for persisted-snapshot writes.
    pub save_debounce: Duration,
    /// What an absent payload validator means for the terminal gate.
    pub gate_policy: GatePolicy,
    /// Retry policy while waiting for the validator to load.
    pub validator_retry: RetryPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sticky_fields: HashSet::new(),
            save_debounce: Duration::from_millis(400),
            gate_policy: GatePolicy::default(),
            validator_retry: RetryPolicy::default(),
        }
    }
}

/// External collaborators the engine drives.
pub struct Collaborators {
    /// Deferred-work scheduler.
    pub scheduler: Arc<dyn Scheduler>,
    /// Applies computed maps and gate flags to the UI.
    pub renderer: Arc<dyn Renderer>,
    /// Durable per-instance key-value store.
    pub store: Arc<dyn PersistedStore>,
    /// Payload validator, if already loaded. May also arrive later via
    /// [`FormEngine::provide_validator`].
    pub validator: Option<Arc<dyn PayloadValidator>>,
}

/// What `init` did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InitOutcome {
    /// The instance was bound, hydrated, and recomputed.
    Initialized,
    /// The instance was already initialized; nothing happened.
    AlreadyInitialized,
    /// Another instance is live; this initialization was refused.
    Refused,
}

/// The reactive form rule engine.
pub struct FormEngine {
    shared: Arc<Shared>,
}

struct Shared {
    rules: Arc<RuleSet>,
    config: EngineConfig,
    scheduler: Arc<dyn Scheduler>,
    renderer: Arc<dyn Renderer>,
    store: Arc<dyn PersistedStore>,
    validator: Mutex<Option<Arc<dyn PayloadValidator>>>,
    validator_wait: Mutex<Option<TaskHandle>>,
    registry: Mutex<Registry>,
}

impl FormEngine {
    /// Create an engine with the default configuration.
    #[must_use]
    pub fn new(rules: Arc<RuleSet>, collaborators: Collaborators) -> Self {
        Self::with_config(rules, collaborators, EngineConfig::default())
    }

    /// Create an engine with an explicit configuration.
    #[must_use]
    pub fn with_config(
        rules: Arc<RuleSet>,
        collaborators: Collaborators,
        config: EngineConfig,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                rules,
                config,
                scheduler: collaborators.scheduler,
                renderer: collaborators.renderer,
                store: collaborators.store,
                validator: Mutex::new(collaborators.validator),
                validator_wait: Mutex::new(None),
                registry: Mutex::new(Registry::new()),
            }),
        }
    }

    /// Initialize an instance: bind all declared fields inside `scope`,
    /// hydrate values (persisted snapshot included), run the first
    /// recompute, and make the instance both live and active.
    ///
    /// Idempotent per instance. Refused while a different instance is
    /// live: multi-instance operation isolates state, it does not
    /// interleave live bindings.
    pub fn init(&self, id: impl Into<InstanceId>, scope: Arc<dyn BindingScope>) -> InitOutcome {
        self.shared.init(id.into(), scope)
    }

    /// Point the ambient instance context at `id`.
    pub fn set_active(&self, id: impl Into<InstanceId>) {
        let id = id.into();
        self.shared.registry.lock().unwrap().set_active(&id);
    }

    /// The instance implicit-context calls currently resolve against.
    #[must_use]
    pub fn active_id(&self) -> Option<InstanceId> {
        self.shared.registry.lock().unwrap().active_id().cloned()
    }

    /// Resolve a field's current value through the source-priority chain
    /// (live controls, committed value for required fields, persisted
    /// snapshot) without committing anything.
    #[must_use]
    pub fn read_field_value(&self, name: &str) -> Option<FieldValue> {
        self.shared.read_field_value(name)
    }

    /// Commit a value programmatically into the active instance.
    ///
    /// Runs the same pipeline as a control change: guard-checked commit,
    /// effects, recompute, gates.
    pub fn set_value(&self, name: &str, value: impl Into<FieldValue>) {
        self.shared.set_value(name, value.into());
    }

    /// The committed value for `name` in the active instance, as a
    /// defensive copy.
    #[must_use]
    pub fn get_value(&self, name: &str) -> Option<FieldValue> {
        let registry = self.shared.registry.lock().unwrap();
        registry
            .active_id()
            .and_then(|id| registry.record(id))
            .and_then(|record| record.store.get(name))
    }

    /// Snapshot of the active instance's committed values.
    #[must_use]
    pub fn state(&self) -> Snapshot {
        let registry = self.shared.registry.lock().unwrap();
        registry
            .active_id()
            .and_then(|id| registry.record(id))
            .map(|record| record.store.snapshot())
            .unwrap_or_default()
    }

    /// Full recompute of the active instance from committed values:
    /// visibility, enablement, required-ness, labels, gates.
    pub fn refresh(&self) {
        self.shared.refresh_active(RecomputeScope::full());
    }

    /// Cheap UI sync: like [`refresh`](Self::refresh) but carries label
    /// texts over from the previous plan.
    pub fn soft_refresh(&self) {
        self.shared
            .refresh_active(RecomputeScope::full() - RecomputeScope::LABELS);
    }

    /// Re-resolve a field's bound elements and recompute.
    ///
    /// For hosts that added or removed nodes for that field.
    pub fn refresh_field(&self, name: &str) {
        self.shared.rebind_field(name, true);
    }

    /// Re-resolve a field's bound elements; `refresh` re-reads and
    /// recomputes as well.
    pub fn rebind_field(&self, name: &str, refresh: bool) {
        self.shared.rebind_field(name, refresh);
    }

    /// Alias for [`refresh_field`](Self::refresh_field), for collaborators
    /// that push value changes not through bound control events.
    pub fn handle_external_update(&self, name: &str) {
        self.shared.rebind_field(name, true);
    }

    /// Evaluate the section gates for the active instance without
    /// rendering.
    #[must_use]
    pub fn gates(&self) -> GateReport {
        self.shared.gates()
    }

    /// Assemble the submission payload from the active instance.
    #[must_use]
    pub fn assemble_payload(&self) -> serde_json::Value {
        gate::assemble_payload(&self.state())
    }

    /// Inject the payload validator once its dependency has loaded.
    ///
    /// Cancels any outstanding bounded-retry wait and re-evaluates gates.
    pub fn provide_validator(&self, validator: Arc<dyn PayloadValidator>) {
        self.shared.provide_validator(validator);
    }

    /// Begin (or restart) the bounded-retry wait for the payload
    /// validator.
    ///
    /// `init` starts this automatically when the rule set has a terminal
    /// section and no validator is present; hosts that load the dependency
    /// even later can restart the wait themselves.
    pub fn await_validator(&self) {
        self.shared.poll_validator(0);
    }

    /// The last computed view plan for the active instance.
    #[must_use]
    pub fn last_plan(&self) -> Option<ViewPlan> {
        let registry = self.shared.registry.lock().unwrap();
        registry
            .active_id()
            .and_then(|id| registry.record(id))
            .and_then(|record| record.last_plan.clone())
    }

    /// The active instance's persisted snapshot, if one exists.
    #[must_use]
    pub fn persisted_state(&self) -> Option<AppState> {
        let registry = self.shared.registry.lock().unwrap();
        registry
            .active_id()
            .and_then(|id| registry.record(id))
            .and_then(|record| record.app_state.clone())
    }

    /// Record the tab the user is on (persisted with the next write).
    pub fn set_current_tab(&self, tab: usize) {
        self.shared.with_active_app_state(|state| state.current_tab = tab);
    }

    /// Record that the completion animation has played.
    pub fn mark_completion_animation_shown(&self) {
        self.shared
            .with_active_app_state(|state| state.completion_animation_shown = true);
    }

    /// Record the last remote calculation result.
    pub fn set_last_calculation_result(&self, result: serde_json::Value) {
        self.shared
            .with_active_app_state(|state| state.last_calculation_result = Some(result));
    }

    /// Re-read the persisted snapshot for the active instance and fill in
    /// fields that hold no live committed value.
    ///
    /// Live values always win: a field the user already answered is never
    /// overwritten by storage. For hosts that attach storage after `init`.
    pub fn hydrate_from_store(&self) {
        self.shared.hydrate_from_store();
    }

    /// Drop the active instance's persisted snapshot, in memory and in the
    /// store. Persistence stays off until the next `init`.
    pub fn clear_persisted(&self) {
        self.shared.clear_persisted();
    }

    /// Tear an instance down: listeners removed, timers cancelled, state
    /// cleared, record dropped.
    pub fn dispose(&self, id: impl Into<InstanceId>) {
        self.shared.dispose(&id.into());
    }
}

impl Shared {
    fn is_protected(&self, rule: &FieldRule) -> bool {
        rule.required || self.config.sticky_fields.contains(&rule.name)
    }

    fn make_listener(self: &Arc<Self>, id: &InstanceId, field: &str) -> ChangeListener {
        let weak = Arc::downgrade(self);
        let id = id.clone();
        let field = field.to_owned();
        Arc::new(move |kind: ChangeKind| {
            if let Some(shared) = weak.upgrade() {
                shared.on_control_event(&id, &field, kind);
            }
        })
    }

    fn init(self: &Arc<Self>, id: InstanceId, scope: Arc<dyn BindingScope>) -> InitOutcome {
        {
            let registry = self.registry.lock().unwrap();
            if let Some(live) = registry.live_id()
                && *live != id
            {
                let err = EngineError::Conflict {
                    live: live.clone(),
                    requested: id.clone(),
                };
                tracing::warn!(error = %err, "initialization refused");
                return InitOutcome::Refused;
            }
            if registry
                .record(&id)
                .is_some_and(|record| record.initialized)
            {
                tracing::debug!(instance = %id, "init is idempotent; already initialized");
                return InitOutcome::AlreadyInitialized;
            }
        }

        let app_state = persistence::load_app_state(self.store.as_ref(), &id).unwrap_or_default();
        {
            let mut registry = self.registry.lock().unwrap();
            let record = registry.get_or_create(&id);
            record.scope = Some(scope);
            record.app_state = Some(app_state);

            let rules = self.rules.clone();
            for rule in rules.fields() {
                if let Err(err) = self.hydrate_field(record, rule) {
                    tracing::error!(
                        instance = %id,
                        field = %rule.name,
                        error = %err,
                        "field hydration failed; remaining fields continue"
                    );
                }
            }
            record.initialized = true;
            registry.set_live(&id);
            registry.set_active(&id);
        }

        tracing::debug!(instance = %id, "instance initialized");
        self.recompute(&id, RecomputeScope::full());
        self.schedule_settle(&id);
        if self.rules.has_terminal_section() && self.validator.lock().unwrap().is_none() {
            self.poll_validator(0);
        }
        InitOutcome::Initialized
    }

    /// Bind one field and commit its initial read. Per-field failures stay
    /// per-field: a panicking host resolver is captured as a hydration
    /// error and the caller moves on.
    fn hydrate_field(
        self: &Arc<Self>,
        record: &mut InstanceRecord,
        rule: &FieldRule,
    ) -> Result<(), EngineError> {
        let scope = record
            .scope
            .clone()
            .ok_or_else(|| EngineError::UnknownInstance(record.id.clone()))?;
        record.unbind_field(&rule.name);

        let listener = self.make_listener(&record.id, &rule.name);
        let binding = catch_unwind(AssertUnwindSafe(|| {
            binder::bind(scope.as_ref(), rule, listener)
        }))
        .map_err(|payload| EngineError::Hydration {
            field: rule.name.clone(),
            message: effects::panic_message(payload),
        })?;

        record.store.register_elements(&rule.name, binding.elements);
        record
            .listeners
            .insert(rule.name.clone(), binding.disposers);

        let value = reader::resolve_value(rule, &record.store, record.app_state.as_ref());
        record
            .store
            .commit(&rule.name, value, self.is_protected(rule));
        Ok(())
    }

    fn on_control_event(self: &Arc<Self>, id: &InstanceId, field: &str, kind: ChangeKind) {
        let Some(rule) = self.rules.field(field) else {
            tracing::warn!(field, "change event for unknown field");
            return;
        };
        match binder::reaction(rule, kind) {
            BindReaction::Ignore => {}
            BindReaction::UpdatePending => {
                let mut registry = self.registry.lock().unwrap();
                let Some(record) = registry.record_mut(id) else {
                    return;
                };
                let controls = record.store.elements(field);
                if let Some(value) = reader::read_from_controls(rule, &controls) {
                    tracing::trace!(instance = %id, field, "pending value updated");
                    record.store.set_pending(field, value);
                }
            }
            BindReaction::CommitAndRecompute => self.commit_field(id, rule),
        }
    }

    /// The synchronous reactive sequence for one field:
    /// commit → effects → recompute → gates.
    fn commit_field(self: &Arc<Self>, id: &InstanceId, rule: &FieldRule) {
        let changed = {
            let mut registry = self.registry.lock().unwrap();
            let Some(record) = registry.record_mut(id) else {
                return;
            };
            if !record.initialized {
                return;
            }
            let value = reader::resolve_value(rule, &record.store, record.app_state.as_ref());
            let outcome = record
                .store
                .commit(&rule.name, value, self.is_protected(rule));
            if outcome == CommitOutcome::Changed {
                record.store.clear_pending(&rule.name);
                self.schedule_save_locked(record);
                true
            } else {
                false
            }
        };
        if changed {
            tracing::debug!(instance = %id, field = %rule.name, "value committed");
            effects::dispatch(&self.rules, &rule.name);
            self.recompute(id, RecomputeScope::full());
        }
    }

    fn set_value(self: &Arc<Self>, name: &str, value: FieldValue) {
        let Some(rule) = self.rules.field(name) else {
            tracing::warn!(field = name, "set_value for unknown field");
            return;
        };
        let committed = {
            let mut registry = self.registry.lock().unwrap();
            let Some(record) = registry.active_mut() else {
                tracing::warn!(field = name, "set_value with no active instance");
                return;
            };
            let outcome = record
                .store
                .commit(name, Some(value), self.is_protected(rule));
            if outcome == CommitOutcome::Changed {
                record.store.clear_pending(name);
                self.schedule_save_locked(record);
                Some(record.id.clone())
            } else {
                None
            }
        };
        if let Some(id) = committed {
            effects::dispatch(&self.rules, name);
            self.recompute(&id, RecomputeScope::full());
        }
    }

    fn read_field_value(&self, name: &str) -> Option<FieldValue> {
        let rule = self.rules.field(name)?;
        let registry = self.registry.lock().unwrap();
        let record = registry.active_id().and_then(|id| registry.record(id))?;
        reader::resolve_value(rule, &record.store, record.app_state.as_ref())
    }

    fn rebind_field(self: &Arc<Self>, name: &str, refresh: bool) {
        let Some(rule) = self.rules.field(name) else {
            tracing::warn!(field = name, "rebind for unknown field");
            return;
        };
        let bound = {
            let mut registry = self.registry.lock().unwrap();
            let Some(record) = registry.active_mut() else {
                tracing::warn!(field = name, "rebind with no active instance");
                return;
            };
            if !record.initialized {
                return;
            }
            let Some(scope) = record.scope.clone() else {
                return;
            };
            let id = record.id.clone();
            record.unbind_field(name);
            let listener = self.make_listener(&id, name);
            let binding = binder::bind(scope.as_ref(), rule, listener);
            record.store.register_elements(name, binding.elements);
            record.listeners.insert(name.to_owned(), binding.disposers);
            id
        };
        if refresh {
            self.commit_field(&bound, rule);
        }
    }

    fn refresh_active(self: &Arc<Self>, scope: RecomputeScope) {
        let id = self.registry.lock().unwrap().active_id().cloned();
        match id {
            Some(id) => self.recompute(&id, scope),
            None => tracing::warn!("refresh with no active instance"),
        }
    }

    /// Snapshot, derive, render, gate, in that order.
    fn recompute(self: &Arc<Self>, id: &InstanceId, scope: RecomputeScope) {
        let derived = {
            let mut registry = self.registry.lock().unwrap();
            let Some(record) = registry.record_mut(id) else {
                return;
            };
            if !record.initialized {
                return;
            }
            let snapshot = record.store.snapshot();
            let plan = compute_plan(&self.rules, &snapshot, scope, record.last_plan.as_ref());
            record.last_plan = Some(plan.clone());
            (snapshot, plan)
        };
        let (snapshot, plan) = derived;
        self.renderer.apply_view(id, &plan);

        let validator = self.validator.lock().unwrap().clone();
        let report = gate::evaluate(
            &self.rules,
            &snapshot,
            &plan,
            validator.as_deref(),
            self.config.gate_policy,
        );
        self.renderer.apply_gates(id, &report);
    }

    fn gates(&self) -> GateReport {
        let (snapshot, plan) = {
            let registry = self.registry.lock().unwrap();
            let Some(record) = registry.active_id().and_then(|id| registry.record(id)) else {
                return GateReport::default();
            };
            let snapshot = record.store.snapshot();
            let plan = record.last_plan.clone().unwrap_or_else(|| {
                compute_plan(&self.rules, &snapshot, RecomputeScope::full(), None)
            });
            (snapshot, plan)
        };
        let validator = self.validator.lock().unwrap().clone();
        gate::evaluate(
            &self.rules,
            &snapshot,
            &plan,
            validator.as_deref(),
            self.config.gate_policy,
        )
    }

    /// Schedule the debounced persisted write. Caller holds the registry
    /// lock; at most one timer is outstanding per instance.
    fn schedule_save_locked(self: &Arc<Self>, record: &mut InstanceRecord) {
        if record.app_state.is_none() {
            return;
        }
        if let Some(timer) = record.save_timer.take() {
            timer.cancel();
        }
        let weak = Arc::downgrade(self);
        let id = record.id.clone();
        record.save_timer = Some(self.scheduler.schedule(
            self.config.save_debounce,
            Box::new(move || {
                if let Some(shared) = weak.upgrade() {
                    shared.flush_save(&id);
                }
            }),
        ));
    }

    fn flush_save(self: &Arc<Self>, id: &InstanceId) {
        let payload = {
            let mut registry = self.registry.lock().unwrap();
            let Some(record) = registry.record_mut(id) else {
                return;
            };
            record.save_timer = None;
            let now = self.scheduler.now_millis();
            let Some(state) = record.app_state.as_mut() else {
                return;
            };
            state.merge_values(record.store.values(), now);
            state.clone()
        };
        match persistence::save_app_state(self.store.as_ref(), id, &payload) {
            Ok(()) => tracing::trace!(instance = %id, "snapshot persisted"),
            Err(err) => tracing::warn!(
                instance = %id,
                error = %err,
                "persisted write failed; in-memory state remains authoritative"
            ),
        }
    }

    /// One-tick settle after initialization: hosts may mutate the tree
    /// while the widget boots, so bindings are re-resolved once the event
    /// loop has drained.
    fn schedule_settle(self: &Arc<Self>, id: &InstanceId) {
        let weak = Arc::downgrade(self);
        let id = id.clone();
        let _ = self.scheduler.schedule(
            Duration::ZERO,
            Box::new(move || {
                if let Some(shared) = weak.upgrade() {
                    shared.settle(&id);
                }
            }),
        );
    }

    fn settle(self: &Arc<Self>, id: &InstanceId) {
        {
            let mut registry = self.registry.lock().unwrap();
            let Some(record) = registry.record_mut(id) else {
                return;
            };
            if !record.initialized {
                return;
            }
            let Some(scope) = record.scope.clone() else {
                return;
            };
            for rule in self.rules.fields() {
                record.unbind_field(&rule.name);
                let listener = self.make_listener(id, &rule.name);
                let binding = binder::bind(scope.as_ref(), rule, listener);
                record.store.register_elements(&rule.name, binding.elements);
                record
                    .listeners
                    .insert(rule.name.clone(), binding.disposers);
            }
        }
        tracing::trace!(instance = %id, "post-init settle");
        self.recompute(id, RecomputeScope::full());
    }

    fn provide_validator(self: &Arc<Self>, validator: Arc<dyn PayloadValidator>) {
        *self.validator.lock().unwrap() = Some(validator);
        if let Some(handle) = self.validator_wait.lock().unwrap().take() {
            handle.cancel();
        }
        tracing::debug!("payload validator provided");
        self.refresh_if_active();
    }

    fn refresh_if_active(self: &Arc<Self>) {
        let id = self.registry.lock().unwrap().active_id().cloned();
        if let Some(id) = id {
            self.recompute(&id, RecomputeScope::full() - RecomputeScope::LABELS);
        }
    }

    /// Bounded-retry wait for the validator dependency. After
    /// `max_attempts` the wait is abandoned; the configured gate policy
    /// then governs the terminal section alone.
    fn poll_validator(self: &Arc<Self>, attempt: u32) {
        if self.validator.lock().unwrap().is_some() {
            return;
        }
        let retry = self.config.validator_retry;
        if attempt >= retry.max_attempts {
            tracing::warn!(
                attempts = attempt,
                "payload validator never became available; continuing degraded"
            );
            *self.validator_wait.lock().unwrap() = None;
            return;
        }
        let weak = Arc::downgrade(self);
        let handle = self.scheduler.schedule(
            retry.delay,
            Box::new(move || {
                let Some(shared) = weak.upgrade() else {
                    return;
                };
                if shared.validator.lock().unwrap().is_some() {
                    tracing::debug!(attempt, "payload validator became available");
                    *shared.validator_wait.lock().unwrap() = None;
                    shared.refresh_if_active();
                } else {
                    shared.poll_validator(attempt + 1);
                }
            }),
        );
        *self.validator_wait.lock().unwrap() = Some(handle);
    }

    fn with_active_app_state(self: &Arc<Self>, mutate: impl FnOnce(&mut AppState)) {
        let mut registry = self.registry.lock().unwrap();
        let Some(record) = registry.active_mut() else {
            return;
        };
        if let Some(state) = record.app_state.as_mut() {
            mutate(state);
            self.schedule_save_locked(record);
        }
    }

    fn hydrate_from_store(self: &Arc<Self>) {
        let Some(id) = self.registry.lock().unwrap().active_id().cloned() else {
            tracing::warn!("hydrate with no active instance");
            return;
        };
        let loaded = persistence::load_app_state(self.store.as_ref(), &id);
        {
            let mut registry = self.registry.lock().unwrap();
            let Some(record) = registry.record_mut(&id) else {
                return;
            };
            if !record.initialized {
                return;
            }
            record.app_state = Some(loaded.unwrap_or_default());
            for rule in self.rules.fields() {
                if record.store.has(&rule.name) {
                    continue;
                }
                let value = reader::resolve_value(rule, &record.store, record.app_state.as_ref());
                record
                    .store
                    .commit(&rule.name, value, self.is_protected(rule));
            }
        }
        tracing::debug!(instance = %id, "rehydrated from persisted snapshot");
        self.recompute(&id, RecomputeScope::full());
    }

    fn clear_persisted(self: &Arc<Self>) {
        let id = {
            let mut registry = self.registry.lock().unwrap();
            let Some(record) = registry.active_mut() else {
                return;
            };
            record.app_state = None;
            if let Some(timer) = record.save_timer.take() {
                timer.cancel();
            }
            record.id.clone()
        };
        if let Err(err) = self.store.remove(id.as_str()) {
            tracing::warn!(instance = %id, error = %err, "persisted entry removal failed");
        }
    }

    fn dispose(self: &Arc<Self>, id: &InstanceId) {
        let record = self.registry.lock().unwrap().remove(id);
        match record {
            Some(mut record) => {
                // Outside the registry lock: disposers call back into the
                // host, which may itself call the engine.
                record.teardown();
                tracing::debug!(instance = %id, "instance disposed");
            }
            None => tracing::trace!(instance = %id, "dispose of unknown instance"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::ValidationReport;
    use crate::persistence::MemoryStore;
    use crate::scheduler::VirtualScheduler;
    use formwire_core::host::{Control, ControlReading, ListenerId};
    use formwire_core::rules::{CommitPolicy, ControlKind, ModeVariant, SectionRule};
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

    // --- Test host -------------------------------------------------------

    struct TestControl {
        reading: Mutex<ControlReading>,
        listeners: Mutex<Vec<(ListenerId, ChangeListener)>>,
        next_id: AtomicU64,
        connected: AtomicBool,
    }

    impl TestControl {
        fn new(reading: ControlReading) -> Arc<Self> {
            Arc::new(Self {
                reading: Mutex::new(reading),
                listeners: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(1),
                connected: AtomicBool::new(true),
            })
        }

        fn text(initial: &str) -> Arc<Self> {
            Self::new(ControlReading::text(initial))
        }

        fn radio(value: &str, checked: bool) -> Arc<Self> {
            Self::new(ControlReading::checkable(value, checked))
        }

        fn checkbox(value: &str, checked: bool) -> Arc<Self> {
            Self::new(ControlReading::checkable(value, checked))
        }

        fn emit(&self, kind: ChangeKind) {
            let listeners: Vec<ChangeListener> = self
                .listeners
                .lock()
                .unwrap()
                .iter()
                .map(|(_, l)| l.clone())
                .collect();
            for listener in listeners {
                listener(kind);
            }
        }

        fn type_text(&self, value: &str) {
            self.reading.lock().unwrap().value = value.to_owned();
            self.emit(ChangeKind::Input);
        }

        fn commit_text(&self, value: &str) {
            self.reading.lock().unwrap().value = value.to_owned();
            self.emit(ChangeKind::Commit);
        }

        fn set_checked(&self, checked: bool) {
            self.reading.lock().unwrap().checked = Some(checked);
            self.emit(ChangeKind::Commit);
        }

        fn slide(&self, value: &str) {
            self.reading.lock().unwrap().value = value.to_owned();
            self.emit(ChangeKind::Input);
        }

        fn confirm(&self) {
            self.emit(ChangeKind::Commit);
        }

        fn disconnect(&self) {
            self.connected.store(false, Ordering::SeqCst);
        }

        fn listener_count(&self) -> usize {
            self.listeners.lock().unwrap().len()
        }
    }

    impl Control for TestControl {
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

    #[derive(Default)]
    struct TestScope {
        controls: Mutex<HashMap<String, Vec<Arc<TestControl>>>>,
    }

    impl TestScope {
        fn install(&self, selector: &str, controls: Vec<Arc<TestControl>>) {
            self.controls
                .lock()
                .unwrap()
                .insert(selector.to_owned(), controls);
        }
    }

    impl BindingScope for TestScope {
        fn resolve(&self, selector: &str) -> Vec<Arc<dyn Control>> {
            self.controls
                .lock()
                .unwrap()
                .get(selector)
                .map(|cs| {
                    cs.iter()
                        .map(|c| c.clone() as Arc<dyn Control>)
                        .collect()
                })
                .unwrap_or_default()
        }
    }

    #[derive(Default)]
    struct CountingRenderer {
        views: AtomicUsize,
        gates: AtomicUsize,
        last_report: Mutex<Option<GateReport>>,
        last_plan: Mutex<Option<ViewPlan>>,
    }

    impl Renderer for CountingRenderer {
        fn apply_view(&self, _instance: &InstanceId, plan: &ViewPlan) {
            self.views.fetch_add(1, Ordering::SeqCst);
            *self.last_plan.lock().unwrap() = Some(plan.clone());
        }
        fn apply_gates(&self, _instance: &InstanceId, report: &GateReport) {
            self.gates.fetch_add(1, Ordering::SeqCst);
            *self.last_report.lock().unwrap() = Some(report.clone());
        }
    }

    struct AlwaysValid;
    impl PayloadValidator for AlwaysValid {
        fn validate(&self, _payload: &serde_json::Value) -> ValidationReport {
            ValidationReport {
                valid: true,
                errors: vec![],
            }
        }
    }

    // --- Fixture ---------------------------------------------------------

    fn rules() -> Arc<RuleSet> {
        Arc::new(
            RuleSet::builder()
                .field(
                    FieldRule::new("building_type", "bt", ControlKind::Radio).with_required(true),
                )
                .field(FieldRule::new("heated_area", "area", ControlKind::Number).with_required(true))
                .field(FieldRule::new("include_hot_water", "hw", ControlKind::Checkbox))
                .field(
                    FieldRule::new("hot_water_persons", "persons", ControlKind::Number)
                        .with_required(true)
                        .with_container("hot-water"),
                )
                .field(
                    FieldRule::new("comfort", "comfort", ControlKind::Slider)
                        .with_commit(CommitPolicy::Confirmed),
                )
                .field(FieldRule::new("floors[]", "floors", ControlKind::Checkbox))
                .show_container_when("hot-water", |s| s.flag("include_hot_water"))
                .section(SectionRule::new("building", ["building_type", "heated_area"]))
                .section(
                    SectionRule::new("hot_water", ["include_hot_water", "hot_water_persons"])
                        .with_variant(ModeVariant::new(
                            "awaiting_comfort",
                            ["hot_water_persons"],
                            |s: &Snapshot| s.has_pending("comfort"),
                        )),
                )
                .section(SectionRule::new("summary", ["building_type"]).with_terminal(true))
                .build(),
        )
    }

    struct Fixture {
        engine: FormEngine,
        scheduler: Arc<VirtualScheduler>,
        renderer: Arc<CountingRenderer>,
        store: Arc<MemoryStore>,
        scope: Arc<TestScope>,
    }

    fn fixture() -> Fixture {
        fixture_with(EngineConfig::default(), None)
    }

    fn fixture_with(
        config: EngineConfig,
        validator: Option<Arc<dyn PayloadValidator>>,
    ) -> Fixture {
        let scheduler = Arc::new(VirtualScheduler::new());
        let renderer = Arc::new(CountingRenderer::default());
        let store = Arc::new(MemoryStore::new());
        let engine = FormEngine::with_config(
            rules(),
            Collaborators {
                scheduler: scheduler.clone(),
                renderer: renderer.clone(),
                store: store.clone(),
                validator,
            },
            config,
        );
        Fixture {
            engine,
            scheduler,
            renderer,
            store,
            scope: Arc::new(TestScope::default()),
        }
    }

    // --- Tests -----------------------------------------------------------

    #[test]
    fn init_binds_and_hydrates_from_controls() {
        let f = fixture();
        let radio = TestControl::radio("single_house", true);
        f.scope.install("bt", vec![radio]);

        let outcome = f.engine.init("hp_1", f.scope.clone());
        assert_eq!(outcome, InitOutcome::Initialized);
        assert_eq!(
            f.engine.get_value("building_type"),
            Some(FieldValue::Text("single_house".into()))
        );
        // First recompute ran.
        assert!(f.renderer.views.load(Ordering::SeqCst) >= 1);
    }

    #[test]
    fn double_init_attaches_listeners_exactly_once() {
        let f = fixture();
        let area = TestControl::text("");
        f.scope.install("area", vec![area.clone()]);

        assert_eq!(f.engine.init("hp_1", f.scope.clone()), InitOutcome::Initialized);
        assert_eq!(
            f.engine.init("hp_1", f.scope.clone()),
            InitOutcome::AlreadyInitialized
        );
        assert_eq!(area.listener_count(), 1);

        // One edit triggers exactly one view application.
        let views_before = f.renderer.views.load(Ordering::SeqCst);
        area.commit_text("120");
        assert_eq!(f.renderer.views.load(Ordering::SeqCst), views_before + 1);
        assert_eq!(
            f.engine.get_value("heated_area"),
            Some(FieldValue::Text("120".into()))
        );
    }

    #[test]
    fn second_live_instance_is_refused() {
        let f = fixture();
        let other_scope = Arc::new(TestScope::default());
        let control = TestControl::text("");
        other_scope.install("area", vec![control.clone()]);

        assert_eq!(f.engine.init("hp_1", f.scope.clone()), InitOutcome::Initialized);
        assert_eq!(f.engine.init("hp_2", other_scope), InitOutcome::Refused);
        // The refused scope was never bound.
        assert_eq!(control.listener_count(), 0);
        // And no record state leaked into the refused id.
        f.engine.set_active("hp_2");
        assert!(f.engine.state().is_empty());
    }

    #[test]
    fn dispose_allows_a_new_live_instance() {
        let f = fixture();
        assert_eq!(f.engine.init("hp_1", f.scope.clone()), InitOutcome::Initialized);
        f.engine.dispose("hp_1");
        let scope2 = Arc::new(TestScope::default());
        assert_eq!(f.engine.init("hp_2", scope2), InitOutcome::Initialized);
    }

    #[test]
    fn checkbox_toggle_flips_container_visibility_in_same_recompute() {
        let f = fixture();
        let hw = TestControl::checkbox("1", false);
        f.scope.install("hw", vec![hw.clone()]);
        f.engine.init("hp_1", f.scope.clone());

        let plan = f.renderer.last_plan.lock().unwrap().clone().unwrap();
        assert!(!plan.container_visible("hot-water"));

        hw.set_checked(true);
        let plan = f.renderer.last_plan.lock().unwrap().clone().unwrap();
        assert!(plan.container_visible("hot-water"));
    }

    #[test]
    fn input_events_commit_only_for_text_like_controls() {
        let f = fixture();
        let area = TestControl::text("");
        f.scope.install("area", vec![area.clone()]);
        f.engine.init("hp_1", f.scope.clone());

        area.type_text("95");
        assert_eq!(
            f.engine.get_value("heated_area"),
            Some(FieldValue::Text("95".into()))
        );
    }

    #[test]
    fn deferred_commit_holds_until_confirmation() {
        let f = fixture();
        let slider = TestControl::text("3");
        f.scope.install("comfort", vec![slider.clone()]);
        f.engine.init("hp_1", f.scope.clone());
        // Hydration committed the initial read.
        assert_eq!(
            f.engine.get_value("comfort"),
            Some(FieldValue::Text("3".into()))
        );

        slider.slide("5");
        // Still the old committed value; the new one is pending.
        assert_eq!(
            f.engine.get_value("comfort"),
            Some(FieldValue::Text("3".into()))
        );
        assert!(f.engine.state().has_pending("comfort"));

        slider.confirm();
        assert_eq!(
            f.engine.get_value("comfort"),
            Some(FieldValue::Text("5".into()))
        );
        assert!(!f.engine.state().has_pending("comfort"));
    }

    #[test]
    fn pending_confirmation_narrows_the_section() {
        let f = fixture();
        let slider = TestControl::text("3");
        let hw = TestControl::checkbox("1", true);
        f.scope.install("comfort", vec![slider.clone()]);
        f.scope.install("hw", vec![hw]);
        f.engine.init("hp_1", f.scope.clone());

        // hot_water_persons is required, visible, and empty: blocked.
        assert!(!f.engine.gates().passable("hot_water"));

        // While the slider awaits confirmation the variant excludes it.
        slider.slide("4");
        f.engine.soft_refresh();
        assert!(f.engine.gates().passable("hot_water"));
    }

    #[test]
    fn protected_field_survives_transient_control_absence() {
        let f = fixture();
        let radio = TestControl::radio("single_house", true);
        f.scope.install("bt", vec![radio.clone()]);
        f.engine.init("hp_1", f.scope.clone());
        assert_eq!(
            f.engine.get_value("building_type"),
            Some(FieldValue::Text("single_house".into()))
        );

        // Host hides the control; a change event now reads unchecked.
        radio.disconnect();
        radio.emit(ChangeKind::Commit);
        assert_eq!(
            f.engine.get_value("building_type"),
            Some(FieldValue::Text("single_house".into()))
        );
    }

    #[test]
    fn set_value_round_trips_defensive_copies() {
        let f = fixture();
        f.engine.init("hp_1", f.scope.clone());

        let original = vec!["1".to_owned(), "2".to_owned()];
        f.engine.set_value("floors[]", original.clone());
        let read = f.engine.get_value("floors[]").unwrap();
        assert_eq!(read, FieldValue::List(vec!["1".into(), "2".into()]));

        // Mutating the caller's vec after the call changes nothing.
        let mut still_original = original;
        still_original.push("3".into());
        assert_eq!(
            f.engine.get_value("floors[]").unwrap(),
            FieldValue::List(vec!["1".into(), "2".into()])
        );
    }

    #[test]
    fn commits_debounce_into_one_persisted_write() {
        let f = fixture();
        let area = TestControl::text("");
        f.scope.install("area", vec![area.clone()]);
        f.engine.init("hp_1", f.scope.clone());

        area.commit_text("100");
        area.commit_text("110");
        area.commit_text("120");
        assert!(f.store.is_empty(), "write must be debounced off the hot path");

        f.scheduler.advance(Duration::from_millis(400));
        assert_eq!(f.store.len(), 1);
        let persisted = f.engine.persisted_state().unwrap();
        assert_eq!(
            persisted.form_data.get("heated_area"),
            Some(&FieldValue::Text("120".into()))
        );
        assert_eq!(persisted.timestamp, 400);
    }

    #[test]
    fn new_mutation_resets_the_save_timer() {
        let f = fixture();
        let area = TestControl::text("");
        f.scope.install("area", vec![area.clone()]);
        f.engine.init("hp_1", f.scope.clone());

        area.commit_text("100");
        f.scheduler.advance(Duration::from_millis(300));
        assert!(f.store.is_empty());
        area.commit_text("110");
        f.scheduler.advance(Duration::from_millis(300));
        assert!(f.store.is_empty(), "timer was reset by the second commit");
        f.scheduler.advance(Duration::from_millis(100));
        assert_eq!(f.store.len(), 1);
    }

    #[test]
    fn hydration_seeds_from_persisted_snapshot() {
        let f = fixture();
        let mut state = AppState::default();
        state
            .form_data
            .insert("heated_area".into(), FieldValue::Text("140".into()));
        persistence::save_app_state(f.store.as_ref(), &InstanceId::from("hp_1"), &state).unwrap();

        // The control renders empty; the persisted snapshot fills it.
        let area = TestControl::text("");
        f.scope.install("area", vec![area]);
        f.engine.init("hp_1", f.scope.clone());
        assert_eq!(
            f.engine.get_value("heated_area"),
            Some(FieldValue::Text("140".into()))
        );
    }

    #[test]
    fn rehydration_fills_gaps_without_touching_live_values() {
        let f = fixture();
        f.engine.init("hp_1", f.scope.clone());
        f.engine.set_value("heated_area", "95");

        // Storage arrives late, carrying both a stale duplicate and a
        // field the user has not answered yet.
        let mut state = AppState::default();
        state
            .form_data
            .insert("heated_area".into(), FieldValue::Text("140".into()));
        state
            .form_data
            .insert("building_type".into(), FieldValue::Text("duplex".into()));
        persistence::save_app_state(f.store.as_ref(), &InstanceId::from("hp_1"), &state).unwrap();

        f.engine.hydrate_from_store();
        assert_eq!(
            f.engine.get_value("heated_area"),
            Some(FieldValue::Text("95".into()))
        );
        assert_eq!(
            f.engine.get_value("building_type"),
            Some(FieldValue::Text("duplex".into()))
        );
    }

    #[test]
    fn live_values_beat_the_persisted_snapshot() {
        let f = fixture();
        let mut state = AppState::default();
        state
            .form_data
            .insert("heated_area".into(), FieldValue::Text("140".into()));
        persistence::save_app_state(f.store.as_ref(), &InstanceId::from("hp_1"), &state).unwrap();

        let area = TestControl::text("95");
        f.scope.install("area", vec![area]);
        f.engine.init("hp_1", f.scope.clone());
        assert_eq!(
            f.engine.get_value("heated_area"),
            Some(FieldValue::Text("95".into()))
        );
    }

    #[test]
    fn effects_run_between_commit_and_recompute() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let effect_order = order.clone();
        let rules = Arc::new(
            RuleSet::builder()
                .field(FieldRule::new("a", "a", ControlKind::Text))
                .effect("observe-a", ["a"], move || {
                    effect_order.lock().unwrap().push("effect");
                })
                .build(),
        );
        let scheduler = Arc::new(VirtualScheduler::new());

        struct OrderRenderer(Arc<Mutex<Vec<&'static str>>>);
        impl Renderer for OrderRenderer {
            fn apply_view(&self, _i: &InstanceId, _p: &ViewPlan) {
                self.0.lock().unwrap().push("view");
            }
            fn apply_gates(&self, _i: &InstanceId, _r: &GateReport) {
                self.0.lock().unwrap().push("gates");
            }
        }

        let engine = FormEngine::new(
            rules,
            Collaborators {
                scheduler,
                renderer: Arc::new(OrderRenderer(order.clone())),
                store: Arc::new(MemoryStore::new()),
                validator: None,
            },
        );
        let scope = Arc::new(TestScope::default());
        let control = TestControl::text("");
        scope.install("a", vec![control.clone()]);
        engine.init("hp_1", scope);
        order.lock().unwrap().clear();

        control.commit_text("x");
        assert_eq!(*order.lock().unwrap(), vec!["effect", "view", "gates"]);
    }

    #[test]
    fn validator_arrival_reevaluates_gates() {
        let config = EngineConfig {
            gate_policy: GatePolicy::FailClosed,
            ..EngineConfig::default()
        };
        let f = fixture_with(config, None);
        let radio = TestControl::radio("single_house", true);
        f.scope.install("bt", vec![radio]);
        f.engine.init("hp_1", f.scope.clone());

        // Fail-closed without a validator.
        assert!(!f.engine.gates().passable("summary"));

        f.engine.provide_validator(Arc::new(AlwaysValid));
        assert!(f.engine.gates().passable("summary"));
        let report = f.renderer.last_report.lock().unwrap().clone().unwrap();
        assert!(report.passable("summary"));
    }

    #[test]
    fn validator_poll_gives_up_after_max_attempts() {
        let config = EngineConfig {
            validator_retry: RetryPolicy {
                delay: Duration::from_millis(10),
                max_attempts: 3,
            },
            ..EngineConfig::default()
        };
        let f = fixture_with(config, None);
        f.engine.init("hp_1", f.scope.clone());

        // Drain every retry; the wait must terminate on its own.
        f.scheduler.advance(Duration::from_millis(1000));
        assert_eq!(f.scheduler.pending(), 0);
        // Default fail-open still applies afterwards.
        assert!(f.engine.gates().passable("summary"));
    }

    #[test]
    fn validator_poll_picks_up_late_injection() {
        let f = fixture();
        f.engine.init("hp_1", f.scope.clone());
        let gates_before = f.renderer.gates.load(Ordering::SeqCst);

        *f.engine.shared.validator.lock().unwrap() = Some(Arc::new(AlwaysValid));
        f.scheduler.advance(Duration::from_millis(300));
        // The poll noticed the validator and refreshed gates.
        assert!(f.renderer.gates.load(Ordering::SeqCst) > gates_before);
        assert!(f.engine.shared.validator_wait.lock().unwrap().is_none());
    }

    #[test]
    fn instance_isolation_across_records() {
        let f = fixture();
        f.engine.init("hp_1", f.scope.clone());
        f.engine.set_value("heated_area", "120");

        // A second record exists for state isolation, without going live.
        f.engine.set_active("hp_2");
        f.engine.set_value("heated_area", "80");

        assert_eq!(
            f.engine.get_value("heated_area"),
            Some(FieldValue::Text("80".into()))
        );
        f.engine.set_active("hp_1");
        assert_eq!(
            f.engine.get_value("heated_area"),
            Some(FieldValue::Text("120".into()))
        );
    }

    #[test]
    fn dispose_detaches_listeners_and_cancels_timers() {
        let f = fixture();
        let area = TestControl::text("");
        f.scope.install("area", vec![area.clone()]);
        f.engine.init("hp_1", f.scope.clone());
        assert_eq!(area.listener_count(), 1);

        area.commit_text("100"); // pending debounced write
        f.engine.dispose("hp_1");
        assert_eq!(area.listener_count(), 0);

        f.scheduler.advance(Duration::from_millis(1000));
        assert!(f.store.is_empty(), "cancelled write must not land");

        // Stale emissions after dispose are ignored.
        area.commit_text("999");
        assert!(f.engine.active_id().is_none());
    }

    #[test]
    fn rebind_field_picks_up_new_controls() {
        let f = fixture();
        let first = TestControl::text("10");
        f.scope.install("area", vec![first.clone()]);
        f.engine.init("hp_1", f.scope.clone());

        // Host re-renders: a fresh control replaces the old one.
        let second = TestControl::text("25");
        f.scope.install("area", vec![second.clone()]);
        f.engine.refresh_field("heated_area");

        assert_eq!(
            f.engine.get_value("heated_area"),
            Some(FieldValue::Text("25".into()))
        );
        // Old control released its listener on rebind.
        assert_eq!(first.listener_count(), 0);
        assert_eq!(second.listener_count(), 1);
    }

    #[test]
    fn soft_refresh_carries_labels() {
        let rules = Arc::new(
            RuleSet::builder()
                .field(FieldRule::new("a", "a", ControlKind::Text))
                .label("title", |s| format!("area: {}", s.text("a")))
                .build(),
        );
        let scheduler = Arc::new(VirtualScheduler::new());
        let renderer = Arc::new(CountingRenderer::default());
        let engine = FormEngine::new(
            rules,
            Collaborators {
                scheduler,
                renderer: renderer.clone(),
                store: Arc::new(MemoryStore::new()),
                validator: None,
            },
        );
        let scope = Arc::new(TestScope::default());
        engine.init("hp_1", scope);
        engine.set_value("a", "99");
        let labelled = renderer.last_plan.lock().unwrap().clone().unwrap();
        assert_eq!(labelled.labels.get("title").map(String::as_str), Some("area: 99"));

        // set_value recomputed labels; a later soft refresh keeps them.
        engine.soft_refresh();
        let soft = renderer.last_plan.lock().unwrap().clone().unwrap();
        assert_eq!(soft.labels.get("title").map(String::as_str), Some("area: 99"));
    }

    #[test]
    fn read_field_value_does_not_commit() {
        let f = fixture();
        let mut state = AppState::default();
        state
            .form_data
            .insert("heated_area".into(), FieldValue::Text("77".into()));
        persistence::save_app_state(f.store.as_ref(), &InstanceId::from("hp_1"), &state).unwrap();
        f.engine.init("hp_1", f.scope.clone());
        // Hydration committed the persisted value already; clear it to
        // observe the read-only path.
        f.engine.set_value("heated_area", "");
        // Guard refuses emptying a required field, so use the optional one.
        f.engine.set_value("floors[]", Vec::<String>::new());
        assert!(f.engine.get_value("floors[]").is_none());

        assert!(f.engine.read_field_value("floors[]").is_none());
        assert!(f.engine.get_value("floors[]").is_none());
    }

    #[test]
    fn payload_reflects_committed_values() {
        let f = fixture();
        f.engine.init("hp_1", f.scope.clone());
        f.engine.set_value("building_type", "single_house");
        f.engine.set_value("floors[]", vec!["1".to_owned(), "2".to_owned()]);

        let payload = f.engine.assemble_payload();
        assert_eq!(payload["building_type"], "single_house");
        assert_eq!(payload["floors[]"][0], "1");
    }

    #[test]
    fn app_state_helpers_schedule_a_write() {
        let f = fixture();
        f.engine.init("hp_1", f.scope.clone());
        f.engine.set_current_tab(2);
        f.engine.mark_completion_animation_shown();
        f.scheduler.advance(Duration::from_millis(400));

        let persisted =
            persistence::load_app_state(f.store.as_ref(), &InstanceId::from("hp_1")).unwrap();
        assert_eq!(persisted.current_tab, 2);
        assert!(persisted.completion_animation_shown);
    }

    #[test]
    fn clear_persisted_stops_the_bridge() {
        let f = fixture();
        let area = TestControl::text("");
        f.scope.install("area", vec![area.clone()]);
        f.engine.init("hp_1", f.scope.clone());
        area.commit_text("100");
        f.scheduler.advance(Duration::from_millis(400));
        assert_eq!(f.store.len(), 1);

        f.engine.clear_persisted();
        assert!(f.store.is_empty());
        area.commit_text("110");
        f.scheduler.advance(Duration::from_millis(1000));
        assert!(f.store.is_empty(), "no snapshot, no writes");
    }
}
