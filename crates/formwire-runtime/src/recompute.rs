#![forbid(unsafe_code)]

//! Recompute pipeline: snapshot in, view plan out.
//!
//! Each pass derives, in order: field visibility, container visibility,
//! enablement, effective required-ness, and label texts, every map a pure
//! function of one [`Snapshot`]. Visibility comes before required-ness so
//! a hidden required field can never block progression. The finished
//! [`ViewPlan`] goes to the host's [`Renderer`]; applying it to a UI is
//! out of scope here.
//!
//! A [`RecomputeScope`] mask narrows a pass for cheap UI syncs; maps left
//! out of the scope are carried over from the previous plan.

use std::collections::HashMap;

use bitflags::bitflags;
use formwire_core::rules::{FieldRule, RuleSet, VisibilityTarget};
use formwire_core::snapshot::Snapshot;

use crate::gate::GateReport;
use crate::registry::InstanceId;

bitflags! {
    /// Which derived maps a recompute pass refreshes.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct RecomputeScope: u8 {
        /// Field and container visibility.
        const VISIBILITY = 1 << 0;
        /// Field enablement.
        const ENABLEMENT = 1 << 1;
        /// Effective required-ness.
        const REQUIRED = 1 << 2;
        /// Label texts.
        const LABELS = 1 << 3;
    }
}

impl RecomputeScope {
    /// The full pass.
    #[must_use]
    pub fn full() -> Self {
        Self::all()
    }
}

/// Derived maps handed to the renderer.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ViewPlan {
    /// Per-field visibility. Fields without a rule default to visible.
    pub field_visibility: HashMap<String, bool>,
    /// Per-container visibility. Containers without a rule default to visible.
    pub container_visibility: HashMap<String, bool>,
    /// Per-field enablement.
    pub enabled: HashMap<String, bool>,
    /// Effective required-ness: declared required and currently visible.
    pub required: HashMap<String, bool>,
    /// Label texts by target id.
    pub labels: HashMap<String, String>,
}

impl ViewPlan {
    /// Whether a field is visible (absent means visible).
    #[must_use]
    pub fn field_visible(&self, name: &str) -> bool {
        self.field_visibility.get(name).copied().unwrap_or(true)
    }

    /// Whether a container is visible (absent means visible).
    #[must_use]
    pub fn container_visible(&self, id: &str) -> bool {
        self.container_visibility.get(id).copied().unwrap_or(true)
    }

    /// Whether a field is effectively visible: itself visible and not
    /// inside a hidden container.
    #[must_use]
    pub fn effectively_visible(&self, rule: &FieldRule) -> bool {
        self.field_visible(&rule.name)
            && rule
                .container
                .as_deref()
                .map(|c| self.container_visible(c))
                .unwrap_or(true)
    }
}

/// Applies computed maps and gate flags to the host UI.
pub trait Renderer: Send + Sync {
    /// Apply a freshly computed view plan for one instance.
    fn apply_view(&self, instance: &InstanceId, plan: &ViewPlan);

    /// Apply freshly evaluated section gates for one instance.
    fn apply_gates(&self, instance: &InstanceId, report: &GateReport);
}

/// Renderer that applies nothing. For headless hosts and tests.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullRenderer;

impl Renderer for NullRenderer {
    fn apply_view(&self, _instance: &InstanceId, _plan: &ViewPlan) {}
    fn apply_gates(&self, _instance: &InstanceId, _report: &GateReport) {}
}

/// Compute a view plan from a snapshot.
///
/// `previous` supplies the carried-over maps when `scope` is narrower than
/// [`RecomputeScope::full`]; with no previous plan, out-of-scope maps fall
/// back to defaults.
#[must_use]
pub fn compute_plan(
    rules: &RuleSet,
    snapshot: &Snapshot,
    scope: RecomputeScope,
    previous: Option<&ViewPlan>,
) -> ViewPlan {
    let mut plan = ViewPlan::default();

    if scope.contains(RecomputeScope::VISIBILITY) {
        for field in rules.fields() {
            plan.field_visibility.insert(field.name.clone(), true);
            if let Some(container) = &field.container {
                plan.container_visibility.insert(container.clone(), true);
            }
        }
        for rule in rules.visibility() {
            let visible = (rule.when)(snapshot);
            match &rule.target {
                VisibilityTarget::Field(name) => {
                    let entry = plan.field_visibility.entry(name.clone()).or_insert(true);
                    *entry = *entry && visible;
                }
                VisibilityTarget::Container(id) => {
                    let entry = plan.container_visibility.entry(id.clone()).or_insert(true);
                    *entry = *entry && visible;
                }
            }
        }
    } else if let Some(prev) = previous {
        plan.field_visibility = prev.field_visibility.clone();
        plan.container_visibility = prev.container_visibility.clone();
    }

    if scope.contains(RecomputeScope::ENABLEMENT) {
        for field in rules.fields() {
            plan.enabled.insert(field.name.clone(), true);
        }
        for rule in rules.enablement() {
            let enabled = (rule.when)(snapshot);
            let entry = plan.enabled.entry(rule.field.clone()).or_insert(true);
            *entry = *entry && enabled;
        }
    } else if let Some(prev) = previous {
        plan.enabled = prev.enabled.clone();
    }

    if scope.contains(RecomputeScope::REQUIRED) {
        // Depends on the visibility maps computed (or carried) above.
        for field in rules.fields() {
            let effective = field.required && plan.effectively_visible(field);
            plan.required.insert(field.name.clone(), effective);
        }
    } else if let Some(prev) = previous {
        plan.required = prev.required.clone();
    }

    if scope.contains(RecomputeScope::LABELS) {
        for rule in rules.labels() {
            plan.labels
                .insert(rule.target.clone(), (rule.text)(snapshot));
        }
    } else if let Some(prev) = previous {
        plan.labels = prev.labels.clone();
    }

    plan
}
