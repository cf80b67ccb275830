#![forbid(unsafe_code)]

//! Recording collaborators: renderer and validator doubles.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use formwire_runtime::gate::{GateReport, PayloadValidator, ValidationReport};
use formwire_runtime::recompute::{Renderer, ViewPlan};
use formwire_runtime::registry::InstanceId;

/// Renderer that records every applied plan and gate report.
#[derive(Default)]
pub struct RecordingRenderer {
    plans: Mutex<Vec<(InstanceId, ViewPlan)>>,
    reports: Mutex<Vec<(InstanceId, GateReport)>>,
}

impl RecordingRenderer {
    /// Create an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The most recently applied view plan.
    #[must_use]
    pub fn last_plan(&self) -> Option<ViewPlan> {
        self.plans
            .lock()
            .unwrap()
            .last()
            .map(|(_, plan)| plan.clone())
    }

    /// The most recently applied gate report.
    #[must_use]
    pub fn last_report(&self) -> Option<GateReport> {
        self.reports
            .lock()
            .unwrap()
            .last()
            .map(|(_, report)| report.clone())
    }

    /// How many view plans were applied.
    #[must_use]
    pub fn view_count(&self) -> usize {
        self.plans.lock().unwrap().len()
    }

    /// How many gate reports were applied.
    #[must_use]
    pub fn gate_count(&self) -> usize {
        self.reports.lock().unwrap().len()
    }

    /// Instance ids that ever received a view application.
    #[must_use]
    pub fn touched_instances(&self) -> Vec<InstanceId> {
        let mut ids: Vec<InstanceId> = self
            .plans
            .lock()
            .unwrap()
            .iter()
            .map(|(id, _)| id.clone())
            .collect();
        ids.dedup();
        ids
    }
}

impl Renderer for RecordingRenderer {
    fn apply_view(&self, instance: &InstanceId, plan: &ViewPlan) {
        self.plans
            .lock()
            .unwrap()
            .push((instance.clone(), plan.clone()));
    }

    fn apply_gates(&self, instance: &InstanceId, report: &GateReport) {
        self.reports
            .lock()
            .unwrap()
            .push((instance.clone(), report.clone()));
    }
}

/// Validator double with a switchable verdict.
pub struct StaticValidator {
    valid: AtomicBool,
    errors: Mutex<Vec<String>>,
}

impl StaticValidator {
    /// A validator that always accepts.
    #[must_use]
    pub fn accepting() -> Self {
        Self {
            valid: AtomicBool::new(true),
            errors: Mutex::new(Vec::new()),
        }
    }

    /// A validator that rejects with the given findings.
    #[must_use]
    pub fn rejecting(errors: Vec<String>) -> Self {
        Self {
            valid: AtomicBool::new(false),
            errors: Mutex::new(errors),
        }
    }

    /// Flip the verdict mid-test.
    pub fn set_valid(&self, valid: bool) {
        self.valid.store(valid, Ordering::SeqCst);
    }
}

impl PayloadValidator for StaticValidator {
    fn validate(&self, _payload: &serde_json::Value) -> ValidationReport {
        let valid = self.valid.load(Ordering::SeqCst);
        ValidationReport {
            valid,
            errors: if valid {
                Vec::new()
            } else {
                self.errors.lock().unwrap().clone()
            },
        }
    }
}
