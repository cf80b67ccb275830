#![forbid(unsafe_code)]

//! Section gate evaluator: may the user proceed past each step?
//!
//! Each section starts from its declared field list, narrowed by the mode
//! variants whose predicates match the snapshot. A field is *satisfied*
//! iff it is not required, or currently hidden, or holds a non-empty
//! normalized value. A section is *passable* iff every field in its
//! narrowed list is satisfied.
//!
//! # Terminal section and the validator
//!
//! The terminal section additionally consults an external payload
//! validator on the assembled payload. The validator may load late; what
//! an absent validator means is a [`GatePolicy`] choice:
//!
//! | Policy | Validator absent | Trade-off |
//! |--------|------------------|-----------|
//! | `FailOpen` (default) | Section passable | A window where unvalidated payloads could be submitted |
//! | `FailClosed` | Section blocked | Users stall behind a slow-loading dependency |
//!
//! Normal field validation always fails closed; only the optional
//! validator dependency carries this asymmetry.

use serde_json::{Map, Value};

use formwire_core::rules::{RuleSet, SectionRule};
use formwire_core::snapshot::Snapshot;
use formwire_core::value::FieldValue;

use crate::recompute::ViewPlan;

/// How an absent payload validator affects the terminal gate.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum GatePolicy {
    /// Treat the terminal section as passable while the validator is
    /// unavailable.
    #[default]
    FailOpen,
    /// Block the terminal section while the validator is unavailable.
    FailClosed,
}

/// Validator verdict on an assembled payload.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ValidationReport {
    /// Whether the payload passed.
    pub valid: bool,
    /// Human-readable findings.
    pub errors: Vec<String>,
}

/// External payload validator, supplied by a collaborator.
pub trait PayloadValidator: Send + Sync {
    /// Validate a fully assembled payload.
    fn validate(&self, payload: &Value) -> ValidationReport;
}

/// Pass/fail decision for one section.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SectionGate {
    /// Section id.
    pub section: String,
    /// Whether the user may proceed.
    pub passable: bool,
    /// Names of the mode variants that narrowed the field list.
    pub applied_variants: Vec<String>,
    /// Fields that kept the section from passing.
    pub blocking: Vec<String>,
    /// Validator findings, for the terminal section when one ran.
    pub validation_errors: Vec<String>,
}

/// Gate decisions for every section, in declaration order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GateReport {
    /// Per-section gates.
    pub sections: Vec<SectionGate>,
}

impl GateReport {
    /// The gate for a section id.
    #[must_use]
    pub fn section(&self, id: &str) -> Option<&SectionGate> {
        self.sections.iter().find(|g| g.section == id)
    }

    /// Whether a section is passable; unknown sections are not.
    #[must_use]
    pub fn passable(&self, id: &str) -> bool {
        self.section(id).is_some_and(|g| g.passable)
    }
}

/// Assemble the submission payload from a snapshot.
///
/// Text becomes a JSON string, lists arrays, flags booleans. This is the
/// object handed to the payload validator and the remote calculation
/// client.
#[must_use]
pub fn assemble_payload(snapshot: &Snapshot) -> Value {
    let mut map = Map::new();
    for (name, value) in snapshot.values() {
        let json = match value {
            FieldValue::Text(s) => Value::String(s.clone()),
            FieldValue::List(items) => {
                Value::Array(items.iter().cloned().map(Value::String).collect())
            }
            FieldValue::Flag(b) => Value::Bool(*b),
        };
        map.insert(name.clone(), json);
    }
    Value::Object(map)
}

/// Narrow a section's field list by its matching mode variants.
///
/// Every variant whose predicate matches contributes its exclusions.
/// Pure in the snapshot: the same snapshot always yields the same list.
#[must_use]
pub fn narrowed_fields<'a>(
    section: &'a SectionRule,
    snapshot: &Snapshot,
) -> (Vec<&'a str>, Vec<String>) {
    let mut applied = Vec::new();
    let mut excluded: Vec<&str> = Vec::new();
    for variant in &section.variants {
        if (variant.applies)(snapshot) {
            applied.push(variant.name.clone());
            excluded.extend(variant.excludes.iter().map(String::as_str));
        }
    }
    let fields = section
        .fields
        .iter()
        .map(String::as_str)
        .filter(|name| !excluded.contains(name))
        .collect();
    (fields, applied)
}

/// Whether one field is satisfied under a snapshot and plan.
#[must_use]
pub fn field_satisfied(rules: &RuleSet, name: &str, snapshot: &Snapshot, plan: &ViewPlan) -> bool {
    let Some(rule) = rules.field(name) else {
        // A section listing an undeclared field cannot be satisfied by it;
        // treat it as absent rather than blocking forever.
        tracing::warn!(field = name, "section references undeclared field");
        return true;
    };
    if !rule.required {
        return true;
    }
    if !plan.effectively_visible(rule) {
        return true;
    }
    snapshot.has(name)
}

/// Evaluate every section gate.
pub fn evaluate(
    rules: &RuleSet,
    snapshot: &Snapshot,
    plan: &ViewPlan,
    validator: Option<&dyn PayloadValidator>,
    policy: GatePolicy,
) -> GateReport {
    let mut report = GateReport::default();
    for section in rules.sections() {
        let (fields, applied_variants) = narrowed_fields(section, snapshot);
        let blocking: Vec<String> = fields
            .iter()
            .filter(|name| !field_satisfied(rules, name, snapshot, plan))
            .map(|name| (*name).to_owned())
            .collect();
        let mut passable = blocking.is_empty();
        let mut validation_errors = Vec::new();

        if section.terminal && passable {
            match validator {
                Some(v) => {
                    let verdict = v.validate(&assemble_payload(snapshot));
                    if !verdict.valid {
                        passable = false;
                        validation_errors = verdict.errors;
                    }
                }
                None => match policy {
                    GatePolicy::FailOpen => {
                        tracing::debug!(
                            section = %section.id,
                            "payload validator unavailable, gate fails open"
                        );
                    }
                    GatePolicy::FailClosed => {
                        tracing::debug!(
                            section = %section.id,
                            "payload validator unavailable, gate fails closed"
                        );
                        passable = false;
                    }
                },
            }
        }

        report.sections.push(SectionGate {
            section: section.id.clone(),
            passable,
            applied_variants,
            blocking,
            validation_errors,
        });
    }
    report
}
