#![forbid(unsafe_code)]

//! Effects dispatcher with per-effect isolation.
//!
//! After a value-changing commit, every declared effect whose dependency
//! list names the changed field runs. Each callback executes inside a
//! panic boundary: one failing effect is caught and logged, and neither
//! the remaining effects nor the subsequent recompute are prevented.

use std::panic::{AssertUnwindSafe, catch_unwind};

use formwire_core::rules::{EffectRule, RuleSet};

/// Extract a readable message from a panic payload.
pub(crate) fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Run one effect inside its isolation boundary.
///
/// Returns `false` when the effect panicked.
pub fn run_isolated(effect: &EffectRule) -> bool {
    let run = effect.run.clone();
    match catch_unwind(AssertUnwindSafe(move || run())) {
        Ok(()) => true,
        Err(payload) => {
            tracing::error!(
                effect = %effect.name,
                message = %panic_message(payload),
                "effect panicked; continuing with remaining effects"
            );
            false
        }
    }
}

/// Run every effect depending on `changed`. Returns how many ran.
pub fn dispatch(rules: &RuleSet, changed: &str) -> usize {
    let mut ran = 0;
    for effect in rules.effects() {
        if effect.depends_on.iter().any(|dep| dep == changed) {
            tracing::trace!(effect = %effect.name, field = changed, "running effect");
            run_isolated(effect);
            ran += 1;
        }
    }
    ran
}
