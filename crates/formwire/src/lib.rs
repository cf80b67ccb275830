#![forbid(unsafe_code)]

//! Formwire public facade crate.
//!
//! This crate provides the stable, ergonomic surface area for hosts. It
//! re-exports common types from the internal crates and offers a
//! lightweight prelude for day-to-day usage.

use std::fmt;

// --- Core re-exports -------------------------------------------------------

pub use formwire_core::host::{
    BindingScope, ChangeKind, ChangeListener, Control, ControlReading, ListenerId,
};
pub use formwire_core::rules::{
    CommitPolicy, ControlKind, EffectRule, FieldRule, ModeVariant, RuleSet, RuleSetBuilder,
    SectionRule, VisibilityTarget,
};
pub use formwire_core::snapshot::Snapshot;
pub use formwire_core::value::FieldValue;

// --- Runtime re-exports ----------------------------------------------------

pub use formwire_runtime::engine::{
    Collaborators, EngineConfig, FormEngine, InitOutcome, RetryPolicy,
};
pub use formwire_runtime::gate::{
    GatePolicy, GateReport, PayloadValidator, SectionGate, ValidationReport,
};
pub use formwire_runtime::persistence::{AppState, MemoryStore, PersistedStore};
pub use formwire_runtime::recompute::{NullRenderer, RecomputeScope, Renderer, ViewPlan};
pub use formwire_runtime::registry::InstanceId;
pub use formwire_runtime::scheduler::{Scheduler, TaskHandle, TimerScheduler, VirtualScheduler};

// --- Harness re-exports ----------------------------------------------------

#[cfg(feature = "harness")]
pub use formwire_harness::{Harness, MockControl, MockScope, RecordingRenderer, StaticValidator};

// --- Errors ---------------------------------------------------------------

/// Top-level error type for formwire hosts.
#[derive(Debug)]
pub enum Error {
    /// Engine-side failure.
    Engine(formwire_runtime::EngineError),
    /// Persisted-store failure.
    Store(formwire_runtime::StoreError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Engine(err) => write!(f, "{err}"),
            Self::Store(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Engine(err) => Some(err),
            Self::Store(err) => Some(err),
        }
    }
}

impl From<formwire_runtime::EngineError> for Error {
    fn from(err: formwire_runtime::EngineError) -> Self {
        Self::Engine(err)
    }
}

impl From<formwire_runtime::StoreError> for Error {
    fn from(err: formwire_runtime::StoreError) -> Self {
        Self::Store(err)
    }
}

/// Commonly used types, importable in one line.
pub mod prelude {
    pub use crate::{
        BindingScope, Collaborators, CommitPolicy, Control, ControlKind, EngineConfig,
        FieldRule, FieldValue, FormEngine, GatePolicy, InitOutcome, InstanceId, ModeVariant,
        PayloadValidator, PersistedStore, Renderer, RuleSet, SectionRule, Snapshot,
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_wraps_engine_and_store_variants() {
        let engine_err: Error =
            formwire_runtime::EngineError::UnknownField("heated_area".into()).into();
        assert!(engine_err.to_string().contains("heated_area"));

        let store_err: Error =
            formwire_runtime::StoreError::Unavailable("session storage off".into()).into();
        assert!(store_err.to_string().contains("session storage off"));
    }
}
