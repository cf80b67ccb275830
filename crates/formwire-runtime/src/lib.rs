#![forbid(unsafe_code)]

//! Runtime: the reactive form rule engine.
//!
//! Pairs the per-instance value store with the recompute/gating pipeline:
//! committed answers in, visibility/enablement/required/label maps and
//! section pass-fail gates out, with effects and debounced persistence on
//! the side. Single-threaded and event-driven by design; deferred work
//! goes through an injected [`Scheduler`].

pub mod binder;
pub mod effects;
pub mod engine;
pub mod error;
pub mod gate;
pub mod persistence;
pub mod reader;
pub mod recompute;
pub mod registry;
pub mod scheduler;
pub mod store;

pub use binder::{BindReaction, FieldBinding, ListenerDisposer};
pub use engine::{Collaborators, EngineConfig, FormEngine, InitOutcome, RetryPolicy};
pub use error::EngineError;
pub use gate::{GatePolicy, GateReport, PayloadValidator, SectionGate, ValidationReport};
pub use persistence::{AppState, MemoryStore, PersistedStore, StoreError, StoreResult};
pub use recompute::{NullRenderer, RecomputeScope, Renderer, ViewPlan};
pub use registry::InstanceId;
pub use scheduler::{Scheduler, Task, TaskHandle, TimerScheduler, VirtualScheduler};
pub use store::{CommitOutcome, ValueStore};
