#![forbid(unsafe_code)]

//! Deterministic test harness for the form rule engine.
//!
//! Provides an in-memory host (controls, binding scope, renderer,
//! validator) plus a ready-made questionnaire fixture, so engine behavior
//! can be driven and observed without any real UI. Paired with
//! [`VirtualScheduler`](formwire_runtime::VirtualScheduler), every
//! scenario is fully deterministic: time moves only when a test advances
//! it.

pub mod fixture;
pub mod host;
pub mod observe;

pub use fixture::{Harness, heat_load_rules};
pub use host::{MockControl, MockScope};
pub use observe::{RecordingRenderer, StaticValidator};
