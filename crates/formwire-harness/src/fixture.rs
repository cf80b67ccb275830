#![forbid(unsafe_code)]

//! Ready-made questionnaire fixture and engine bundle.
//!
//! [`heat_load_rules`] is a compact heat-load questionnaire exercising
//! every rule-set feature: required fields, array-valued checkbox groups,
//! container visibility, enablement, snapshot-driven labels, a
//! deferred-commit slider, mode-variant narrowing, and a terminal section.
//! [`Harness`] bundles an engine over those rules with the deterministic
//! collaborators.

use std::sync::Arc;

use formwire_core::rules::{
    CommitPolicy, ControlKind, FieldRule, ModeVariant, RuleSet, SectionRule,
};
use formwire_core::snapshot::Snapshot;
use formwire_runtime::engine::{Collaborators, EngineConfig, FormEngine};
use formwire_runtime::persistence::MemoryStore;
use formwire_runtime::scheduler::VirtualScheduler;

use crate::host::MockScope;
use crate::observe::RecordingRenderer;

/// Selectors used by [`heat_load_rules`], matching field names.
pub mod selectors {
    /// Radio group for the building type.
    pub const BUILDING_TYPE: &str = "[name=building_type]";
    /// Numeric input for the heated area.
    pub const HEATED_AREA: &str = "[name=heated_area]";
    /// Construction-year dropdown.
    pub const CONSTRUCTION_YEAR: &str = "[name=construction_year]";
    /// Checkbox group for heated floors.
    pub const FLOORS: &str = "[name='floors[]']";
    /// Hot-water opt-in checkbox.
    pub const INCLUDE_HOT_WATER: &str = "[name=include_hot_water]";
    /// Number of persons using hot water.
    pub const HOT_WATER_PERSONS: &str = "[name=hot_water_persons]";
    /// Target hot-water temperature range control.
    pub const HOT_WATER_TEMP: &str = "[name=hot_water_temp]";
    /// Comfort slider behind an explicit confirm step.
    pub const COMFORT_LEVEL: &str = "[name=comfort_level]";
}

/// The heat-load questionnaire rule set.
#[must_use]
pub fn heat_load_rules() -> Arc<RuleSet> {
    Arc::new(
        RuleSet::builder()
            .field(
                FieldRule::new("building_type", selectors::BUILDING_TYPE, ControlKind::Radio)
                    .with_required(true),
            )
            .field(
                FieldRule::new("heated_area", selectors::HEATED_AREA, ControlKind::Number)
                    .with_required(true),
            )
            .field(FieldRule::new(
                "construction_year",
                selectors::CONSTRUCTION_YEAR,
                ControlKind::Select,
            ))
            .field(
                FieldRule::new("floors[]", selectors::FLOORS, ControlKind::Checkbox)
                    .with_required(true),
            )
            .field(FieldRule::new(
                "include_hot_water",
                selectors::INCLUDE_HOT_WATER,
                ControlKind::Checkbox,
            ))
            .field(
                FieldRule::new(
                    "hot_water_persons",
                    selectors::HOT_WATER_PERSONS,
                    ControlKind::Number,
                )
                .with_required(true)
                .with_container("hot-water"),
            )
            .field(
                FieldRule::new(
                    "hot_water_temp",
                    selectors::HOT_WATER_TEMP,
                    ControlKind::Range,
                )
                .with_container("hot-water"),
            )
            .field(
                FieldRule::new("comfort_level", selectors::COMFORT_LEVEL, ControlKind::Slider)
                    .with_commit(CommitPolicy::Confirmed),
            )
            .show_field_when("construction_year", |s| s.has("building_type"))
            .show_container_when("hot-water", |s| s.flag("include_hot_water"))
            .enable_when("hot_water_persons", |s| s.flag("include_hot_water"))
            .label("summary-title", |s| {
                if s.flag("include_hot_water") {
                    "Heating and hot water demand".to_owned()
                } else {
                    "Heating demand".to_owned()
                }
            })
            .label("area-unit", |s| {
                format!("{} m²", s.text("heated_area"))
            })
            .section(
                SectionRule::new(
                    "building",
                    ["building_type", "heated_area", "construction_year", "floors[]"],
                )
                .with_variant(ModeVariant::new(
                    "simplified_apartment",
                    ["floors[]", "construction_year"],
                    |s: &Snapshot| s.text("building_type") == "apartment",
                )),
            )
            .section(SectionRule::new(
                "hot_water",
                ["include_hot_water", "hot_water_persons", "hot_water_temp"],
            ))
            .section(
                SectionRule::new("comfort", ["comfort_level"]).with_variant(ModeVariant::new(
                    "awaiting_confirmation",
                    ["comfort_level"],
                    |s: &Snapshot| s.has_pending("comfort_level"),
                )),
            )
            .section(
                SectionRule::new("summary", ["building_type", "heated_area"])
                    .with_terminal(true),
            )
            .build(),
    )
}

/// One engine over the fixture rules, wired to deterministic doubles.
pub struct Harness {
    /// The engine under test.
    pub engine: FormEngine,
    /// Manual-time scheduler.
    pub scheduler: Arc<VirtualScheduler>,
    /// Recording renderer.
    pub renderer: Arc<RecordingRenderer>,
    /// In-memory persisted store.
    pub store: Arc<MemoryStore>,
    /// The primary widget root.
    pub scope: Arc<MockScope>,
}

impl Harness {
    /// Harness over [`heat_load_rules`] with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_rules(heat_load_rules(), EngineConfig::default())
    }

    /// Harness over [`heat_load_rules`] with a custom configuration.
    #[must_use]
    pub fn with_config(config: EngineConfig) -> Self {
        Self::with_rules(heat_load_rules(), config)
    }

    /// Harness over arbitrary rules.
    #[must_use]
    pub fn with_rules(rules: Arc<RuleSet>, config: EngineConfig) -> Self {
        let scheduler = Arc::new(VirtualScheduler::new());
        let renderer = Arc::new(RecordingRenderer::new());
        let store = Arc::new(MemoryStore::new());
        let engine = FormEngine::with_config(
            rules,
            Collaborators {
                scheduler: scheduler.clone(),
                renderer: renderer.clone(),
                store: store.clone(),
                validator: None,
            },
            config,
        );
        Self {
            engine,
            scheduler,
            renderer,
            store,
            scope: MockScope::new(),
        }
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}
