#![forbid(unsafe_code)]

//! Core: field values, the declarative rule set, the host abstraction, and snapshots.

pub mod host;
pub mod rules;
pub mod snapshot;
pub mod value;

pub use host::{BindingScope, ChangeKind, ChangeListener, Control, ControlReading, ListenerId};
pub use rules::{
    CommitPolicy, ControlKind, EffectRule, EnablementRule, FieldRule, LabelRule, ModeVariant,
    RuleSet, RuleSetBuilder, SectionRule, VisibilityRule, VisibilityTarget,
};
pub use snapshot::Snapshot;
pub use value::FieldValue;
