#![forbid(unsafe_code)]

//! The declarative rule set.
//!
//! A [`RuleSet`] is the externally supplied description of a questionnaire:
//! which fields exist and how they commit, which sections group them, when
//! fields and containers are visible or enabled, what labels say, and which
//! side effects run on changes. The engine reads it, never writes it; one
//! `Arc<RuleSet>` is shared by reference across all widget instances.
//!
//! # Mode variants
//!
//! Sections narrow their field list through a closed set of named
//! [`ModeVariant`]s. Each variant pairs a pure predicate of the snapshot
//! with the fields it excludes; every variant whose predicate matches
//! contributes its exclusions. Given the same snapshot, the same field
//! list results; there is no ad hoc branching in the gate evaluator.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::snapshot::Snapshot;

/// Pure predicate of a snapshot.
pub type Predicate = Arc<dyn Fn(&Snapshot) -> bool + Send + Sync>;

/// Label text derived from a snapshot.
pub type LabelText = Arc<dyn Fn(&Snapshot) -> String + Send + Sync>;

/// Side-effect callback run after a dependency field changes.
pub type EffectFn = Arc<dyn Fn() + Send + Sync>;

/// Suffix marking a field name as array-valued.
pub const ARRAY_MARKER: &str = "[]";

/// Kind of control a field binds to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ControlKind {
    /// Single-line text entry.
    Text,
    /// Numeric entry.
    Number,
    /// Range control.
    Range,
    /// Hidden value carrier.
    Hidden,
    /// Single-choice dropdown.
    Select,
    /// Multi-choice dropdown; reads as a list.
    MultiSelect,
    /// Radio group; reads as the first checked value.
    Radio,
    /// Single checkbox; reads as the `yes`/`no` sentinel.
    Checkbox,
    /// Checkbox group; reads as the list of checked values.
    CheckboxGroup,
    /// Slider, typically gated behind an explicit confirm step.
    Slider,
}

impl ControlKind {
    /// Whether keystroke-granularity input events also commit for this kind.
    ///
    /// Settled `change` events commit for every kind; text-like kinds
    /// additionally commit on each input event.
    #[must_use]
    pub fn commits_on_input(self) -> bool {
        matches!(
            self,
            ControlKind::Text | ControlKind::Number | ControlKind::Range | ControlKind::Hidden
        )
    }

    /// Whether this kind reads as a list value.
    #[must_use]
    pub fn reads_list(self) -> bool {
        matches!(self, ControlKind::CheckboxGroup | ControlKind::MultiSelect)
    }
}

/// When a field's reads become committed values.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CommitPolicy {
    /// Commit on every settled change (and on input for text-like kinds).
    #[default]
    OnChange,
    /// Input events only update a pending side value; the confirming
    /// change event commits. Keeps downstream fields locked until the
    /// user confirms.
    Confirmed,
}

/// Declarative description of one field.
#[derive(Clone)]
pub struct FieldRule {
    /// Field name; a `[]` suffix marks it array-valued.
    pub name: String,
    /// Host selector the binder resolves inside the instance scope.
    pub selector: String,
    /// Control kind, which drives how values are read.
    pub control: ControlKind,
    /// Whether the field must hold a value for its section to pass.
    pub required: bool,
    /// Commit strategy.
    pub commit: CommitPolicy,
    /// Container this field lives in, for container-level visibility.
    pub container: Option<String>,
}

impl FieldRule {
    /// Create a field rule with defaults: optional, commit-on-change,
    /// no container.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        selector: impl Into<String>,
        control: ControlKind,
    ) -> Self {
        Self {
            name: name.into(),
            selector: selector.into(),
            control,
            required: false,
            commit: CommitPolicy::default(),
            container: None,
        }
    }

    /// Set the required flag (builder).
    #[must_use]
    pub fn with_required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    /// Set the commit policy (builder).
    #[must_use]
    pub fn with_commit(mut self, commit: CommitPolicy) -> Self {
        self.commit = commit;
        self
    }

    /// Set the owning container (builder).
    #[must_use]
    pub fn with_container(mut self, container: impl Into<String>) -> Self {
        self.container = Some(container.into());
        self
    }

    /// Whether the field name carries the array marker.
    #[must_use]
    pub fn is_array(&self) -> bool {
        self.name.ends_with(ARRAY_MARKER)
    }

    /// Whether reads of this field yield a list value.
    #[must_use]
    pub fn reads_list(&self) -> bool {
        self.control.reads_list() || self.is_array()
    }
}

impl fmt::Debug for FieldRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldRule")
            .field("name", &self.name)
            .field("selector", &self.selector)
            .field("control", &self.control)
            .field("required", &self.required)
            .field("commit", &self.commit)
            .field("container", &self.container)
            .finish()
    }
}

/// One named narrowing mode of a section.
#[derive(Clone)]
pub struct ModeVariant {
    /// Variant name, surfaced in gate reports.
    pub name: String,
    /// Fields removed from the section list while the variant applies.
    pub excludes: Vec<String>,
    /// Pure predicate selecting the variant from a snapshot.
    pub applies: Predicate,
}

impl ModeVariant {
    /// Create a mode variant.
    pub fn new(
        name: impl Into<String>,
        excludes: impl IntoIterator<Item = impl Into<String>>,
        applies: impl Fn(&Snapshot) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            excludes: excludes.into_iter().map(Into::into).collect(),
            applies: Arc::new(applies),
        }
    }
}

impl fmt::Debug for ModeVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModeVariant")
            .field("name", &self.name)
            .field("excludes", &self.excludes)
            .finish_non_exhaustive()
    }
}

/// Declarative description of one section (one logical step).
#[derive(Clone)]
pub struct SectionRule {
    /// Section id.
    pub id: String,
    /// Ordered field list the gate starts from.
    pub fields: Vec<String>,
    /// Whether this is the terminal section, which additionally consults
    /// the payload validator.
    pub terminal: bool,
    /// Closed set of narrowing variants.
    pub variants: Vec<ModeVariant>,
}

impl SectionRule {
    /// Create a section rule.
    pub fn new(
        id: impl Into<String>,
        fields: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            id: id.into(),
            fields: fields.into_iter().map(Into::into).collect(),
            terminal: false,
            variants: Vec::new(),
        }
    }

    /// Mark this section terminal (builder).
    #[must_use]
    pub fn with_terminal(mut self, terminal: bool) -> Self {
        self.terminal = terminal;
        self
    }

    /// Add a mode variant (builder).
    #[must_use]
    pub fn with_variant(mut self, variant: ModeVariant) -> Self {
        self.variants.push(variant);
        self
    }
}

impl fmt::Debug for SectionRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SectionRule")
            .field("id", &self.id)
            .field("fields", &self.fields)
            .field("terminal", &self.terminal)
            .field("variants", &self.variants)
            .finish()
    }
}

/// What a visibility rule targets.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VisibilityTarget {
    /// One field.
    Field(String),
    /// A container and every field inside it.
    Container(String),
}

/// Snapshot-driven visibility of a field or container.
#[derive(Clone)]
pub struct VisibilityRule {
    /// The field or container this rule governs.
    pub target: VisibilityTarget,
    /// Visible while the predicate holds.
    pub when: Predicate,
}

/// Snapshot-driven enablement of a field.
#[derive(Clone)]
pub struct EnablementRule {
    /// The governed field.
    pub field: String,
    /// Enabled while the predicate holds.
    pub when: Predicate,
}

/// Snapshot-driven label text.
#[derive(Clone)]
pub struct LabelRule {
    /// Label target id, addressed by the renderer.
    pub target: String,
    /// Text derivation.
    pub text: LabelText,
}

/// Declared side effect.
#[derive(Clone)]
pub struct EffectRule {
    /// Effect name, used in logs.
    pub name: String,
    /// Field names whose commits trigger this effect.
    pub depends_on: Vec<String>,
    /// The callback. Runs isolated: a panic is caught and logged.
    pub run: EffectFn,
}

/// The full, read-only rule set.
pub struct RuleSet {
    fields: Vec<FieldRule>,
    field_index: HashMap<String, usize>,
    sections: Vec<SectionRule>,
    visibility: Vec<VisibilityRule>,
    enablement: Vec<EnablementRule>,
    labels: Vec<LabelRule>,
    effects: Vec<EffectRule>,
}

impl RuleSet {
    /// Start building a rule set.
    #[must_use]
    pub fn builder() -> RuleSetBuilder {
        RuleSetBuilder::default()
    }

    /// Look up a field rule by name.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldRule> {
        self.field_index.get(name).map(|&i| &self.fields[i])
    }

    /// All field rules, in declaration order.
    #[must_use]
    pub fn fields(&self) -> &[FieldRule] {
        &self.fields
    }

    /// All section rules, in declaration order.
    #[must_use]
    pub fn sections(&self) -> &[SectionRule] {
        &self.sections
    }

    /// Whether any section is terminal.
    #[must_use]
    pub fn has_terminal_section(&self) -> bool {
        self.sections.iter().any(|s| s.terminal)
    }

    /// All visibility rules.
    #[must_use]
    pub fn visibility(&self) -> &[VisibilityRule] {
        &self.visibility
    }

    /// All enablement rules.
    #[must_use]
    pub fn enablement(&self) -> &[EnablementRule] {
        &self.enablement
    }

    /// All label rules.
    #[must_use]
    pub fn labels(&self) -> &[LabelRule] {
        &self.labels
    }

    /// All effect rules.
    #[must_use]
    pub fn effects(&self) -> &[EffectRule] {
        &self.effects
    }
}

impl fmt::Debug for RuleSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleSet")
            .field("fields", &self.fields.len())
            .field("sections", &self.sections.len())
            .field("visibility", &self.visibility.len())
            .field("enablement", &self.enablement.len())
            .field("labels", &self.labels.len())
            .field("effects", &self.effects.len())
            .finish()
    }
}

/// Builder for [`RuleSet`].
#[derive(Default)]
pub struct RuleSetBuilder {
    fields: Vec<FieldRule>,
    sections: Vec<SectionRule>,
    visibility: Vec<VisibilityRule>,
    enablement: Vec<EnablementRule>,
    labels: Vec<LabelRule>,
    effects: Vec<EffectRule>,
}

impl RuleSetBuilder {
    /// Declare a field.
    #[must_use]
    pub fn field(mut self, rule: FieldRule) -> Self {
        self.fields.push(rule);
        self
    }

    /// Declare a section.
    #[must_use]
    pub fn section(mut self, rule: SectionRule) -> Self {
        self.sections.push(rule);
        self
    }

    /// Make a field visible only while the predicate holds.
    #[must_use]
    pub fn show_field_when(
        mut self,
        field: impl Into<String>,
        when: impl Fn(&Snapshot) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.visibility.push(VisibilityRule {
            target: VisibilityTarget::Field(field.into()),
            when: Arc::new(when),
        });
        self
    }

    /// Make a container visible only while the predicate holds.
    #[must_use]
    pub fn show_container_when(
        mut self,
        container: impl Into<String>,
        when: impl Fn(&Snapshot) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.visibility.push(VisibilityRule {
            target: VisibilityTarget::Container(container.into()),
            when: Arc::new(when),
        });
        self
    }

    /// Enable a field only while the predicate holds.
    #[must_use]
    pub fn enable_when(
        mut self,
        field: impl Into<String>,
        when: impl Fn(&Snapshot) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.enablement.push(EnablementRule {
            field: field.into(),
            when: Arc::new(when),
        });
        self
    }

    /// Derive a label text from the snapshot.
    #[must_use]
    pub fn label(
        mut self,
        target: impl Into<String>,
        text: impl Fn(&Snapshot) -> String + Send + Sync + 'static,
    ) -> Self {
        self.labels.push(LabelRule {
            target: target.into(),
            text: Arc::new(text),
        });
        self
    }

    /// Declare a side effect keyed on its dependency fields.
    #[must_use]
    pub fn effect(
        mut self,
        name: impl Into<String>,
        depends_on: impl IntoIterator<Item = impl Into<String>>,
        run: impl Fn() + Send + Sync + 'static,
    ) -> Self {
        self.effects.push(EffectRule {
            name: name.into(),
            depends_on: depends_on.into_iter().map(Into::into).collect(),
            run: Arc::new(run),
        });
        self
    }

    /// Finish the rule set. Later duplicate field names shadow earlier ones
    /// in lookups but keep their declaration slot.
    #[must_use]
    pub fn build(self) -> RuleSet {
        let field_index = self
            .fields
            .iter()
            .enumerate()
            .map(|(i, f)| (f.name.clone(), i))
            .collect();
        RuleSet {
            fields: self.fields,
            field_index,
            sections: self.sections,
            visibility: self.visibility,
            enablement: self.enablement,
            labels: self.labels,
            effects: self.effects,
        }
    }
}
