#![forbid(unsafe_code)]

//! Value reader: source-priority resolution of a field's current value.
//!
//! Hosts show, hide, and sometimes destroy controls while the user works,
//! so a synchronous read must never confuse "the control is gone right
//! now" with "the user cleared the value". Resolution order:
//!
//! 1. live bound controls, read per control kind;
//! 2. for `required` fields only, the last committed value;
//! 3. the persisted snapshot's `form_data`.
//!
//! Only non-empty normalized values resolve; an exhausted chain yields
//! `None` and the commit guard decides what that means for the store.

use std::sync::Arc;

use formwire_core::host::Control;
use formwire_core::rules::{ControlKind, FieldRule};
use formwire_core::value::{FLAG_NO, FLAG_YES, FieldValue};

use crate::persistence::AppState;
use crate::store::ValueStore;

/// Read a field's value from its currently bound controls.
///
/// Returns `None` when no control yields a non-empty normalized value.
#[must_use]
pub fn read_from_controls(rule: &FieldRule, controls: &[Arc<dyn Control>]) -> Option<FieldValue> {
    if controls.is_empty() {
        return None;
    }
    let raw = match rule.control {
        ControlKind::Radio => controls
            .iter()
            .map(|c| c.reading())
            .find(|r| r.checked == Some(true))
            .map(|r| FieldValue::Text(r.value)),
        ControlKind::Checkbox if rule.is_array() => Some(checked_values(controls)),
        ControlKind::CheckboxGroup => Some(checked_values(controls)),
        ControlKind::Checkbox => {
            let checked = controls[0].reading().checked.unwrap_or(false);
            Some(FieldValue::Text(
                if checked { FLAG_YES } else { FLAG_NO }.to_owned(),
            ))
        }
        ControlKind::MultiSelect => Some(FieldValue::List(controls[0].reading().selected)),
        ControlKind::Text
        | ControlKind::Number
        | ControlKind::Range
        | ControlKind::Hidden
        | ControlKind::Select
        | ControlKind::Slider => Some(FieldValue::Text(controls[0].reading().value)),
    };
    raw.map(|v| v.normalized()).filter(|v| !v.is_empty())
}

fn checked_values(controls: &[Arc<dyn Control>]) -> FieldValue {
    FieldValue::List(
        controls
            .iter()
            .map(|c| c.reading())
            .filter(|r| r.checked == Some(true))
            .map(|r| r.value)
            .collect(),
    )
}

/// Resolve a field's current value through the full source-priority chain.
#[must_use]
pub fn resolve_value(
    rule: &FieldRule,
    store: &ValueStore,
    app_state: Option<&AppState>,
) -> Option<FieldValue> {
    let controls = store.elements(&rule.name);
    if !controls.is_empty() {
        if let Some(value) = read_from_controls(rule, &controls) {
            return Some(value);
        }
        // Bound but empty: a live read of nothing. Required fields still
        // fall through so transient churn cannot erase confirmed input.
        if !rule.required {
            return None;
        }
    }
    if rule.required {
        if let Some(value) = store.get(&rule.name).filter(|v| !v.is_empty()) {
            return Some(value);
        }
    }
    app_state
        .and_then(|state| state.form_data.get(&rule.name))
        .map(|v| v.normalized())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use formwire_core::host::{ChangeListener, ControlReading, ListenerId};

    struct FakeControl {
        reading: ControlReading,
        connected: bool,
    }

    impl FakeControl {
        fn shared(reading: ControlReading) -> Arc<dyn Control> {
            Arc::new(Self {
                reading,
                connected: true,
            })
        }
    }

    impl Control for FakeControl {
        fn reading(&self) -> ControlReading {
            self.reading.clone()
        }
        fn connected(&self) -> bool {
            self.connected
        }
        fn subscribe(&self, _listener: ChangeListener) -> ListenerId {
            0
        }
        fn unsubscribe(&self, _id: ListenerId) {}
    }

    fn rule(name: &str, control: ControlKind) -> FieldRule {
        FieldRule::new(name, format!("[name={name}]"), control)
    }

    #[test]
    fn radio_reads_first_checked() {
        let controls = vec![
            FakeControl::shared(ControlReading::checkable("apartment", false)),
            FakeControl::shared(ControlReading::checkable("single_house", true)),
            FakeControl::shared(ControlReading::checkable("duplex", true)),
        ];
        let value = read_from_controls(&rule("building_type", ControlKind::Radio), &controls);
        assert_eq!(value, Some(FieldValue::Text("single_house".into())));
    }

    #[test]
    fn unchecked_radio_group_reads_empty() {
        let controls = vec![FakeControl::shared(ControlReading::checkable("a", false))];
        assert_eq!(
            read_from_controls(&rule("building_type", ControlKind::Radio), &controls),
            None
        );
    }

    #[test]
    fn array_named_checkboxes_read_as_list() {
        let controls = vec![
            FakeControl::shared(ControlReading::checkable("1", true)),
            FakeControl::shared(ControlReading::checkable("2", false)),
            FakeControl::shared(ControlReading::checkable("3", true)),
        ];
        let value = read_from_controls(&rule("floors[]", ControlKind::Checkbox), &controls);
        assert_eq!(
            value,
            Some(FieldValue::List(vec!["1".into(), "3".into()]))
        );
    }

    #[test]
    fn checkbox_group_kind_reads_as_list_without_marker() {
        let controls = vec![
            FakeControl::shared(ControlReading::checkable("north", true)),
            FakeControl::shared(ControlReading::checkable("south", true)),
        ];
        let value = read_from_controls(&rule("facade_sides", ControlKind::CheckboxGroup), &controls);
        assert_eq!(
            value,
            Some(FieldValue::List(vec!["north".into(), "south".into()]))
        );
    }

    #[test]
    fn single_checkbox_reads_sentinel() {
        let on = vec![FakeControl::shared(ControlReading::checkable("x", true))];
        let off = vec![FakeControl::shared(ControlReading::checkable("x", false))];
        let r = rule("include_hot_water", ControlKind::Checkbox);
        assert_eq!(
            read_from_controls(&r, &on),
            Some(FieldValue::Text("yes".into()))
        );
        assert_eq!(
            read_from_controls(&r, &off),
            Some(FieldValue::Text("no".into()))
        );
    }

    #[test]
    fn multi_select_reads_selected_values() {
        let controls = vec![FakeControl::shared(ControlReading::selection(vec![
            "a".into(),
            "b".into(),
        ]))];
        let value = read_from_controls(&rule("extras", ControlKind::MultiSelect), &controls);
        assert_eq!(
            value,
            Some(FieldValue::List(vec!["a".into(), "b".into()]))
        );
    }

    #[test]
    fn text_value_is_normalized() {
        let controls = vec![FakeControl::shared(ControlReading::text(" 120 "))];
        let value = read_from_controls(&rule("heated_area", ControlKind::Number), &controls);
        assert_eq!(value, Some(FieldValue::Text("120".into())));

        let artifacts = vec![FakeControl::shared(ControlReading::text("undefined"))];
        assert_eq!(
            read_from_controls(&rule("heated_area", ControlKind::Number), &artifacts),
            None
        );
    }

    #[test]
    fn required_field_falls_back_to_committed_value() {
        let mut store = ValueStore::new();
        let r = rule("building_type", ControlKind::Radio).with_required(true);
        store.commit(
            "building_type",
            Some(FieldValue::Text("single_house".into())),
            true,
        );
        // No controls bound at all.
        let value = resolve_value(&r, &store, None);
        assert_eq!(value, Some(FieldValue::Text("single_house".into())));
    }

    #[test]
    fn optional_field_does_not_fall_back_to_committed_value() {
        let mut store = ValueStore::new();
        let r = rule("note", ControlKind::Text);
        store.commit("note", Some(FieldValue::Text("kept".into())), false);
        assert_eq!(resolve_value(&r, &store, None), None);
    }

    #[test]
    fn persisted_snapshot_is_the_last_tier() {
        let store = ValueStore::new();
        let r = rule("heated_area", ControlKind::Number).with_required(true);
        let mut app_state = AppState::default();
        app_state
            .form_data
            .insert("heated_area".into(), FieldValue::Text("140".into()));
        let value = resolve_value(&r, &store, Some(&app_state));
        assert_eq!(value, Some(FieldValue::Text("140".into())));
    }

    #[test]
    fn disconnected_controls_do_not_mask_fallbacks() {
        let mut store = ValueStore::new();
        let r = rule("building_type", ControlKind::Radio).with_required(true);
        store.commit(
            "building_type",
            Some(FieldValue::Text("single_house".into())),
            true,
        );
        let control: Arc<dyn Control> = Arc::new(FakeControl {
            reading: ControlReading::checkable("apartment", false),
            connected: false,
        });
        store.register_elements("building_type", vec![Arc::downgrade(&control)]);

        // The handle upgrades but the control is disconnected, so the store
        // reports no live elements and resolution falls back.
        let value = resolve_value(&r, &store, None);
        assert_eq!(value, Some(FieldValue::Text("single_house".into())));
    }
}
