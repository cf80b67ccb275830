#![forbid(unsafe_code)]

//! Committed field values and normalization.
//!
//! A field holds text, a list of texts, or a flag. Absence is always
//! represented by key deletion in the store, never by a stored null, so
//! every `FieldValue` that exists is a real committed answer.
//!
//! # Normalization
//!
//! Hosts hand the engine raw control values. Before anything is committed
//! or compared, values are normalized:
//!
//! - text is trimmed; the literal strings `"undefined"` and `"null"`
//!   (artifacts of stringified host nulls) become empty
//! - list entries are normalized individually and empty entries dropped
//! - flags are untouched; both `true` and `false` are committed answers
//!
//! A normalized-empty value is never stored. See [`FieldValue::is_empty`].

use serde::{Deserialize, Serialize};

/// Sentinel a single checkbox reads as when checked.
pub const FLAG_YES: &str = "yes";
/// Sentinel a single checkbox reads as when unchecked.
pub const FLAG_NO: &str = "no";

/// A committed field value.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// Free text, a selected option, or a checkbox sentinel (`yes`/`no`).
    Text(String),
    /// Checked values of a checkbox group or a multi-select.
    List(Vec<String>),
    /// A boolean answer committed programmatically.
    Flag(bool),
}

impl FieldValue {
    /// Normalize a raw text value: trim and map stringified-null artifacts
    /// to empty.
    #[must_use]
    pub fn normalize_text(raw: &str) -> String {
        let trimmed = raw.trim();
        if trimmed == "undefined" || trimmed == "null" {
            String::new()
        } else {
            trimmed.to_owned()
        }
    }

    /// Return a normalized copy of this value.
    ///
    /// List entries are normalized individually; entries that normalize to
    /// empty are dropped.
    #[must_use]
    pub fn normalized(&self) -> FieldValue {
        match self {
            FieldValue::Text(s) => FieldValue::Text(Self::normalize_text(s)),
            FieldValue::List(items) => FieldValue::List(
                items
                    .iter()
                    .map(|s| Self::normalize_text(s))
                    .filter(|s| !s.is_empty())
                    .collect(),
            ),
            FieldValue::Flag(b) => FieldValue::Flag(*b),
        }
    }

    /// Whether this value counts as empty once normalized.
    ///
    /// Flags are never empty: an unchecked box is still an answer.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            FieldValue::Text(s) => Self::normalize_text(s).is_empty(),
            FieldValue::List(items) => !items
                .iter()
                .any(|s| !Self::normalize_text(s).is_empty()),
            FieldValue::Flag(_) => false,
        }
    }

    /// The text form of this value, if it is text.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// The list form of this value, if it is a list.
    #[must_use]
    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            FieldValue::List(items) => Some(items),
            _ => None,
        }
    }

    /// Whether this value reads as an affirmative answer.
    ///
    /// `Flag(true)` and the `yes` checkbox sentinel are affirmative.
    #[must_use]
    pub fn is_affirmative(&self) -> bool {
        match self {
            FieldValue::Flag(b) => *b,
            FieldValue::Text(s) => Self::normalize_text(s) == FLAG_YES,
            FieldValue::List(_) => false,
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Text(s.to_owned())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Text(s)
    }
}

impl From<Vec<String>> for FieldValue {
    fn from(items: Vec<String>) -> Self {
        FieldValue::List(items)
    }
}

impl From<&[&str]> for FieldValue {
    fn from(items: &[&str]) -> Self {
        FieldValue::List(items.iter().map(|s| (*s).to_owned()).collect())
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        FieldValue::Flag(b)
    }
}
