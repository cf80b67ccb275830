#![forbid(unsafe_code)]

//! Persistence bridge: durable per-instance snapshots.
//!
//! The bridge keeps a per-instance [`AppState`] in sync with a host-supplied
//! key-value [`PersistedStore`] (session storage, a file, anything). Writes
//! are debounced off the critical path by the engine; this module owns the
//! snapshot schema, the JSON codec, and the merge rule.
//!
//! # Design Invariants
//!
//! 1. **Graceful degradation**: store failures never panic and never
//!    propagate; in-memory state remains authoritative.
//! 2. **Live values win**: merging a value snapshot into `form_data`
//!    overwrites persisted entries, and hydration never overwrites a value
//!    already committed live.
//! 3. **One timer per instance**: the engine keeps at most one outstanding
//!    debounced write; a new mutation resets it.
//!
//! # Failure Modes
//!
//! | Failure | Cause | Behavior |
//! |---------|-------|----------|
//! | `StoreError::Io` | Backend I/O failure | Logged, write skipped |
//! | `StoreError::Serialization` | JSON encode/decode | Logged, entry ignored |
//! | `StoreError::Unavailable` | Backend missing/off | Logged, engine runs in-memory |
//! | Corrupt stored JSON | Host cleared half a write | Fresh `AppState` used |

use std::collections::HashMap;
use std::fmt;
use std::sync::RwLock;

use formwire_core::value::FieldValue;
use serde::{Deserialize, Serialize};

use crate::registry::InstanceId;

// ─────────────────────────────────────────────────────────────────────────────
// Error types
// ─────────────────────────────────────────────────────────────────────────────

/// Errors from the persisted store or the snapshot codec.
#[derive(Debug)]
pub enum StoreError {
    /// I/O failure in the backend.
    Io(std::io::Error),
    /// Snapshot failed to encode or decode.
    Serialization(String),
    /// The backend is not available.
    Unavailable(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Io(e) => write!(f, "I/O error: {e}"),
            StoreError::Serialization(msg) => write!(f, "serialization error: {msg}"),
            StoreError::Unavailable(msg) => write!(f, "store unavailable: {msg}"),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        StoreError::Io(e)
    }
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

// ─────────────────────────────────────────────────────────────────────────────
// Persisted snapshot
// ─────────────────────────────────────────────────────────────────────────────

/// The durable per-instance snapshot.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AppState {
    /// Persisted field values.
    #[serde(default)]
    pub form_data: HashMap<String, FieldValue>,
    /// Index of the tab/section the user was on.
    #[serde(default)]
    pub current_tab: usize,
    /// Result of the last remote calculation, if any.
    #[serde(default)]
    pub last_calculation_result: Option<serde_json::Value>,
    /// Whether the completion animation already played for this instance.
    #[serde(default)]
    pub completion_animation_shown: bool,
    /// Milliseconds timestamp of the last write.
    #[serde(default)]
    pub timestamp: u64,
}

impl AppState {
    /// Merge a live value snapshot into `form_data`, stamping `timestamp`.
    ///
    /// Live values overwrite persisted ones; persisted entries for fields
    /// with no live value survive (they may belong to fields the host has
    /// not re-rendered yet).
    pub fn merge_values(&mut self, values: &HashMap<String, FieldValue>, now_millis: u64) {
        for (name, value) in values {
            self.form_data.insert(name.clone(), value.clone());
        }
        self.timestamp = now_millis;
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Store trait + codec
// ─────────────────────────────────────────────────────────────────────────────

/// Host-supplied durable key-value store, keyed by instance id.
pub trait PersistedStore: Send + Sync {
    /// Human-readable name for logging.
    fn name(&self) -> &str;

    /// Read the stored payload for `key`, `None` when absent.
    fn read(&self, key: &str) -> StoreResult<Option<String>>;

    /// Write the payload for `key`.
    fn write(&self, key: &str, payload: &str) -> StoreResult<()>;

    /// Remove the payload for `key`. Absent keys are a no-op.
    fn remove(&self, key: &str) -> StoreResult<()>;
}

/// Load and decode the snapshot for an instance.
///
/// Store and decode failures are logged and collapse to `None`; a missing
/// or unreadable snapshot is a first run, not an error.
pub fn load_app_state(store: &dyn PersistedStore, id: &InstanceId) -> Option<AppState> {
    match store.read(id.as_str()) {
        Ok(Some(payload)) => match serde_json::from_str::<AppState>(&payload) {
            Ok(state) => Some(state),
            Err(e) => {
                tracing::warn!(
                    store = store.name(),
                    instance = %id,
                    error = %e,
                    "stored snapshot unreadable, starting fresh"
                );
                None
            }
        },
        Ok(None) => None,
        Err(e) => {
            tracing::warn!(
                store = store.name(),
                instance = %id,
                error = %e,
                "persisted store read failed"
            );
            None
        }
    }
}

/// Encode and write the snapshot for an instance.
pub fn save_app_state(
    store: &dyn PersistedStore,
    id: &InstanceId,
    state: &AppState,
) -> StoreResult<()> {
    let payload = serde_json::to_string(state)
        .map_err(|e| StoreError::Serialization(e.to_string()))?;
    store.write(id.as_str(), &payload)
}

// ─────────────────────────────────────────────────────────────────────────────
// In-memory store
// ─────────────────────────────────────────────────────────────────────────────

/// In-memory [`PersistedStore`] for tests and ephemeral hosts.
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().unwrap().len()
    }

    /// Whether the store holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().unwrap().is_empty()
    }
}

impl PersistedStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    fn read(&self, key: &str) -> StoreResult<Option<String>> {
        Ok(self.entries.read().unwrap().get(key).cloned())
    }

    fn write(&self, key: &str, payload: &str) -> StoreResult<()> {
        self.entries
            .write()
            .unwrap()
            .insert(key.to_owned(), payload.to_owned());
        Ok(())
    }

    fn remove(&self, key: &str) -> StoreResult<()> {
        self.entries.write().unwrap().remove(key);
        Ok(())
    }
}
