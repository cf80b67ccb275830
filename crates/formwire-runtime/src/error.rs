#![forbid(unsafe_code)]

//! Engine error types.
//!
//! Nothing in the recompute/gate pipeline is allowed to escape and
//! interrupt the host's event loop: public entry points log these errors
//! and degrade rather than propagate them. The types exist so internal
//! fallible paths (hydration, persistence) compose with `?` before the
//! boundary swallows them.

use std::fmt;

use crate::persistence::StoreError;
use crate::registry::InstanceId;

/// Errors arising inside the engine.
#[derive(Debug)]
pub enum EngineError {
    /// A second instance attempted to go live while another was bound.
    Conflict {
        /// The instance currently live.
        live: InstanceId,
        /// The instance whose initialization was refused.
        requested: InstanceId,
    },
    /// A field name with no rule.
    UnknownField(String),
    /// An instance id with no record.
    UnknownInstance(InstanceId),
    /// A field failed to hydrate; remaining fields continue.
    Hydration {
        /// The field that failed.
        field: String,
        /// Captured failure message.
        message: String,
    },
    /// Persisted-store failure; in-memory state stays authoritative.
    Store(StoreError),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::Conflict { live, requested } => {
                write!(f, "instance {requested} refused: {live} is live")
            }
            EngineError::UnknownField(name) => write!(f, "unknown field: {name}"),
            EngineError::UnknownInstance(id) => write!(f, "unknown instance: {id}"),
            EngineError::Hydration { field, message } => {
                write!(f, "hydration of {field} failed: {message}")
            }
            EngineError::Store(e) => write!(f, "persisted store: {e}"),
        }
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EngineError::Store(e) => Some(e),
            _ => None,
        }
    }
}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        EngineError::Store(e)
    }
}
