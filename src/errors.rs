use thiserror::Error;

use crate::lifecycle::TransitionError;
use crate::registry::EntityKind;
use crate::store::StoreError;

/// Errors that reach the caller of a save. Mirror failures never show up
/// here; they are reported as sync warnings instead.
#[derive(Debug, Error)]
pub enum TrackerError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error("duplicate {kind} uid '{uid}' in the flow; refusing to sync this run")]
    IdentityCollision { kind: EntityKind, uid: String },

    #[error("{entity} record is missing required fields: {}", .missing.join(", "))]
    ConsistencyViolation { entity: String, missing: Vec<String> },

    #[error("no relation property for system '{system}' in a '{classification}' run")]
    UnknownRelationRole { system: String, classification: String },

    #[error("invalid value for '{key}': {reason}")]
    InvalidField { key: String, reason: String },

    #[error("no {kind} with uid '{uid}' in this run")]
    UnknownEntity { kind: EntityKind, uid: String },
}
