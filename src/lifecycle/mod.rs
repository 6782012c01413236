// Step status state machine

use thiserror::Error;

pub mod machine;
pub mod role;

pub use machine::{
    apply_indexed, apply_interval, apply_milestone, apply_step_timestamps, handle_status_change,
    StepAddress, TransitionOutcome,
};
pub use role::{IntervalKind, StepRole};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("no step '{step}' in substep '{substep}' of layer '{layer}'")]
    StepNotFound {
        layer: String,
        substep: String,
        step: String,
    },
    #[error("step address {0:?} is outside the flow")]
    InvalidAddress(StepAddress),
    #[error("status '{status}' is not valid for step '{step}' (allowed: {allowed})")]
    InvalidStatus {
        step: String,
        status: String,
        allowed: String,
    },
    #[error("substep '{substep}' has no entity uid; run flow id assignment first")]
    MissingEntity { substep: String },
}
