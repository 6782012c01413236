// Status transitions and their timestamp side effects

use super::role::{IntervalKind, StepRole};
use super::TransitionError;
use crate::metadata::{default_record, MetaScope};
use crate::model::{MetaRecord, Run, Step, StepStatus};

/// Indices of one step inside a run's flow
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepAddress {
    pub layer: usize,
    pub substep: usize,
    pub step: usize,
}

impl StepAddress {
    /// Resolve names to indices. The substep may be named by id, uid, label or name.
    pub fn locate(run: &Run, layer: &str, substep: &str, step: &str) -> Result<Self, TransitionError> {
        let not_found = || TransitionError::StepNotFound {
            layer: layer.to_string(),
            substep: substep.to_string(),
            step: step.to_string(),
        };

        let layer_index = run
            .layers
            .iter()
            .position(|l| l.name.trim().eq_ignore_ascii_case(layer.trim()))
            .ok_or_else(not_found)?;
        let substep_index = run.layers[layer_index]
            .substeps
            .iter()
            .position(|s| s.matches(substep))
            .ok_or_else(not_found)?;
        let step_index = run.layers[layer_index].substeps[substep_index]
            .steps
            .iter()
            .position(|s| s.name.trim().eq_ignore_ascii_case(step.trim()))
            .ok_or_else(not_found)?;

        Ok(Self {
            layer: layer_index,
            substep: substep_index,
            step: step_index,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionOutcome {
    pub old: StepStatus,
    pub new: StepStatus,
    pub role: StepRole,
    /// Uid of the chip or fridge record touched, if any
    pub entity_uid: Option<String>,
}

/// started_at / completed_at effects for standard pairs; other pairs are no-ops
pub fn apply_step_timestamps(step: &mut Step, old: StepStatus, new: StepStatus, now: &str) {
    use StepStatus::{Done, InProgress, Pending};

    match (old, new) {
        (Pending, InProgress) => {
            step.started_at = Some(now.to_string());
            step.completed_at = None;
        }
        (InProgress, Done) => {
            step.completed_at = Some(now.to_string());
        }
        (Pending, Done) => {
            step.started_at = Some(now.to_string());
            step.completed_at = Some(now.to_string());
        }
        (Done, InProgress) => {
            step.completed_at = None;
            step.started_at = Some(now.to_string());
        }
        (Done, Pending) | (InProgress, Pending) => {
            step.started_at = None;
            step.completed_at = None;
        }
        _ => {}
    }
}

/// Two-key (start, end) machine over the inactive set {pending, terminate}
pub fn apply_interval(record: &mut MetaRecord, kind: IntervalKind, old: StepStatus, new: StepStatus, now: &str) {
    let (start, end) = kind.keys();

    if new.is_inactive() {
        record.clear(start);
        record.clear(end);
        return;
    }

    match new {
        StepStatus::InProgress if old.is_inactive() || old == StepStatus::Done => {
            record.set(start, now);
            record.clear(end);
        }
        StepStatus::Done if old.is_inactive() => {
            if !record.has_value(start) {
                record.set(start, now);
            }
            record.set(end, now);
        }
        StepStatus::Done if old == StepStatus::InProgress => {
            record.set(end, now);
        }
        _ => {}
    }
}

/// Delivery/storage: record the literal token, stamp the time once, clear on pending
pub fn apply_indexed(record: &mut MetaRecord, token_key: &str, time_key: &str, new: StepStatus, now: &str) {
    if new.is_indexed() {
        record.set(token_key, new.to_string());
        if !record.has_value(time_key) {
            record.set(time_key, now);
        }
    } else {
        record.clear(token_key);
        record.clear(time_key);
    }
}

/// Stamp `key` on first reaching done, clear it when leaving done
pub fn apply_milestone(record: &mut MetaRecord, key: &str, old: StepStatus, new: StepStatus, now: &str) {
    if new == StepStatus::Done {
        if old != StepStatus::Done && !record.has_value(key) {
            record.set(key, now);
        }
    } else if old == StepStatus::Done {
        record.clear(key);
    }
}

/// Apply a status change to one step and derive the metadata it drives.
///
/// The status is checked against the step role's vocabulary before anything
/// is touched. Chip/fridge records are created on demand.
pub fn handle_status_change(
    run: &mut Run,
    address: StepAddress,
    new: StepStatus,
    now: &str,
) -> Result<TransitionOutcome, TransitionError> {
    let Run { layers, metadata, .. } = run;

    let layer = layers.get_mut(address.layer).ok_or(TransitionError::InvalidAddress(address))?;
    let stage = layer.stage();
    let substep = layer
        .substeps
        .get_mut(address.substep)
        .ok_or(TransitionError::InvalidAddress(address))?;
    let chip_uid = substep.chip_uid.clone();
    let fridge_uid = substep.fridge_uid.clone();
    let substep_name = substep.label_or_name().to_string();
    let step = substep
        .steps
        .get_mut(address.step)
        .ok_or(TransitionError::InvalidAddress(address))?;

    let role = StepRole::classify(stage, step);
    if !role.accepts(new) {
        return Err(TransitionError::InvalidStatus {
            step: step.name.clone(),
            status: new.to_string(),
            allowed: role
                .vocabulary()
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", "),
        });
    }

    let entity_uid = match role.needs_fridge() {
        None => None,
        Some(true) => Some(fridge_uid.ok_or_else(|| TransitionError::MissingEntity {
            substep: substep_name.clone(),
        })?),
        Some(false) => Some(chip_uid.ok_or_else(|| TransitionError::MissingEntity {
            substep: substep_name.clone(),
        })?),
    };

    let old = step.status;
    apply_step_timestamps(step, old, new, now);
    step.status = new;

    if let Some(uid) = &entity_uid {
        let record = match role.needs_fridge() {
            Some(true) => metadata
                .fridges
                .entry(uid.clone())
                .or_insert_with(|| default_record(MetaScope::Fridge)),
            _ => metadata
                .chips
                .entry(uid.clone())
                .or_insert_with(|| default_record(MetaScope::Chip)),
        };

        match role {
            StepRole::Milestone(key) => apply_milestone(record, key, old, new, now),
            StepRole::Interval(kind) => apply_interval(record, kind, old, new, now),
            StepRole::Delivery => apply_indexed(record, "delivery", "delivery_time", new, now),
            StepRole::Storage => apply_indexed(record, "storage", "storage_time", new, now),
            StepRole::Standard => {}
        }
    }

    tracing::debug!(
        step = %step.name,
        substep = %substep_name,
        old = %old,
        new = %new,
        "Applied step transition"
    );

    Ok(TransitionOutcome {
        old,
        new,
        role,
        entity_uid,
    })
}
