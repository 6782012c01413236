// Step roles decide which statuses a step accepts and which metadata fields
// its transitions drive.

use crate::model::{Stage, Step, StepStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntervalKind {
    Cooldown,
    Measure,
    Warmup,
}

impl IntervalKind {
    /// (start key, end key) in the fridge record
    pub fn keys(self) -> (&'static str, &'static str) {
        match self {
            IntervalKind::Cooldown => ("cooldown_start", "cooldown_end"),
            IntervalKind::Measure => ("measure_start", "measure_end"),
            IntervalKind::Warmup => ("warmup_start", "warmup_end"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepRole {
    Standard,
    /// Package step stamping one chip field when done
    Milestone(&'static str),
    /// Measurement step driving a (start, end) pair
    Interval(IntervalKind),
    Delivery,
    Storage,
}

fn name_is(step: &Step, candidates: &[&str]) -> bool {
    let name = step.name.trim().to_lowercase();
    candidates.iter().any(|candidate| name == *candidate)
}

impl StepRole {
    pub fn classify(stage: Option<Stage>, step: &Step) -> Self {
        match stage {
            Some(Stage::Package) => {
                if step.kind_is("delivery") || step.name.trim().to_lowercase().starts_with("delivery") {
                    StepRole::Delivery
                } else if name_is(step, &["pcb"]) {
                    StepRole::Milestone("pcb_ready")
                } else if name_is(step, &["bond", "bonding"]) {
                    StepRole::Milestone("bond_date")
                } else {
                    StepRole::Standard
                }
            }
            Some(Stage::Measurement) => {
                if step.kind_is("storage") || step.name.trim().to_lowercase().starts_with("storage") {
                    StepRole::Storage
                } else if name_is(step, &["cooldown"]) {
                    StepRole::Interval(IntervalKind::Cooldown)
                } else if name_is(step, &["measure"]) {
                    StepRole::Interval(IntervalKind::Measure)
                } else if name_is(step, &["warmup"]) {
                    StepRole::Interval(IntervalKind::Warmup)
                } else {
                    StepRole::Standard
                }
            }
            _ => StepRole::Standard,
        }
    }

    pub fn accepts(self, status: StepStatus) -> bool {
        match self {
            StepRole::Delivery => matches!(status, StepStatus::Pending | StepStatus::Delivery(_)),
            StepRole::Storage => matches!(status, StepStatus::Pending | StepStatus::Store(_)),
            _ => !status.is_indexed(),
        }
    }

    pub fn vocabulary(self) -> Vec<StepStatus> {
        match self {
            StepRole::Delivery => std::iter::once(StepStatus::Pending)
                .chain(StepStatus::delivery_slots())
                .collect(),
            StepRole::Storage => std::iter::once(StepStatus::Pending)
                .chain(StepStatus::store_slots())
                .collect(),
            _ => StepStatus::standard().to_vec(),
        }
    }

    /// Whether transitions touch a chip (`Some(false)`) or fridge (`Some(true)`) record
    pub fn needs_fridge(self) -> Option<bool> {
        match self {
            StepRole::Standard => None,
            StepRole::Milestone(_) | StepRole::Delivery => Some(false),
            StepRole::Interval(_) | StepRole::Storage => Some(true),
        }
    }
}
