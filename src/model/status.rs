// Step status vocabulary
//
// Three vocabularies share one type: the standard lifecycle statuses plus the
// indexed delivery/store tokens. Which subset a step accepts is decided by its
// role (see lifecycle::role).

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Highest slot index for `delivery#N` / `store#N` tokens
pub const MAX_SLOT: u8 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StepStatus {
    #[default]
    Pending,
    InProgress,
    Done,
    Terminate,
    /// `delivery#N`
    Delivery(u8),
    /// `store#N`
    Store(u8),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown step status '{0}'")]
pub struct UnknownStatus(pub String);

impl StepStatus {
    /// `pending` and `terminate` count as inactive for interval steps
    pub fn is_inactive(self) -> bool {
        matches!(self, StepStatus::Pending | StepStatus::Terminate)
    }

    pub fn is_indexed(self) -> bool {
        matches!(self, StepStatus::Delivery(_) | StepStatus::Store(_))
    }

    /// Every status a standard step accepts
    pub fn standard() -> [StepStatus; 4] {
        [
            StepStatus::Pending,
            StepStatus::InProgress,
            StepStatus::Done,
            StepStatus::Terminate,
        ]
    }

    pub fn delivery_slots() -> impl Iterator<Item = StepStatus> {
        (1..=MAX_SLOT).map(StepStatus::Delivery)
    }

    pub fn store_slots() -> impl Iterator<Item = StepStatus> {
        (1..=MAX_SLOT).map(StepStatus::Store)
    }
}

fn parse_slot(raw: &str, prefix: &str) -> Option<u8> {
    let n: u8 = raw.strip_prefix(prefix)?.parse().ok()?;
    (1..=MAX_SLOT).contains(&n).then_some(n)
}

impl FromStr for StepStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase();
        match normalized.as_str() {
            // an empty status is what older runs stored for untouched steps
            "" | "pending" => Ok(StepStatus::Pending),
            "in_progress" => Ok(StepStatus::InProgress),
            "done" => Ok(StepStatus::Done),
            "terminate" => Ok(StepStatus::Terminate),
            other => parse_slot(other, "delivery#")
                .map(StepStatus::Delivery)
                .or_else(|| parse_slot(other, "store#").map(StepStatus::Store))
                .ok_or_else(|| UnknownStatus(s.to_string())),
        }
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepStatus::Pending => write!(f, "pending"),
            StepStatus::InProgress => write!(f, "in_progress"),
            StepStatus::Done => write!(f, "done"),
            StepStatus::Terminate => write!(f, "terminate"),
            StepStatus::Delivery(n) => write!(f, "delivery#{}", n),
            StepStatus::Store(n) => write!(f, "store#{}", n),
        }
    }
}

impl Serialize for StepStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for StepStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        // Stored flows are coerced rather than rejected so a bad status never
        // makes a whole run unloadable.
        Ok(raw.parse().unwrap_or_else(|e: UnknownStatus| {
            tracing::warn!(status = %e.0, "Coercing unrecognized stored status to pending");
            StepStatus::Pending
        }))
    }
}
