// Immutable views of the watched entities of a run

use std::collections::BTreeMap;
use std::ops::Deref;

use crate::mirror::FridgeSystem;
use crate::model::{MetaLocation, MetaRecord, Run, RunClass, Stage};

/// A watched entity. The fab record sorts first so its page exists before
/// fridge relations are set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Subject {
    Fab,
    Fridge(String),
}

/// Date property bound to a (start, end) pair of record fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateBinding {
    pub property: &'static str,
    pub start: &'static str,
    pub end: &'static str,
}

const FAB_BINDINGS: &[DateBinding] = &[DateBinding {
    property: "Fab dates",
    start: "fabin",
    end: "fabout",
}];

const FRIDGE_BINDINGS: &[DateBinding] = &[
    DateBinding {
        property: "Cooldown dates",
        start: "cooldown_start",
        end: "warmup_start",
    },
    DateBinding {
        property: "Measure dates",
        start: "measure_start",
        end: "measure_end",
    },
    DateBinding {
        property: "Warmup dates",
        start: "warmup_start",
        end: "warmup_end",
    },
];

impl Subject {
    pub fn anchor_key(&self) -> &'static str {
        match self {
            Subject::Fab => "fabin",
            Subject::Fridge(_) => "cooldown_start",
        }
    }

    pub fn bindings(&self) -> &'static [DateBinding] {
        match self {
            Subject::Fab => FAB_BINDINGS,
            Subject::Fridge(_) => FRIDGE_BINDINGS,
        }
    }

    pub fn binding(&self, property: &str) -> Option<&'static DateBinding> {
        self.bindings().iter().find(|binding| binding.property == property)
    }

    pub fn location(&self) -> MetaLocation {
        match self {
            Subject::Fab => MetaLocation::Fab,
            Subject::Fridge(uid) => MetaLocation::Fridge(uid.clone()),
        }
    }
}

impl std::fmt::Display for Subject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Subject::Fab => f.write_str("fab"),
            Subject::Fridge(uid) => write!(f, "fridge {uid}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubjectState {
    pub label: String,
    pub system: Option<FridgeSystem>,
    pub fields: MetaRecord,
}

impl SubjectState {
    pub fn anchor<'a>(&'a self, subject: &Subject) -> &'a str {
        self.fields.get(subject.anchor_key()).trim()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub run_class: RunClass,
    pub run_no: String,
    pub device_name: String,
    pub chip_labels: Vec<String>,
    subjects: BTreeMap<Subject, SubjectState>,
}

impl Snapshot {
    fn capture(run: &Run) -> Self {
        let mut subjects = BTreeMap::new();
        subjects.insert(
            Subject::Fab,
            SubjectState {
                label: run.device_name.clone(),
                system: None,
                fields: run.metadata.fab.clone(),
            },
        );

        if let Some(layer) = run.layer(Stage::Measurement) {
            for substep in &layer.substeps {
                let Some(uid) = &substep.fridge_uid else { continue };
                let label = substep.label_or_name().to_string();
                // only systems with a mirror database are watched
                let Some(system) = FridgeSystem::from_label(&label) else { continue };
                subjects.insert(
                    Subject::Fridge(uid.clone()),
                    SubjectState {
                        label,
                        system: Some(system),
                        fields: run.metadata.fridges.get(uid).cloned().unwrap_or_default(),
                    },
                );
            }
        }

        Self {
            run_class: run.key.class.clone(),
            run_no: run.key.run_no.clone(),
            device_name: run.device_name.clone(),
            chip_labels: run.chip_labels(),
            subjects,
        }
    }

    pub fn get(&self, subject: &Subject) -> Option<&SubjectState> {
        self.subjects.get(subject)
    }

    pub fn subjects(&self) -> impl Iterator<Item = (&Subject, &SubjectState)> {
        self.subjects.iter()
    }

    /// Field value, `""` for unknown subjects or fields
    pub fn field(&self, subject: &Subject, key: &str) -> &str {
        self.get(subject).map(|state| state.fields.get(key)).unwrap_or("")
    }
}

/// State as loaded, before any local edits. Never refreshed except by reload.
#[derive(Debug, Clone, PartialEq)]
pub struct PreSnapshot(Snapshot);

/// Authoritative state read back after a save
#[derive(Debug, Clone, PartialEq)]
pub struct PostSnapshot(Snapshot);

impl PreSnapshot {
    pub fn capture(run: &Run) -> Self {
        Self(Snapshot::capture(run))
    }
}

impl PostSnapshot {
    pub fn capture(run: &Run) -> Self {
        Self(Snapshot::capture(run))
    }
}

impl Deref for PreSnapshot {
    type Target = Snapshot;

    fn deref(&self) -> &Snapshot {
        &self.0
    }
}

impl Deref for PostSnapshot {
    type Target = Snapshot;

    fn deref(&self) -> &Snapshot {
        &self.0
    }
}
