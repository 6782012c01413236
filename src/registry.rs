// Entity registry: the chips and fridges a flow currently addresses
//
// Identity is the opaque uid on the substep, never its label or position.

use std::collections::{HashMap, HashSet};
use std::fmt;

use uuid::Uuid;

use crate::errors::TrackerError;
use crate::model::{Layer, Stage, Step, StepStatus, Substep};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Chip,
    Fridge,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Chip => f.write_str("chip"),
            EntityKind::Fridge => f.write_str("fridge"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityRef {
    pub kind: EntityKind,
    pub uid: String,
    pub label: String,
    /// Label with duplicates numbered in flow order, e.g. `Bluefors (2)`
    pub display_label: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntityRegistry {
    pub chips: Vec<EntityRef>,
    pub fridges: Vec<EntityRef>,
}

fn collect(layers: &[Layer], kind: EntityKind) -> Result<Vec<EntityRef>, TrackerError> {
    let stage = match kind {
        EntityKind::Chip => Stage::Package,
        EntityKind::Fridge => Stage::Measurement,
    };

    let mut seen = HashSet::new();
    let mut entities = Vec::new();
    for layer in layers.iter().filter(|layer| layer.stage() == Some(stage)) {
        for substep in &layer.substeps {
            let uid = match kind {
                EntityKind::Chip => substep.chip_uid.as_ref(),
                EntityKind::Fridge => substep.fridge_uid.as_ref(),
            };
            let Some(uid) = uid else { continue };
            if !seen.insert(uid.clone()) {
                return Err(TrackerError::IdentityCollision {
                    kind,
                    uid: uid.clone(),
                });
            }
            entities.push(EntityRef {
                kind,
                uid: uid.clone(),
                label: substep.label_or_name().to_string(),
                display_label: String::new(),
            });
        }
    }

    number_duplicate_labels(&mut entities);
    Ok(entities)
}

fn number_duplicate_labels(entities: &mut [EntityRef]) {
    let mut totals: HashMap<String, usize> = HashMap::new();
    for entity in entities.iter() {
        *totals.entry(entity.label.clone()).or_default() += 1;
    }

    let mut seen: HashMap<String, usize> = HashMap::new();
    for entity in entities.iter_mut() {
        let total = totals.get(&entity.label).copied().unwrap_or(1);
        entity.display_label = if total > 1 {
            let n = seen.entry(entity.label.clone()).or_default();
            *n += 1;
            format!("{} ({})", entity.label, n)
        } else {
            entity.label.clone()
        };
    }
}

impl EntityRegistry {
    /// Build from the flow, refusing duplicate uids of the same kind
    pub fn from_layers(layers: &[Layer]) -> Result<Self, TrackerError> {
        Ok(Self {
            chips: collect(layers, EntityKind::Chip)?,
            fridges: collect(layers, EntityKind::Fridge)?,
        })
    }

    pub fn get(&self, kind: EntityKind, uid: &str) -> Option<&EntityRef> {
        let entities = match kind {
            EntityKind::Chip => &self.chips,
            EntityKind::Fridge => &self.fridges,
        };
        entities.iter().find(|entity| entity.uid == uid)
    }

    pub fn uids(&self, kind: EntityKind) -> Vec<String> {
        let entities = match kind {
            EntityKind::Chip => &self.chips,
            EntityKind::Fridge => &self.fridges,
        };
        entities.iter().map(|entity| entity.uid.clone()).collect()
    }
}

fn short_hex() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_string()
}

fn fill_label(substep: &mut Substep, fallback: &str) {
    if substep.label.trim().is_empty() {
        substep.label = if substep.name.trim().is_empty() {
            fallback.to_string()
        } else {
            substep.name.trim().to_string()
        };
    }
}

/// Assign missing substep ids, entity uids and labels. Existing values are
/// never rewritten. Returns how many identifiers were assigned.
pub fn ensure_flow_ids(layers: &mut [Layer]) -> usize {
    let mut assigned = 0;
    for layer in layers.iter_mut() {
        let stage = layer.stage();
        for substep in &mut layer.substeps {
            if substep.id.trim().is_empty() {
                substep.id = Uuid::new_v4().to_string();
                assigned += 1;
            }
            match stage {
                Some(Stage::Package) => {
                    if substep.chip_uid.is_none() {
                        substep.chip_uid = Some(format!("chip_{}", short_hex()));
                        assigned += 1;
                    }
                    fill_label(substep, "C??");
                }
                Some(Stage::Measurement) => {
                    if substep.fridge_uid.is_none() {
                        substep.fridge_uid = Some(format!("fridge_{}", short_hex()));
                        assigned += 1;
                    }
                    fill_label(substep, "Fridge??");
                }
                _ => {}
            }
        }
    }
    assigned
}

fn steps(names: &[&str]) -> Vec<Step> {
    names.iter().map(|name| Step::named(name)).collect()
}

fn fridge(uid: &str, label: &str) -> Substep {
    let mut steps = steps(&["Cooldown", "Measure", "Warmup"]);
    steps.push(Step {
        status: StepStatus::Pending,
        ..Step::named("Storage").with_kind("storage")
    });
    Substep {
        label: label.to_string(),
        fridge_uid: Some(uid.to_string()),
        steps,
        ..Substep::default()
    }
}

/// Standard four-stage flow used for new runs
pub fn default_flow() -> Vec<Layer> {
    let mut package_steps = steps(&["PCB", "Bonding"]);
    package_steps.push(Step::named("Delivery").with_kind("delivery"));

    let mut layers = vec![
        Layer {
            name: Stage::Design.layer_name().to_string(),
            substeps: vec![Substep {
                name: "Design".to_string(),
                steps: steps(&["Spec", "Function", "DRC", "Finalize"]),
                ..Substep::default()
            }],
        },
        Layer {
            name: Stage::Fabrication.layer_name().to_string(),
            substeps: vec![Substep {
                name: "Fab".to_string(),
                steps: steps(&["Marker", "Trench", "Top TiN", "Bot Nb", "Bot Co", "Airbridge", "Dicing"]),
                ..Substep::default()
            }],
        },
        Layer {
            name: Stage::Package.layer_name().to_string(),
            substeps: vec![Substep {
                label: "C01".to_string(),
                chip_uid: Some("chip_default_c01".to_string()),
                steps: package_steps,
                ..Substep::default()
            }],
        },
        Layer {
            name: Stage::Measurement.layer_name().to_string(),
            substeps: vec![
                fridge("fridge_default_iceoxford", "ICEOxford"),
                fridge("fridge_default_bluefors", "Bluefors"),
            ],
        },
    ];
    ensure_flow_ids(&mut layers);
    layers
}
