// Processing flow: layers → substeps → steps

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

use super::status::StepStatus;

fn empty_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.filter(|value| !value.trim().is_empty()))
}

/// One unit of work inside a substep
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Step {
    pub name: String,
    /// Optional role hint (`delivery`, `storage`)
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default)]
    pub status: StepStatus,
    #[serde(default, deserialize_with = "empty_as_none", skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
    #[serde(default, deserialize_with = "empty_as_none", skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
}

impl Step {
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    pub fn with_kind(mut self, kind: &str) -> Self {
        self.kind = Some(kind.to_string());
        self
    }

    pub fn kind_is(&self, kind: &str) -> bool {
        self.kind
            .as_deref()
            .is_some_and(|k| k.trim().eq_ignore_ascii_case(kind))
    }
}

/// A named group of steps. Package substeps carry a chip identity,
/// Measurement substeps a fridge identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Substep {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub label: String,
    #[serde(default, deserialize_with = "empty_as_none", skip_serializing_if = "Option::is_none")]
    pub chip_uid: Option<String>,
    #[serde(default, deserialize_with = "empty_as_none", skip_serializing_if = "Option::is_none")]
    pub fridge_uid: Option<String>,
    /// Stored as `chips` in older documents
    #[serde(default, alias = "chips")]
    pub steps: Vec<Step>,
}

impl Substep {
    /// Label if set, otherwise the name
    pub fn label_or_name(&self) -> &str {
        if self.label.trim().is_empty() {
            self.name.trim()
        } else {
            self.label.trim()
        }
    }

    pub fn matches(&self, needle: &str) -> bool {
        let needle = needle.trim();
        self.id == needle
            || self.chip_uid.as_deref() == Some(needle)
            || self.fridge_uid.as_deref() == Some(needle)
            || self.label.trim().eq_ignore_ascii_case(needle)
            || self.name.trim().eq_ignore_ascii_case(needle)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Layer {
    #[serde(rename = "layer_name", alias = "name")]
    pub name: String,
    #[serde(default)]
    pub substeps: Vec<Substep>,
}

impl Layer {
    pub fn stage(&self) -> Option<Stage> {
        Stage::from_layer_name(&self.name)
    }
}

/// The four fixed processing stages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Design,
    Fabrication,
    Package,
    Measurement,
}

impl Stage {
    pub fn from_layer_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "design" => Some(Stage::Design),
            "fab" | "fabrication" => Some(Stage::Fabrication),
            "package" | "packaging" => Some(Stage::Package),
            "measurement" | "measure" => Some(Stage::Measurement),
            _ => None,
        }
    }

    pub fn layer_name(self) -> &'static str {
        match self {
            Stage::Design => "Design",
            Stage::Fabrication => "Fabrication",
            Stage::Package => "Package",
            Stage::Measurement => "Measurement",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.layer_name())
    }
}
