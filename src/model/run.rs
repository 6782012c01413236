// Run aggregate

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::flow::{Layer, Stage};
use super::meta::RunMetadata;

/// Run classification. Only `Main` and `Test` have mirror relations.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum RunClass {
    Main,
    Test,
    Other(String),
}

impl RunClass {
    pub fn as_str(&self) -> &str {
        match self {
            RunClass::Main => "Main",
            RunClass::Test => "Test",
            RunClass::Other(name) => name.as_str(),
        }
    }
}

impl From<String> for RunClass {
    fn from(raw: String) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "main" | "fab" => RunClass::Main,
            "test" => RunClass::Test,
            _ => RunClass::Other(raw.trim().to_string()),
        }
    }
}

impl From<RunClass> for String {
    fn from(class: RunClass) -> Self {
        class.as_str().to_string()
    }
}

impl FromStr for RunClass {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(RunClass::from(s.to_string()))
    }
}

impl fmt::Display for RunClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RunKey {
    pub class: RunClass,
    pub run_no: String,
}

impl RunKey {
    pub fn new(class: RunClass, run_no: impl Into<String>) -> Self {
        Self {
            class,
            run_no: run_no.into(),
        }
    }

    /// Document id in the runs collection, e.g. `main-007`
    pub fn doc_id(&self) -> String {
        let class: String = self
            .class
            .as_str()
            .to_lowercase()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect();
        format!("{}-{}", class, self.run_no.trim())
    }
}

impl fmt::Display for RunKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} run {}", self.class, self.run_no)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Run {
    pub key: RunKey,
    pub device_name: String,
    pub created_date: String,
    pub creator: String,
    pub layers: Vec<Layer>,
    pub metadata: RunMetadata,
}

impl Run {
    pub fn new(key: RunKey, device_name: &str, creator: &str, created_date: &str) -> Self {
        Self {
            key,
            device_name: device_name.to_string(),
            created_date: created_date.to_string(),
            creator: creator.to_string(),
            layers: Vec::new(),
            metadata: RunMetadata::default(),
        }
    }

    pub fn with_layers(mut self, layers: Vec<Layer>) -> Self {
        self.layers = layers;
        self
    }

    pub fn layer(&self, stage: Stage) -> Option<&Layer> {
        self.layers.iter().find(|layer| layer.stage() == Some(stage))
    }

    /// Labels of the Package substeps in flow order
    pub fn chip_labels(&self) -> Vec<String> {
        self.layer(Stage::Package)
            .map(|layer| {
                layer
                    .substeps
                    .iter()
                    .map(|substep| substep.label_or_name().to_string())
                    .filter(|label| !label.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_class_parsing() {
        assert_eq!("main".parse::<RunClass>().unwrap(), RunClass::Main);
        assert_eq!("TEST".parse::<RunClass>().unwrap(), RunClass::Test);
        assert_eq!(
            "Pilot".parse::<RunClass>().unwrap(),
            RunClass::Other("Pilot".to_string())
        );
    }

    #[test]
    fn test_doc_id_is_stable() {
        assert_eq!(RunKey::new(RunClass::Main, "007").doc_id(), "main-007");
        assert_eq!(
            RunKey::new(RunClass::Other("Side Batch".to_string()), " 12 ").doc_id(),
            "side_batch-12"
        );
    }
}
