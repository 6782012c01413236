// Stage and entity metadata records

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const EXTERNAL_URL: &str = "external_url";
pub const EXTERNAL_PAGE_ID: &str = "external_page_id";

/// Flat string record keyed by normalized key. A cleared field holds `""`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetaRecord(BTreeMap<String, String>);

impl MetaRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Value of `key`, or `""` when absent
    pub fn get(&self, key: &str) -> &str {
        self.0.get(key).map(String::as_str).unwrap_or("")
    }

    pub fn has_value(&self, key: &str) -> bool {
        !self.get(key).trim().is_empty()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        self.0.insert(key.to_string(), value.into());
    }

    pub fn clear(&mut self, key: &str) {
        self.set(key, "");
    }

    /// Insert `key` with an empty value unless it already exists
    pub fn declare(&mut self, key: &str) {
        self.0.entry(key.to_string()).or_default();
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn page_id(&self) -> &str {
        self.get(EXTERNAL_PAGE_ID).trim()
    }

    pub fn page_url(&self) -> &str {
        self.get(EXTERNAL_URL).trim()
    }

    pub fn set_linkage(&mut self, url: &str, page_id: &str) {
        self.set(EXTERNAL_URL, url);
        self.set(EXTERNAL_PAGE_ID, page_id);
    }

    pub fn clear_linkage(&mut self) {
        self.clear(EXTERNAL_URL);
        self.clear(EXTERNAL_PAGE_ID);
    }
}

impl FromIterator<(String, String)> for MetaRecord {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Per-entity records keyed by chip or fridge uid
pub type EntityMetaMap = BTreeMap<String, MetaRecord>;

/// All metadata of a run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunMetadata {
    pub design: MetaRecord,
    pub fab: MetaRecord,
    /// Stored under `metadata.package.chips`
    pub chips: EntityMetaMap,
    /// Stored under `metadata.measure.fridges`
    pub fridges: EntityMetaMap,
    /// Unrecognized top-level sections, carried through untouched
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// Addresses one metadata record inside a run
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MetaLocation {
    Design,
    Fab,
    Chip(String),
    Fridge(String),
}

impl MetaLocation {
    /// Field path segments below the document root
    pub fn segments(&self, key: &str) -> Vec<String> {
        let mut segments = vec!["metadata".to_string()];
        match self {
            MetaLocation::Design => segments.push("design".to_string()),
            MetaLocation::Fab => segments.push("fab".to_string()),
            MetaLocation::Chip(uid) => {
                segments.extend(["package".to_string(), "chips".to_string(), uid.clone()])
            }
            MetaLocation::Fridge(uid) => {
                segments.extend(["measure".to_string(), "fridges".to_string(), uid.clone()])
            }
        }
        segments.push(key.to_string());
        segments
    }
}

impl RunMetadata {
    pub fn record(&self, location: &MetaLocation) -> Option<&MetaRecord> {
        match location {
            MetaLocation::Design => Some(&self.design),
            MetaLocation::Fab => Some(&self.fab),
            MetaLocation::Chip(uid) => self.chips.get(uid),
            MetaLocation::Fridge(uid) => self.fridges.get(uid),
        }
    }

    pub fn record_mut(&mut self, location: &MetaLocation) -> Option<&mut MetaRecord> {
        match location {
            MetaLocation::Design => Some(&mut self.design),
            MetaLocation::Fab => Some(&mut self.fab),
            MetaLocation::Chip(uid) => self.chips.get_mut(uid),
            MetaLocation::Fridge(uid) => self.fridges.get_mut(uid),
        }
    }

    /// Every record location, stage records first
    pub fn locations(&self) -> Vec<MetaLocation> {
        let mut locations = vec![MetaLocation::Design, MetaLocation::Fab];
        locations.extend(self.chips.keys().cloned().map(MetaLocation::Chip));
        locations.extend(self.fridges.keys().cloned().map(MetaLocation::Fridge));
        locations
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_fields_read_as_empty() {
        let mut record = MetaRecord::new();
        assert_eq!(record.get("storage"), "");
        assert!(!record.has_value("storage"));

        record.set("storage", "store#1");
        assert!(record.has_value("storage"));
        record.clear("storage");
        assert!(record.contains_key("storage"));
        assert_eq!(record.get("storage"), "");
    }

    #[test]
    fn test_declare_never_overwrites() {
        let mut record = MetaRecord::new();
        record.set("notes", "cracked corner");
        record.declare("notes");
        record.declare("owner");
        assert_eq!(record.get("notes"), "cracked corner");
        assert!(record.contains_key("owner"));
    }

    #[test]
    fn test_location_segments() {
        let location = MetaLocation::Fridge("fridge_0a1b2c3d".to_string());
        assert_eq!(
            location.segments(EXTERNAL_URL),
            vec!["metadata", "measure", "fridges", "fridge_0a1b2c3d", "external_url"]
        );
        assert_eq!(MetaLocation::Fab.segments("fabin"), vec!["metadata", "fab", "fabin"]);
    }
}
