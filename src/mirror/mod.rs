// Page mirror: the external system of record that follows run state

use async_trait::async_trait;
use std::collections::BTreeMap;

pub mod errors;
pub mod naming;
pub mod notion;
pub mod recording;

pub use errors::MirrorError;
pub use naming::{
    extract_notion_id, normalize_page_id, page_url, relation_property, FridgeSystem, DEFAULT_PAGE_URL_PREFIX,
};
pub use notion::{NotionMirror, NotionSettings};
pub use recording::{MirrorCall, MirrorOp, RecordingMirror};

/// Typed page property values
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Title(String),
    Text(String),
    Select(String),
    MultiSelect(Vec<String>),
    Number(Option<f64>),
    Date { start: Option<String>, end: Option<String> },
    Relation(Vec<String>),
}

pub type Properties = BTreeMap<String, PropertyValue>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedPage {
    pub url: String,
    pub page_id: String,
}

/// Operations the sync engine issues against the mirror
#[async_trait]
pub trait PageMirror: Send + Sync {
    /// Create a page in the database `database_id`
    async fn create_page(&self, database_id: &str, properties: &Properties) -> Result<CreatedPage, MirrorError>;

    async fn update_properties(&self, page_id: &str, properties: &Properties) -> Result<(), MirrorError>;

    /// Archive a page, optionally emptying its relation properties first
    async fn archive_page(&self, page_id: &str, clear_relations: bool) -> Result<(), MirrorError>;

    /// Set a date property; a missing start clears it
    async fn update_date_range(
        &self,
        page_id: &str,
        property: &str,
        start: Option<&str>,
        end: Option<&str>,
    ) -> Result<(), MirrorError>;

    async fn set_relation(&self, page_id: &str, property: &str, related_ids: &[String]) -> Result<(), MirrorError>;
}
