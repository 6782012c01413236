// Linkage consistency repair

use tracing::info;

use crate::mirror::page_url;
use crate::model::{MetaLocation, Run, RunMetadata, EXTERNAL_URL};
use crate::store::{DocumentStore, FieldPath, FieldValue, StoreError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Repair {
    /// Page id without url: url rebuilt from the prefix and the id
    RebuiltUrl { location: MetaLocation, url: String },
    /// Url without page id: the url cannot be trusted
    ClearedUrl { location: MetaLocation },
}

impl Repair {
    pub fn location(&self) -> &MetaLocation {
        match self {
            Repair::RebuiltUrl { location, .. } | Repair::ClearedUrl { location } => location,
        }
    }

    fn url(&self) -> &str {
        match self {
            Repair::RebuiltUrl { url, .. } => url,
            Repair::ClearedUrl { .. } => "",
        }
    }
}

pub fn plan_repairs(metadata: &RunMetadata, url_prefix: &str) -> Vec<Repair> {
    let mut repairs = Vec::new();
    for location in metadata.locations() {
        let Some(record) = metadata.record(&location) else { continue };
        let page_id = record.page_id().trim();
        let url = record.page_url().trim();
        match (page_id.is_empty(), url.is_empty()) {
            (false, true) => repairs.push(Repair::RebuiltUrl {
                url: page_url(url_prefix, page_id),
                location,
            }),
            (true, false) => repairs.push(Repair::ClearedUrl { location }),
            _ => {}
        }
    }
    repairs
}

/// Fix half-written linkage pairs in `run` and persist each fix
pub async fn apply_repairs(
    store: &dyn DocumentStore,
    doc_id: &str,
    run: &mut Run,
    url_prefix: &str,
) -> Result<Vec<Repair>, StoreError> {
    let repairs = plan_repairs(&run.metadata, url_prefix);
    for repair in &repairs {
        let location = repair.location();
        let path = FieldPath::from_segments(location.segments(EXTERNAL_URL))?;
        store
            .update_field(doc_id, &path, FieldValue::String(repair.url().to_string()))
            .await?;
        if let Some(record) = run.metadata.record_mut(location) {
            record.set(EXTERNAL_URL, repair.url());
        }
        info!(doc_id, path = %path, repaired = ?repair, "Repaired page linkage");
    }
    Ok(repairs)
}
