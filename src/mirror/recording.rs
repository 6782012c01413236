// Recording mirror for dry runs and tests - no side effects

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use super::naming::{normalize_page_id, page_url, DEFAULT_PAGE_URL_PREFIX};
use super::{CreatedPage, MirrorError, PageMirror, Properties};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MirrorOp {
    Create,
    UpdateProperties,
    Archive,
    DateRange,
    Relation,
}

/// One call as received by the mirror
#[derive(Debug, Clone, PartialEq)]
pub enum MirrorCall {
    CreatePage {
        database_id: String,
        properties: Properties,
    },
    UpdateProperties {
        page_id: String,
        properties: Properties,
    },
    ArchivePage {
        page_id: String,
        clear_relations: bool,
    },
    UpdateDateRange {
        page_id: String,
        property: String,
        start: Option<String>,
        end: Option<String>,
    },
    SetRelation {
        page_id: String,
        property: String,
        related_ids: Vec<String>,
    },
}

impl MirrorCall {
    pub fn op(&self) -> MirrorOp {
        match self {
            MirrorCall::CreatePage { .. } => MirrorOp::Create,
            MirrorCall::UpdateProperties { .. } => MirrorOp::UpdateProperties,
            MirrorCall::ArchivePage { .. } => MirrorOp::Archive,
            MirrorCall::UpdateDateRange { .. } => MirrorOp::DateRange,
            MirrorCall::SetRelation { .. } => MirrorOp::Relation,
        }
    }
}

/// Records every call and answers with deterministic page ids.
/// Individual operations can be made to fail.
#[derive(Debug)]
pub struct RecordingMirror {
    calls: Mutex<Vec<MirrorCall>>,
    failing: Mutex<HashSet<MirrorOp>>,
    next_page: AtomicU64,
    url_prefix: String,
}

impl Default for RecordingMirror {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl RecordingMirror {
    pub fn new() -> Self {
        Self::with_url_prefix(DEFAULT_PAGE_URL_PREFIX)
    }

    pub fn with_url_prefix(prefix: &str) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            failing: Mutex::new(HashSet::new()),
            next_page: AtomicU64::new(1),
            url_prefix: prefix.to_string(),
        }
    }

    pub fn calls(&self) -> Vec<MirrorCall> {
        lock(&self.calls).clone()
    }

    pub fn calls_of(&self, op: MirrorOp) -> Vec<MirrorCall> {
        self.calls().into_iter().filter(|call| call.op() == op).collect()
    }

    pub fn clear_calls(&self) {
        lock(&self.calls).clear();
    }

    pub fn fail(&self, op: MirrorOp) {
        lock(&self.failing).insert(op);
    }

    pub fn recover(&self, op: MirrorOp) {
        lock(&self.failing).remove(&op);
    }

    fn record(&self, call: MirrorCall) -> Result<(), MirrorError> {
        let op = call.op();
        lock(&self.calls).push(call);
        if lock(&self.failing).contains(&op) {
            return Err(MirrorError::Api {
                status: 503,
                message: format!("{op:?} unavailable"),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl PageMirror for RecordingMirror {
    async fn create_page(&self, database_id: &str, properties: &Properties) -> Result<CreatedPage, MirrorError> {
        self.record(MirrorCall::CreatePage {
            database_id: database_id.to_string(),
            properties: properties.clone(),
        })?;
        let n = self.next_page.fetch_add(1, Ordering::SeqCst);
        let page_id = normalize_page_id(&format!("{n:032x}"));
        Ok(CreatedPage {
            url: page_url(&self.url_prefix, &page_id),
            page_id,
        })
    }

    async fn update_properties(&self, page_id: &str, properties: &Properties) -> Result<(), MirrorError> {
        self.record(MirrorCall::UpdateProperties {
            page_id: page_id.to_string(),
            properties: properties.clone(),
        })
    }

    async fn archive_page(&self, page_id: &str, clear_relations: bool) -> Result<(), MirrorError> {
        self.record(MirrorCall::ArchivePage {
            page_id: page_id.to_string(),
            clear_relations,
        })
    }

    async fn update_date_range(
        &self,
        page_id: &str,
        property: &str,
        start: Option<&str>,
        end: Option<&str>,
    ) -> Result<(), MirrorError> {
        self.record(MirrorCall::UpdateDateRange {
            page_id: page_id.to_string(),
            property: property.to_string(),
            start: start.map(str::to_string),
            end: end.map(str::to_string),
        })
    }

    async fn set_relation(&self, page_id: &str, property: &str, related_ids: &[String]) -> Result<(), MirrorError> {
        self.record(MirrorCall::SetRelation {
            page_id: page_id.to_string(),
            property: property.to_string(),
            related_ids: related_ids.to_vec(),
        })
    }
}
