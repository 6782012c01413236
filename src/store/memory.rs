// In-memory document store for tests and dry runs - no side effects

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use super::path::{set_path, FieldPath};
use super::value::{Document, FieldValue};
use super::{DocumentStore, StoreError};

/// One write observed by the store
#[derive(Debug, Clone, PartialEq)]
pub enum StoreWrite {
    Set { doc_id: String, keys: Vec<String> },
    UpdateField { doc_id: String, path: String, value: FieldValue },
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    documents: Mutex<HashMap<String, Document>>,
    writes: Mutex<Vec<StoreWrite>>,
    fail_writes: AtomicBool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, doc_id: &str, document: Document) {
        lock(&self.documents).insert(doc_id.to_string(), document);
    }

    pub fn document(&self, doc_id: &str) -> Option<Document> {
        lock(&self.documents).get(doc_id).cloned()
    }

    pub fn writes(&self) -> Vec<StoreWrite> {
        lock(&self.writes).clone()
    }

    pub fn clear_writes(&self) {
        lock(&self.writes).clear();
    }

    /// Make every following write fail with `Unavailable`
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_writable(&self) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("writes disabled".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, doc_id: &str) -> Result<Document, StoreError> {
        self.document(doc_id)
            .ok_or_else(|| StoreError::NotFound(doc_id.to_string()))
    }

    async fn set(&self, doc_id: &str, fields: Document) -> Result<(), StoreError> {
        self.check_writable()?;
        let keys: Vec<String> = fields.keys().cloned().collect();
        {
            let mut documents = lock(&self.documents);
            let document = documents.entry(doc_id.to_string()).or_default();
            document.extend(fields);
        }
        lock(&self.writes).push(StoreWrite::Set {
            doc_id: doc_id.to_string(),
            keys,
        });
        Ok(())
    }

    async fn update_field(&self, doc_id: &str, path: &FieldPath, value: FieldValue) -> Result<(), StoreError> {
        self.check_writable()?;
        {
            let mut documents = lock(&self.documents);
            let document = documents
                .get_mut(doc_id)
                .ok_or_else(|| StoreError::NotFound(doc_id.to_string()))?;
            set_path(document, path, value.clone());
        }
        lock(&self.writes).push(StoreWrite::UpdateField {
            doc_id: doc_id.to_string(),
            path: path.to_string(),
            value,
        });
        Ok(())
    }
}
