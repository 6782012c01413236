// File-backed document store: one wire-format JSON file per document

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::debug;

use super::path::{set_path, FieldPath};
use super::value::{document_from_wire, document_to_wire, Document, FieldValue};
use super::{DocumentStore, StoreError};

#[derive(Debug)]
pub struct FileStore {
    dir: PathBuf,
    // serializes read-modify-write cycles within this process
    write_lock: Mutex<()>,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn document_path(&self, doc_id: &str) -> Result<PathBuf, StoreError> {
        let valid = !doc_id.is_empty()
            && doc_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
            && !doc_id.starts_with('.');
        if !valid {
            return Err(StoreError::InvalidPath(doc_id.to_string()));
        }
        Ok(self.dir.join(format!("{doc_id}.json")))
    }

    async fn read(&self, doc_id: &str) -> Result<Document, StoreError> {
        let path = self.document_path(doc_id)?;
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(doc_id.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        let body: serde_json::Value = serde_json::from_str(&raw)?;
        document_from_wire(&body)
    }

    async fn write(&self, doc_id: &str, document: &Document) -> Result<(), StoreError> {
        let path = self.document_path(doc_id)?;
        tokio::fs::create_dir_all(&self.dir).await?;

        let body = serde_json::to_string_pretty(&document_to_wire(document))?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, body).await?;
        tokio::fs::rename(&tmp, &path).await?;
        debug!(doc_id, path = %path.display(), "Wrote document");
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for FileStore {
    async fn get(&self, doc_id: &str) -> Result<Document, StoreError> {
        self.read(doc_id).await
    }

    async fn set(&self, doc_id: &str, fields: Document) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut document = match self.read(doc_id).await {
            Ok(document) => document,
            Err(StoreError::NotFound(_)) => Document::new(),
            Err(e) => return Err(e),
        };
        document.extend(fields);
        self.write(doc_id, &document).await
    }

    async fn update_field(&self, doc_id: &str, path: &FieldPath, value: FieldValue) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut document = self.read(doc_id).await?;
        set_path(&mut document, path, value);
        self.write(doc_id, &document).await
    }
}
