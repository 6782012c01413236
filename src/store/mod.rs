// Persistence gateway
//
// Document-store contract shared by the Firestore REST client, the file
// backend and the in-memory store. Failures surface to the caller as-is; no
// layer here retries.

use async_trait::async_trait;
use thiserror::Error;

pub mod codec;
pub mod file;
pub mod firestore;
pub mod memory;
pub mod path;
pub mod value;

pub use codec::{decode_run, encode_run};
pub use file::FileStore;
pub use firestore::{FirestoreSettings, FirestoreStore};
pub use memory::{MemoryStore, StoreWrite};
pub use path::{get_path, set_path, FieldPath};
pub use value::{Document, FieldValue};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("document '{0}' not found")]
    NotFound(String),
    #[error("invalid field path '{0}'")]
    InvalidPath(String),
    #[error("could not decode document: {0}")]
    Decode(String),
    #[error("store request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("store returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}

/// Document-store operations on one collection
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fetch every top-level field of a document
    async fn get(&self, doc_id: &str) -> Result<Document, StoreError>;

    /// Overwrite the supplied top-level fields; other top-level fields are
    /// left alone. Creates the document if needed.
    async fn set(&self, doc_id: &str, fields: Document) -> Result<(), StoreError>;

    /// Deep-merge write of one value at `path`, leaving sibling subtrees intact
    async fn update_field(&self, doc_id: &str, path: &FieldPath, value: FieldValue) -> Result<(), StoreError>;
}
