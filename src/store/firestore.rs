// Firestore REST document store

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info};

use super::path::FieldPath;
use super::value::{document_from_wire, fields_to_wire, Document, FieldValue};
use super::{DocumentStore, StoreError};

#[derive(Debug, Clone)]
pub struct FirestoreSettings {
    /// e.g. `https://firestore.googleapis.com/v1`
    pub api_base: String,
    pub project_id: String,
    pub collection: String,
    pub id_token: Option<String>,
    pub timeout: Duration,
}

#[derive(Debug)]
pub struct FirestoreStore {
    client: Client,
    settings: FirestoreSettings,
}

impl FirestoreStore {
    pub fn new(settings: FirestoreSettings) -> Result<Self, StoreError> {
        let client = Client::builder().timeout(settings.timeout).build()?;
        info!(
            project = %settings.project_id,
            collection = %settings.collection,
            "Firestore store initialized"
        );
        Ok(Self { client, settings })
    }

    pub fn document_url(&self, doc_id: &str) -> String {
        format!(
            "{}/projects/{}/databases/(default)/documents/{}/{}",
            self.settings.api_base.trim_end_matches('/'),
            self.settings.project_id,
            self.settings.collection,
            doc_id
        )
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.settings.id_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn check(response: Response, doc_id: &str) -> Result<Response, StoreError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::NOT_FOUND {
            return Err(StoreError::NotFound(doc_id.to_string()));
        }
        let body = response.text().await.unwrap_or_default();
        Err(StoreError::Status {
            status: status.as_u16(),
            body,
        })
    }

    async fn patch(
        &self,
        doc_id: &str,
        mask: &[String],
        fields: serde_json::Value,
        must_exist: bool,
    ) -> Result<(), StoreError> {
        let mut query: Vec<(&str, String)> = mask
            .iter()
            .map(|path| ("updateMask.fieldPaths", path.clone()))
            .collect();
        if must_exist {
            query.push(("currentDocument.exists", "true".to_string()));
        }

        let request = self
            .client
            .patch(self.document_url(doc_id))
            .query(&query)
            .json(&json!({ "fields": fields }));
        let response = self.authorized(request).send().await?;
        Self::check(response, doc_id).await?;
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for FirestoreStore {
    async fn get(&self, doc_id: &str) -> Result<Document, StoreError> {
        debug!(doc_id, "Fetching document");
        let request = self.client.get(self.document_url(doc_id));
        let response = self.authorized(request).send().await?;
        let response = Self::check(response, doc_id).await?;
        let body: serde_json::Value = response.json().await?;
        document_from_wire(&body)
    }

    async fn set(&self, doc_id: &str, fields: Document) -> Result<(), StoreError> {
        let mask: Vec<String> = fields
            .keys()
            .map(|key| FieldPath::from_segments([key.as_str()]).map(|path| path.to_string()))
            .collect::<Result<_, _>>()?;
        debug!(doc_id, fields = mask.len(), "Writing document fields");
        self.patch(doc_id, &mask, fields_to_wire(&fields), false).await
    }

    async fn update_field(&self, doc_id: &str, path: &FieldPath, value: FieldValue) -> Result<(), StoreError> {
        debug!(doc_id, path = %path, "Updating document field");
        let mut top = Document::new();
        top.insert(path.root().to_string(), path.nest_value(value));
        self.patch(doc_id, &[path.to_string()], fields_to_wire(&top), true)
            .await
    }
}
