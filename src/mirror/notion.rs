// Notion REST implementation of the page mirror

use async_trait::async_trait;
use reqwest::Method;
use serde_json::{json, Map, Value};
use std::time::Duration;
use tracing::{debug, info};

use super::naming::normalize_page_id;
use super::{CreatedPage, MirrorError, PageMirror, Properties, PropertyValue};
use crate::http::RateLimitedHttpClient;

pub const DEFAULT_API_BASE: &str = "https://api.notion.com/v1";
pub const DEFAULT_API_VERSION: &str = "2022-06-28";

#[derive(Debug, Clone)]
pub struct NotionSettings {
    pub api_base: String,
    pub api_version: String,
    pub token: String,
    pub requests_per_second: u32,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct NotionMirror {
    http: RateLimitedHttpClient,
}

fn rich_text(content: &str) -> Value {
    json!([{ "type": "text", "text": { "content": content } }])
}

/// Notion JSON for one property value
pub fn property_json(value: &PropertyValue) -> Value {
    match value {
        PropertyValue::Title(text) => json!({ "title": rich_text(text) }),
        PropertyValue::Text(text) => json!({ "rich_text": rich_text(text) }),
        PropertyValue::Select(name) if name.is_empty() => json!({ "select": null }),
        PropertyValue::Select(name) => json!({ "select": { "name": name } }),
        PropertyValue::MultiSelect(names) => {
            let options: Vec<Value> = names.iter().map(|name| json!({ "name": name })).collect();
            json!({ "multi_select": options })
        }
        PropertyValue::Number(number) => json!({ "number": number }),
        PropertyValue::Date { start: None, .. } => json!({ "date": null }),
        PropertyValue::Date { start, end } => json!({ "date": { "start": start, "end": end } }),
        PropertyValue::Relation(ids) => {
            let ids: Vec<Value> = ids.iter().map(|id| json!({ "id": id })).collect();
            json!({ "relation": ids })
        }
    }
}

pub fn properties_json(properties: &Properties) -> Value {
    let encoded: Map<String, Value> = properties
        .iter()
        .map(|(name, value)| (name.clone(), property_json(value)))
        .collect();
    Value::Object(encoded)
}

impl NotionMirror {
    pub fn new(settings: NotionSettings) -> Result<Self, MirrorError> {
        if settings.token.trim().is_empty() {
            return Err(MirrorError::Auth("no integration token configured".to_string()));
        }
        let http = RateLimitedHttpClient::new(
            &settings.api_base,
            &settings.token,
            &[("Notion-Version", settings.api_version.clone())],
            settings.requests_per_second,
            settings.timeout,
        )?;
        info!(api_base = %http.base_url(), "Notion mirror initialized");
        Ok(Self { http })
    }

    async fn patch_page(&self, page_id: &str, body: Value) -> Result<Value, MirrorError> {
        self.http
            .send_json(Method::PATCH, &format!("/pages/{page_id}"), Some(&body))
            .await
    }

    /// Names of every relation property on a page
    async fn relation_properties(&self, page_id: &str) -> Result<Vec<String>, MirrorError> {
        let page = self
            .http
            .send_json(Method::GET, &format!("/pages/{page_id}"), None)
            .await?;
        let properties = page
            .get("properties")
            .and_then(Value::as_object)
            .ok_or_else(|| MirrorError::InvalidResponse("page without properties".to_string()))?;
        Ok(properties
            .iter()
            .filter(|(_, property)| property.get("type").and_then(Value::as_str) == Some("relation"))
            .map(|(name, _)| name.clone())
            .collect())
    }
}

#[async_trait]
impl PageMirror for NotionMirror {
    async fn create_page(&self, database_id: &str, properties: &Properties) -> Result<CreatedPage, MirrorError> {
        let body = json!({
            "parent": { "database_id": database_id },
            "properties": properties_json(properties),
        });
        let page = self.http.send_json(Method::POST, "/pages", Some(&body)).await?;

        let page_id = page
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| MirrorError::InvalidResponse("created page has no id".to_string()))?;
        let url = page.get("url").and_then(Value::as_str).unwrap_or_default();
        info!(database_id, page_id, "Created mirror page");
        Ok(CreatedPage {
            url: url.to_string(),
            page_id: normalize_page_id(page_id),
        })
    }

    async fn update_properties(&self, page_id: &str, properties: &Properties) -> Result<(), MirrorError> {
        self.patch_page(page_id, json!({ "properties": properties_json(properties) }))
            .await?;
        Ok(())
    }

    async fn archive_page(&self, page_id: &str, clear_relations: bool) -> Result<(), MirrorError> {
        if clear_relations {
            let relations = self.relation_properties(page_id).await?;
            if !relations.is_empty() {
                let cleared: Map<String, Value> = relations
                    .iter()
                    .map(|name| (name.clone(), json!({ "relation": [] })))
                    .collect();
                debug!(page_id, count = relations.len(), "Clearing relations before archive");
                self.patch_page(page_id, json!({ "properties": cleared })).await?;
            }
        }
        self.patch_page(page_id, json!({ "archived": true })).await?;
        info!(page_id, "Archived mirror page");
        Ok(())
    }

    async fn update_date_range(
        &self,
        page_id: &str,
        property: &str,
        start: Option<&str>,
        end: Option<&str>,
    ) -> Result<(), MirrorError> {
        let mut properties = Properties::new();
        properties.insert(
            property.to_string(),
            PropertyValue::Date {
                start: start.map(str::to_string),
                end: end.map(str::to_string),
            },
        );
        self.update_properties(page_id, &properties).await
    }

    async fn set_relation(&self, page_id: &str, property: &str, related_ids: &[String]) -> Result<(), MirrorError> {
        let mut properties = Properties::new();
        properties.insert(property.to_string(), PropertyValue::Relation(related_ids.to_vec()));
        self.update_properties(page_id, &properties).await
    }
}
