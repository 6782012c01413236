// Load-time coercion of stored metadata
//
// Stored documents have gone through several shapes: design/fab as lists of
// {key, value} pairs, linkage stored as `notion`/`notion_page_id`, numbers
// where strings were expected, and ISO timestamps. Everything here coerces;
// nothing returns an error.

use serde_json::{Map, Value};
use tracing::warn;

use super::schema::{normalize_key, FieldKind, MetaScope};
use crate::model::{EntityMetaMap, MetaRecord, RunMetadata};
use crate::timestamp::normalize_timestamp;

const KNOWN_SECTIONS: &[&str] = &["design", "fab", "package", "measure"];

/// Render a stored scalar as the string the record holds
pub fn coerce_scalar(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(_) | Value::Object(_) => {
            warn!(value = %value, "Flattening nested value in metadata field");
            value.to_string()
        }
    }
}

fn insert_field(record: &mut MetaRecord, scope: MetaScope, raw_key: &str, value: &Value) {
    let key = normalize_key(raw_key);
    if key.is_empty() {
        return;
    }
    let mut text = coerce_scalar(value);
    if scope.kind_of(&key) == Some(FieldKind::Timestamp) {
        text = normalize_timestamp(&text);
    }
    // a legacy alias must not blank out a value already read under the new key
    if text.is_empty() && record.has_value(&key) {
        return;
    }
    record.set(&key, text);
}

/// Coerce one record from either the map shape or the legacy pair-list shape
pub fn coerce_record(raw: &Value, scope: MetaScope) -> MetaRecord {
    let mut record = MetaRecord::new();
    match raw {
        Value::Object(fields) => {
            for (key, value) in fields {
                insert_field(&mut record, scope, key, value);
            }
        }
        Value::Array(pairs) => {
            for pair in pairs {
                let key = pair.get("key").and_then(Value::as_str);
                match key {
                    Some(key) => {
                        let value = pair.get("value").unwrap_or(&Value::Null);
                        insert_field(&mut record, scope, key, value);
                    }
                    None => warn!(scope = scope.name(), "Skipping metadata pair without a key"),
                }
            }
        }
        Value::Null => {}
        other => warn!(scope = scope.name(), value = %other, "Ignoring non-map metadata section"),
    }
    record
}

fn coerce_entities(raw: Option<&Value>, container: &str, scope: MetaScope) -> EntityMetaMap {
    let mut entities = EntityMetaMap::new();
    let Some(section) = raw else {
        return entities;
    };

    match section.get(container) {
        Some(Value::Object(by_uid)) => {
            for (uid, record) in by_uid {
                entities.insert(uid.clone(), coerce_record(record, scope));
            }
        }
        Some(Value::Null) | None => {
            if !section.is_null() && !section.is_object() {
                // pre-entity documents kept a single pair list for the stage
                warn!(scope = scope.name(), "Dropping legacy stage-level metadata list");
            }
        }
        Some(other) => {
            warn!(scope = scope.name(), value = %other, "Ignoring malformed entity map");
        }
    }
    entities
}

/// Coerce the stored `metadata` field into typed records
pub fn coerce_metadata(raw: Option<&Value>) -> RunMetadata {
    let empty = Map::new();
    let sections = match raw {
        Some(Value::Object(sections)) => sections,
        Some(Value::Null) | None => &empty,
        Some(other) => {
            warn!(value = %other, "Run metadata is not a map, starting empty");
            &empty
        }
    };

    let mut extra = std::collections::BTreeMap::new();
    for (name, value) in sections {
        if !KNOWN_SECTIONS.contains(&name.as_str()) {
            extra.insert(name.clone(), value.clone());
        }
    }

    RunMetadata {
        design: sections
            .get("design")
            .map(|raw| coerce_record(raw, MetaScope::Design))
            .unwrap_or_default(),
        fab: sections
            .get("fab")
            .map(|raw| coerce_record(raw, MetaScope::Fab))
            .unwrap_or_default(),
        chips: coerce_entities(sections.get("package"), "chips", MetaScope::Chip),
        fridges: coerce_entities(sections.get("measure"), "fridges", MetaScope::Fridge),
        extra,
    }
}
