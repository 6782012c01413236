// Typed document values and their tagged wire encoding

use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

use super::StoreError;

/// Top-level fields of a stored document
pub type Document = BTreeMap<String, FieldValue>;

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Integer(i64),
    Double(f64),
    String(String),
    /// RFC 3339 timestamp as stored by the backend
    Timestamp(String),
    Array(Vec<FieldValue>),
    Map(BTreeMap<String, FieldValue>),
}

impl FieldValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::String(s) | FieldValue::Timestamp(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, FieldValue>> {
        match self {
            FieldValue::Map(fields) => Some(fields),
            _ => None,
        }
    }

    /// Encode with explicit type tags (`stringValue`, `mapValue`, ...)
    pub fn to_wire(&self) -> Value {
        match self {
            FieldValue::Null => json!({ "nullValue": null }),
            FieldValue::Bool(b) => json!({ "booleanValue": b }),
            // integers travel as strings to keep 64-bit precision
            FieldValue::Integer(i) => json!({ "integerValue": i.to_string() }),
            FieldValue::Double(d) => json!({ "doubleValue": d }),
            FieldValue::String(s) => json!({ "stringValue": s }),
            FieldValue::Timestamp(s) => json!({ "timestampValue": s }),
            FieldValue::Array(values) => {
                let values: Vec<Value> = values.iter().map(FieldValue::to_wire).collect();
                json!({ "arrayValue": { "values": values } })
            }
            FieldValue::Map(fields) => json!({ "mapValue": { "fields": fields_to_wire(fields) } }),
        }
    }

    pub fn from_wire(value: &Value) -> Result<Self, StoreError> {
        let tagged = value
            .as_object()
            .ok_or_else(|| StoreError::Decode(format!("expected tagged value, got {value}")))?;
        let (tag, inner) = tagged
            .iter()
            .next()
            .ok_or_else(|| StoreError::Decode("empty tagged value".to_string()))?;

        match tag.as_str() {
            "nullValue" => Ok(FieldValue::Null),
            "booleanValue" => inner
                .as_bool()
                .map(FieldValue::Bool)
                .ok_or_else(|| StoreError::Decode(format!("bad booleanValue {inner}"))),
            "integerValue" => {
                let parsed = match inner {
                    Value::String(s) => s.parse::<i64>().ok(),
                    Value::Number(n) => n.as_i64(),
                    _ => None,
                };
                parsed
                    .map(FieldValue::Integer)
                    .ok_or_else(|| StoreError::Decode(format!("bad integerValue {inner}")))
            }
            "doubleValue" => {
                let parsed = match inner {
                    Value::Number(n) => n.as_f64(),
                    Value::String(s) => s.parse::<f64>().ok(),
                    _ => None,
                };
                parsed
                    .map(FieldValue::Double)
                    .ok_or_else(|| StoreError::Decode(format!("bad doubleValue {inner}")))
            }
            "stringValue" => inner
                .as_str()
                .map(|s| FieldValue::String(s.to_string()))
                .ok_or_else(|| StoreError::Decode(format!("bad stringValue {inner}"))),
            "timestampValue" => inner
                .as_str()
                .map(|s| FieldValue::Timestamp(s.to_string()))
                .ok_or_else(|| StoreError::Decode(format!("bad timestampValue {inner}"))),
            "arrayValue" => {
                let values = match inner.get("values") {
                    Some(Value::Array(values)) => values
                        .iter()
                        .map(FieldValue::from_wire)
                        .collect::<Result<Vec<_>, _>>()?,
                    // an empty array is sent as `{}`
                    _ => Vec::new(),
                };
                Ok(FieldValue::Array(values))
            }
            "mapValue" => {
                let fields = match inner.get("fields") {
                    Some(fields) => fields_from_wire(fields)?,
                    None => BTreeMap::new(),
                };
                Ok(FieldValue::Map(fields))
            }
            other => Err(StoreError::Decode(format!("unknown value tag '{other}'"))),
        }
    }

    /// Plain JSON view, used to hand documents to serde models
    pub fn to_json(&self) -> Value {
        match self {
            FieldValue::Null => Value::Null,
            FieldValue::Bool(b) => Value::Bool(*b),
            FieldValue::Integer(i) => Value::from(*i),
            FieldValue::Double(d) => Value::from(*d),
            FieldValue::String(s) | FieldValue::Timestamp(s) => Value::String(s.clone()),
            FieldValue::Array(values) => Value::Array(values.iter().map(FieldValue::to_json).collect()),
            FieldValue::Map(fields) => Value::Object(
                fields
                    .iter()
                    .map(|(key, value)| (key.clone(), value.to_json()))
                    .collect(),
            ),
        }
    }

    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => FieldValue::Null,
            Value::Bool(b) => FieldValue::Bool(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => FieldValue::Integer(i),
                None => FieldValue::Double(n.as_f64().unwrap_or_default()),
            },
            Value::String(s) => FieldValue::String(s.clone()),
            Value::Array(values) => FieldValue::Array(values.iter().map(FieldValue::from_json).collect()),
            Value::Object(fields) => FieldValue::Map(
                fields
                    .iter()
                    .map(|(key, value)| (key.clone(), FieldValue::from_json(value)))
                    .collect(),
            ),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::String(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::String(value)
    }
}

pub fn fields_to_wire(fields: &BTreeMap<String, FieldValue>) -> Value {
    let encoded: Map<String, Value> = fields
        .iter()
        .map(|(key, value)| (key.clone(), value.to_wire()))
        .collect();
    Value::Object(encoded)
}

pub fn fields_from_wire(fields: &Value) -> Result<BTreeMap<String, FieldValue>, StoreError> {
    let fields = fields
        .as_object()
        .ok_or_else(|| StoreError::Decode(format!("expected field map, got {fields}")))?;
    fields
        .iter()
        .map(|(key, value)| FieldValue::from_wire(value).map(|decoded| (key.clone(), decoded)))
        .collect()
}

/// Decode a `{"fields": {...}}` document body
pub fn document_from_wire(body: &Value) -> Result<Document, StoreError> {
    match body.get("fields") {
        Some(fields) => fields_from_wire(fields),
        None => Ok(Document::new()),
    }
}

pub fn document_to_wire(document: &Document) -> Value {
    json!({ "fields": fields_to_wire(document) })
}
