// Run <-> stored document mapping

use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::warn;

use super::value::{Document, FieldValue};
use super::StoreError;
use crate::metadata::coerce_metadata;
use crate::model::{EntityMetaMap, Layer, MetaRecord, Run, RunClass, RunKey, RunMetadata};

pub const RUN_NO: &str = "run_no";
pub const RUN_CLASS: &str = "run_class";
pub const DEVICE_NAME: &str = "device_name";
pub const CREATOR: &str = "creator";
pub const CREATED_DATE: &str = "created_date";
/// The flow is stored under `steps` for compatibility with existing documents
pub const FLOW: &str = "steps";
pub const METADATA: &str = "metadata";

fn record_json(record: &MetaRecord) -> Value {
    Value::Object(
        record
            .iter()
            .map(|(key, value)| (key.to_string(), Value::String(value.to_string())))
            .collect(),
    )
}

fn entities_json(entities: &EntityMetaMap) -> Value {
    Value::Object(
        entities
            .iter()
            .map(|(uid, record)| (uid.clone(), record_json(record)))
            .collect(),
    )
}

pub fn metadata_json(metadata: &RunMetadata) -> Value {
    let mut sections: Map<String, Value> = metadata
        .extra
        .iter()
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect();
    sections.insert("design".to_string(), record_json(&metadata.design));
    sections.insert("fab".to_string(), record_json(&metadata.fab));

    let mut package = Map::new();
    package.insert("chips".to_string(), entities_json(&metadata.chips));
    sections.insert("package".to_string(), Value::Object(package));

    let mut measure = Map::new();
    measure.insert("fridges".to_string(), entities_json(&metadata.fridges));
    sections.insert("measure".to_string(), Value::Object(measure));

    Value::Object(sections)
}

/// Every top-level field of a run document
pub fn encode_run(run: &Run) -> Result<Document, StoreError> {
    let mut document = BTreeMap::new();
    document.insert(RUN_NO.to_string(), FieldValue::from(run.key.run_no.as_str()));
    document.insert(RUN_CLASS.to_string(), FieldValue::from(run.key.class.as_str()));
    document.insert(DEVICE_NAME.to_string(), FieldValue::from(run.device_name.as_str()));
    document.insert(CREATOR.to_string(), FieldValue::from(run.creator.as_str()));
    document.insert(CREATED_DATE.to_string(), FieldValue::from(run.created_date.as_str()));
    document.insert(FLOW.to_string(), FieldValue::from_json(&serde_json::to_value(&run.layers)?));
    document.insert(METADATA.to_string(), FieldValue::from_json(&metadata_json(&run.metadata)));
    Ok(document)
}

fn text_field(document: &Document, key: &str) -> String {
    match document.get(key) {
        Some(FieldValue::String(s)) | Some(FieldValue::Timestamp(s)) => s.clone(),
        Some(FieldValue::Integer(i)) => i.to_string(),
        Some(FieldValue::Double(d)) => d.to_string(),
        Some(FieldValue::Null) | None => String::new(),
        Some(other) => {
            warn!(field = key, value = ?other, "Unexpected shape for text field");
            String::new()
        }
    }
}

/// Decode a stored run. Metadata is coerced leniently; a flow that cannot be
/// read at all is a decode error.
pub fn decode_run(doc_id: &str, document: &Document) -> Result<Run, StoreError> {
    let class = match document.get(RUN_CLASS) {
        Some(value) => RunClass::from(value.as_str().unwrap_or_default().to_string()),
        // documents keyed by run number alone predate classes
        None => RunClass::Main,
    };
    let mut run_no = text_field(document, RUN_NO);
    if run_no.is_empty() {
        run_no = doc_id.rsplit('-').next().unwrap_or(doc_id).to_string();
    }

    let layers: Vec<Layer> = match document.get(FLOW) {
        Some(flow) => serde_json::from_value(flow.to_json())
            .map_err(|e| StoreError::Decode(format!("run '{doc_id}' flow: {e}")))?,
        None => Vec::new(),
    };

    let metadata_raw = document.get(METADATA).map(FieldValue::to_json);

    Ok(Run {
        key: RunKey::new(class, run_no),
        device_name: text_field(document, DEVICE_NAME),
        created_date: text_field(document, CREATED_DATE),
        creator: text_field(document, CREATOR),
        layers,
        metadata: coerce_metadata(metadata_raw.as_ref()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{StepStatus, EXTERNAL_PAGE_ID};
    use crate::registry::default_flow;
    use serde_json::json;

    fn sample_run() -> Run {
        let mut run = Run::new(RunKey::new(RunClass::Test, "014"), "Res-B", "kim", "2026-01-02")
            .with_layers(default_flow());
        run.metadata.fab.set("lot_id", "L-14");
        let mut fridge = MetaRecord::new();
        fridge.set("cooldown_start", "2026-02-02 08:00:00");
        fridge.set(EXTERNAL_PAGE_ID, "0123");
        run.metadata.fridges.insert("fridge_default_bluefors".to_string(), fridge);
        run.metadata
            .extra
            .insert("viewer".to_string(), json!({"pinned": true}));
        run
    }

    #[test]
    fn test_encoded_layout() {
        let document = encode_run(&sample_run()).unwrap();
        assert_eq!(document[RUN_CLASS], FieldValue::from("Test"));
        let metadata = document[METADATA].to_json();
        assert_eq!(
            metadata["measure"]["fridges"]["fridge_default_bluefors"]["cooldown_start"],
            "2026-02-02 08:00:00"
        );
        assert_eq!(metadata["package"]["chips"], json!({}));
        assert_eq!(metadata["viewer"], json!({"pinned": true}));
        assert_eq!(document[FLOW].to_json()[2]["layer_name"], "Package");
    }

    #[test]
    fn test_decode_reads_back_encoded_run() {
        let run = sample_run();
        let decoded = decode_run("test-014", &encode_run(&run).unwrap()).unwrap();
        assert_eq!(decoded, run);
    }

    #[test]
    fn test_decode_legacy_document() {
        let mut document = Document::new();
        document.insert(RUN_NO.to_string(), FieldValue::Integer(7));
        document.insert(
            FLOW.to_string(),
            FieldValue::from_json(&json!([{
                "layer_name": "Fabrication",
                "substeps": [{"name": "Fab", "chips": [{"name": "Trench", "status": "done"}]}]
            }])),
        );
        document.insert(
            METADATA.to_string(),
            FieldValue::from_json(&json!({"fab": [{"key": "Lotid", "value": "L-7"}]})),
        );

        let run = decode_run("7", &document).unwrap();
        assert_eq!(run.key.class, RunClass::Main);
        assert_eq!(run.key.run_no, "7");
        assert_eq!(run.layers[0].substeps[0].steps[0].status, StepStatus::Done);
        assert_eq!(run.metadata.fab.get("lot_id"), "L-7");
    }

    #[test]
    fn test_unreadable_flow_is_an_error() {
        let mut document = Document::new();
        document.insert(FLOW.to_string(), FieldValue::from("not a list"));
        assert!(matches!(decode_run("main-1", &document), Err(StoreError::Decode(_))));
    }
}
