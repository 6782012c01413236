//! End-to-end save and mirror sync scenarios against the in-memory store
//! and the recording mirror.

use std::sync::Arc;

use fab_tracker::metadata::MetaScope;
use fab_tracker::mirror::{MirrorCall, MirrorOp, PropertyValue, RecordingMirror};
use fab_tracker::model::{Layer, Run, RunClass, RunKey, StepStatus, Substep};
use fab_tracker::registry::{default_flow, EntityKind};
use fab_tracker::store::{encode_run, get_path, DocumentStore, FieldPath, FieldValue, MemoryStore};
use fab_tracker::sync::{DatabaseTargets, Repair, Subject, SyncEngine, SyncSettings};
use fab_tracker::{RunSession, TrackerError};

const BLUEFORS: &str = "fridge_default_bluefors";
const BF_PAGE_ID: &str = "metadata.measure.fridges.fridge_default_bluefors.external_page_id";
const BF_URL: &str = "metadata.measure.fridges.fridge_default_bluefors.external_url";
const FIRST_PAGE: &str = "00000000-0000-0000-0000-000000000001";
const SECOND_PAGE: &str = "00000000-0000-0000-0000-000000000002";

fn key() -> RunKey {
    RunKey::new(RunClass::Main, "007")
}

fn new_run() -> Run {
    Run::new(key(), "Res-A", "kim", "2026-01-01").with_layers(default_flow())
}

fn engine(mirror: &Arc<RecordingMirror>) -> SyncEngine {
    SyncEngine::new(
        mirror.clone(),
        SyncSettings {
            databases: DatabaseTargets {
                fab: Some("db-fab".to_string()),
                bluefors: Some("db-bf".to_string()),
                iceoxford: Some("db-io".to_string()),
            },
            ..SyncSettings::default()
        },
    )
}

fn stored(store: &MemoryStore, path: &str) -> Option<String> {
    let document = store.document("main-007")?;
    let path = FieldPath::parse(path).unwrap();
    get_path(&document, &path).and_then(FieldValue::as_str).map(str::to_string)
}

/// Save a fresh run, then start a cooldown on the Bluefors fridge and save again
async fn run_with_bluefors_page(store: &MemoryStore, engine: &SyncEngine) -> RunSession {
    let mut session = RunSession::create(new_run());
    session.save(store, Some(engine)).await.unwrap();
    session
        .set_step_status_at("Measurement", "Bluefors", "Cooldown", StepStatus::InProgress, "2026-02-02 08:00:00")
        .unwrap();
    session.save(store, Some(engine)).await.unwrap();
    session
}

#[tokio::test]
async fn test_cooldown_start_creates_fridge_page() {
    let store = MemoryStore::new();
    let mirror = Arc::new(RecordingMirror::new());
    let engine = engine(&mirror);

    let session = run_with_bluefors_page(&store, &engine).await;

    assert_eq!(
        mirror.calls_of(MirrorOp::Create),
        vec![MirrorCall::CreatePage {
            database_id: "db-bf".to_string(),
            properties: [("Name".to_string(), PropertyValue::Title("BF260202".to_string()))].into(),
        }]
    );
    assert_eq!(
        mirror.calls_of(MirrorOp::DateRange),
        vec![MirrorCall::UpdateDateRange {
            page_id: FIRST_PAGE.to_string(),
            property: "Cooldown dates".to_string(),
            start: Some("2026-02-02".to_string()),
            end: None,
        }]
    );
    // no fab page exists, so there is nothing to relate to
    assert!(mirror.calls_of(MirrorOp::Relation).is_empty());

    assert_eq!(stored(&store, BF_PAGE_ID).as_deref(), Some(FIRST_PAGE));
    assert_eq!(
        stored(&store, BF_URL).as_deref(),
        Some("https://www.notion.so/00000000000000000000000000000001")
    );
    assert_eq!(session.run().metadata.fridges[BLUEFORS].page_id(), FIRST_PAGE);
    assert_eq!(session.metrics().get_stats().pages_created, 1);
}

#[tokio::test]
async fn test_repeated_save_issues_no_second_create() {
    let store = MemoryStore::new();
    let mirror = Arc::new(RecordingMirror::new());
    let engine = engine(&mirror);
    let mut session = run_with_bluefors_page(&store, &engine).await;
    mirror.clear_calls();

    let report = session.save(&store, Some(&engine)).await.unwrap();

    assert!(mirror.calls().is_empty());
    assert!(report.sync.unwrap().created.is_empty());

    let mut reloaded = RunSession::load(&store, &key()).await.unwrap();
    reloaded.save(&store, Some(&engine)).await.unwrap();
    assert!(mirror.calls_of(MirrorOp::Create).is_empty());
}

#[tokio::test]
async fn test_changed_cooldown_date_renames_page() {
    let store = MemoryStore::new();
    let mirror = Arc::new(RecordingMirror::new());
    let engine = engine(&mirror);
    run_with_bluefors_page(&store, &engine).await;
    mirror.clear_calls();

    let mut session = RunSession::load(&store, &key()).await.unwrap();
    session
        .set_entity_field(EntityKind::Fridge, BLUEFORS, "cooldown_start", "2026-02-03 09:00:00")
        .unwrap();
    let report = session.save(&store, Some(&engine)).await.unwrap();

    assert_eq!(
        report.sync.unwrap().renamed,
        vec![Subject::Fridge(BLUEFORS.to_string())]
    );
    assert_eq!(
        mirror.calls(),
        vec![
            MirrorCall::UpdateProperties {
                page_id: FIRST_PAGE.to_string(),
                properties: [("Name".to_string(), PropertyValue::Title("BF260203".to_string()))].into(),
            },
            MirrorCall::UpdateDateRange {
                page_id: FIRST_PAGE.to_string(),
                property: "Cooldown dates".to_string(),
                start: Some("2026-02-03".to_string()),
                end: None,
            },
        ]
    );
    assert_eq!(stored(&store, BF_PAGE_ID).as_deref(), Some(FIRST_PAGE));
}

#[tokio::test]
async fn test_warmup_and_measure_dates_update_existing_page() {
    let store = MemoryStore::new();
    let mirror = Arc::new(RecordingMirror::new());
    let engine = engine(&mirror);
    run_with_bluefors_page(&store, &engine).await;
    mirror.clear_calls();

    let mut session = RunSession::load(&store, &key()).await.unwrap();
    session
        .set_entity_field(EntityKind::Fridge, BLUEFORS, "warmup_start", "2026-02-09 10:00:00")
        .unwrap();
    session.save(&store, Some(&engine)).await.unwrap();

    // warmup_start closes the cooldown range and opens the warmup range
    assert_eq!(
        mirror.calls(),
        vec![
            MirrorCall::UpdateDateRange {
                page_id: FIRST_PAGE.to_string(),
                property: "Cooldown dates".to_string(),
                start: Some("2026-02-02".to_string()),
                end: Some("2026-02-09".to_string()),
            },
            MirrorCall::UpdateDateRange {
                page_id: FIRST_PAGE.to_string(),
                property: "Warmup dates".to_string(),
                start: Some("2026-02-09".to_string()),
                end: None,
            },
        ]
    );

    mirror.clear_calls();
    session.save(&store, Some(&engine)).await.unwrap();
    RunSession::load(&store, &key())
        .await
        .unwrap()
        .save(&store, Some(&engine))
        .await
        .unwrap();
    assert!(mirror.calls().is_empty());

    session
        .set_entity_field(EntityKind::Fridge, BLUEFORS, "measure_start", "2026-02-04 12:00:00")
        .unwrap();
    session.save(&store, Some(&engine)).await.unwrap();
    assert_eq!(
        mirror.calls(),
        vec![MirrorCall::UpdateDateRange {
            page_id: FIRST_PAGE.to_string(),
            property: "Measure dates".to_string(),
            start: Some("2026-02-04".to_string()),
            end: None,
        }]
    );
}

#[tokio::test]
async fn test_new_page_receives_every_started_range() {
    let store = MemoryStore::new();
    let mirror = Arc::new(RecordingMirror::new());
    let engine = engine(&mirror);

    let mut session = RunSession::create(new_run());
    session
        .set_entity_field(EntityKind::Fridge, BLUEFORS, "cooldown_start", "2026-02-02 08:00:00")
        .unwrap();
    session
        .set_entity_field(EntityKind::Fridge, BLUEFORS, "warmup_start", "2026-02-09 10:00:00")
        .unwrap();
    session.save(&store, Some(&engine)).await.unwrap();

    assert_eq!(
        mirror.calls(),
        vec![
            MirrorCall::CreatePage {
                database_id: "db-bf".to_string(),
                properties: [("Name".to_string(), PropertyValue::Title("BF260202".to_string()))].into(),
            },
            MirrorCall::UpdateDateRange {
                page_id: FIRST_PAGE.to_string(),
                property: "Cooldown dates".to_string(),
                start: Some("2026-02-02".to_string()),
                end: Some("2026-02-09".to_string()),
            },
            MirrorCall::UpdateDateRange {
                page_id: FIRST_PAGE.to_string(),
                property: "Warmup dates".to_string(),
                start: Some("2026-02-09".to_string()),
                end: None,
            },
        ]
    );

    mirror.clear_calls();
    session.save(&store, Some(&engine)).await.unwrap();
    assert!(mirror.calls().is_empty());
}

#[tokio::test]
async fn test_cleared_cooldown_archives_page_and_clears_linkage() {
    let store = MemoryStore::new();
    let mirror = Arc::new(RecordingMirror::new());
    let engine = engine(&mirror);
    run_with_bluefors_page(&store, &engine).await;
    mirror.clear_calls();

    let mut session = RunSession::load(&store, &key()).await.unwrap();
    session
        .set_entity_field(EntityKind::Fridge, BLUEFORS, "cooldown_start", "")
        .unwrap();
    let report = session.save(&store, Some(&engine)).await.unwrap();

    assert_eq!(
        mirror.calls(),
        vec![MirrorCall::ArchivePage {
            page_id: FIRST_PAGE.to_string(),
            clear_relations: true,
        }]
    );
    assert_eq!(
        report.sync.unwrap().archived,
        vec![Subject::Fridge(BLUEFORS.to_string())]
    );
    assert_eq!(session.run().metadata.fridges[BLUEFORS].page_id(), "");
    assert_eq!(stored(&store, BF_PAGE_ID).as_deref(), Some(""));
    assert_eq!(stored(&store, BF_URL).as_deref(), Some(""));
}

#[tokio::test]
async fn test_failed_archive_keeps_pointers() {
    let store = MemoryStore::new();
    let mirror = Arc::new(RecordingMirror::new());
    let engine = engine(&mirror);
    run_with_bluefors_page(&store, &engine).await;
    mirror.fail(MirrorOp::Archive);

    let mut session = RunSession::load(&store, &key()).await.unwrap();
    session
        .set_entity_field(EntityKind::Fridge, BLUEFORS, "cooldown_start", "")
        .unwrap();
    let report = session.save(&store, Some(&engine)).await.unwrap();

    let sync = report.sync.unwrap();
    assert!(sync.archived.is_empty());
    assert_eq!(sync.warnings.len(), 1);
    assert_eq!(sync.warnings[0].operation, "archive_page");
    assert_eq!(session.run().metadata.fridges[BLUEFORS].page_id(), FIRST_PAGE);
    assert_eq!(stored(&store, BF_PAGE_ID).as_deref(), Some(FIRST_PAGE));
}

#[tokio::test]
async fn test_failed_create_still_saves_locally() {
    let store = MemoryStore::new();
    let mirror = Arc::new(RecordingMirror::new());
    mirror.fail(MirrorOp::Create);
    let engine = engine(&mirror);

    let mut session = RunSession::create(new_run());
    session
        .set_step_status_at("Measurement", "Bluefors", "Cooldown", StepStatus::InProgress, "2026-02-02 08:00:00")
        .unwrap();
    let report = session.save(&store, Some(&engine)).await.unwrap();

    let sync = report.sync.unwrap();
    assert!(sync.created.is_empty());
    assert_eq!(sync.warnings.len(), 1);
    assert_eq!(sync.warnings[0].subject, Subject::Fridge(BLUEFORS.to_string()));
    assert_eq!(
        stored(&store, "metadata.measure.fridges.fridge_default_bluefors.cooldown_start").as_deref(),
        Some("2026-02-02 08:00:00")
    );
    assert_eq!(stored(&store, BF_PAGE_ID).as_deref(), Some(""));
    assert_eq!(session.metrics().get_stats().mirror_failures, 1);
}

#[tokio::test]
async fn test_next_save_retries_failed_create() {
    let store = MemoryStore::new();
    let mirror = Arc::new(RecordingMirror::new());
    mirror.fail(MirrorOp::Create);
    let engine = engine(&mirror);

    let mut session = RunSession::create(new_run());
    session
        .set_step_status_at("Measurement", "Bluefors", "Cooldown", StepStatus::InProgress, "2026-02-02 08:00:00")
        .unwrap();
    session.save(&store, Some(&engine)).await.unwrap();
    assert_eq!(stored(&store, BF_PAGE_ID).as_deref(), Some(""));

    mirror.recover(MirrorOp::Create);
    mirror.clear_calls();

    // a fresh session sees the anchor already stored, as `sync` does
    let mut session = RunSession::load(&store, &key()).await.unwrap();
    let report = session.save(&store, Some(&engine)).await.unwrap();

    let sync = report.sync.unwrap();
    assert_eq!(sync.created, vec![Subject::Fridge(BLUEFORS.to_string())]);
    assert!(sync.warnings.is_empty());
    assert_eq!(mirror.calls_of(MirrorOp::Create).len(), 1);
    assert_eq!(stored(&store, BF_PAGE_ID).as_deref(), Some(FIRST_PAGE));

    mirror.clear_calls();
    RunSession::load(&store, &key())
        .await
        .unwrap()
        .save(&store, Some(&engine))
        .await
        .unwrap();
    assert!(mirror.calls().is_empty());
}

#[tokio::test]
async fn test_fab_page_links_fridge_pages_created_earlier() {
    let store = MemoryStore::new();
    let mirror = Arc::new(RecordingMirror::new());
    let engine = engine(&mirror);
    let mut session = run_with_bluefors_page(&store, &engine).await;
    mirror.clear_calls();

    session.set_stage_field(MetaScope::Fab, "lot_id", "L-17").unwrap();
    session.set_stage_field(MetaScope::Fab, "type", "Resonator").unwrap();
    session.set_stage_field(MetaScope::Fab, "fabin", "2026-01-10 09:00:00").unwrap();
    let report = session.save(&store, Some(&engine)).await.unwrap();

    assert_eq!(report.sync.unwrap().created, vec![Subject::Fab]);
    assert_eq!(
        mirror.calls(),
        vec![
            MirrorCall::CreatePage {
                database_id: "db-fab".to_string(),
                properties: [
                    ("Name".to_string(), PropertyValue::Title("Res-A".to_string())),
                    ("Lot ID".to_string(), PropertyValue::Text("L-17".to_string())),
                    ("Type".to_string(), PropertyValue::Select("Resonator".to_string())),
                ]
                .into(),
            },
            MirrorCall::SetRelation {
                page_id: FIRST_PAGE.to_string(),
                property: "Fab run".to_string(),
                related_ids: vec![SECOND_PAGE.to_string()],
            },
            MirrorCall::UpdateDateRange {
                page_id: SECOND_PAGE.to_string(),
                property: "Fab dates".to_string(),
                start: Some("2026-01-10".to_string()),
                end: None,
            },
            MirrorCall::UpdateProperties {
                page_id: SECOND_PAGE.to_string(),
                properties: [
                    ("Chips".to_string(), PropertyValue::MultiSelect(vec!["C01".to_string()])),
                    ("# of chips".to_string(), PropertyValue::Number(Some(1.0))),
                ]
                .into(),
            },
        ]
    );
    assert_eq!(stored(&store, "metadata.fab.external_page_id").as_deref(), Some(SECOND_PAGE));

    // unchanged chip set is not sent again
    mirror.clear_calls();
    session.save(&store, Some(&engine)).await.unwrap();
    assert!(mirror.calls().is_empty());
}

#[tokio::test]
async fn test_incomplete_fab_record_fails_after_local_write() {
    let store = MemoryStore::new();
    let mirror = Arc::new(RecordingMirror::new());
    let engine = engine(&mirror);

    let mut session = RunSession::create(new_run());
    session.set_stage_field(MetaScope::Fab, "fabin", "2026-01-10 09:00:00").unwrap();
    let err = session.save(&store, Some(&engine)).await.unwrap_err();

    match err {
        TrackerError::ConsistencyViolation { entity, missing } => {
            assert_eq!(entity, "fab");
            assert_eq!(missing, vec!["lot_id", "type"]);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(mirror.calls().is_empty());
    assert_eq!(stored(&store, "metadata.fab.fabin").as_deref(), Some("2026-01-10 09:00:00"));
}

#[tokio::test]
async fn test_fab_page_created_once_missing_fields_are_filled() {
    let store = MemoryStore::new();
    let mirror = Arc::new(RecordingMirror::new());
    let engine = engine(&mirror);

    let mut session = RunSession::create(new_run());
    session.set_stage_field(MetaScope::Fab, "fabin", "2026-01-10 09:00:00").unwrap();
    assert!(session.save(&store, Some(&engine)).await.is_err());

    let mut session = RunSession::load(&store, &key()).await.unwrap();
    session.set_stage_field(MetaScope::Fab, "lot_id", "L-17").unwrap();
    match session.save(&store, Some(&engine)).await {
        Err(TrackerError::ConsistencyViolation { missing, .. }) => assert_eq!(missing, vec!["type"]),
        other => panic!("unexpected result: {other:?}"),
    }
    assert!(mirror.calls().is_empty());

    let mut session = RunSession::load(&store, &key()).await.unwrap();
    session.set_stage_field(MetaScope::Fab, "type", "Resonator").unwrap();
    let report = session.save(&store, Some(&engine)).await.unwrap();

    assert_eq!(report.sync.unwrap().created, vec![Subject::Fab]);
    assert_eq!(
        mirror.calls_of(MirrorOp::Create),
        vec![MirrorCall::CreatePage {
            database_id: "db-fab".to_string(),
            properties: [
                ("Name".to_string(), PropertyValue::Title("Res-A".to_string())),
                ("Lot ID".to_string(), PropertyValue::Text("L-17".to_string())),
                ("Type".to_string(), PropertyValue::Select("Resonator".to_string())),
            ]
            .into(),
        }]
    );
    assert_eq!(stored(&store, "metadata.fab.external_page_id").as_deref(), Some(FIRST_PAGE));
}

#[tokio::test]
async fn test_duplicate_fridge_uid_refuses_to_save() {
    let store = MemoryStore::new();
    let mirror = Arc::new(RecordingMirror::new());
    let engine = engine(&mirror);

    let fridge = |label: &str| Substep {
        label: label.to_string(),
        fridge_uid: Some("fridge_twin".to_string()),
        ..Substep::default()
    };
    let run = Run::new(key(), "Res-A", "kim", "2026-01-01").with_layers(vec![Layer {
        name: "Measurement".to_string(),
        substeps: vec![fridge("Bluefors"), fridge("ICEOxford")],
    }]);

    let err = RunSession::create(run).save(&store, Some(&engine)).await.unwrap_err();

    assert!(matches!(
        err,
        TrackerError::IdentityCollision { kind: EntityKind::Fridge, ref uid } if uid == "fridge_twin"
    ));
    assert!(store.document("main-007").is_none());
    assert!(mirror.calls().is_empty());
}

#[tokio::test]
async fn test_stale_working_copy_keeps_stored_linkage() {
    let store = MemoryStore::new();
    let mirror = Arc::new(RecordingMirror::new());
    let engine = engine(&mirror);

    let mut first = RunSession::create(new_run());
    first.save(&store, Some(&engine)).await.unwrap();
    let mut stale = RunSession::load(&store, &key()).await.unwrap();

    first
        .set_step_status_at("Measurement", "Bluefors", "Cooldown", StepStatus::InProgress, "2026-02-02 08:00:00")
        .unwrap();
    first.save(&store, Some(&engine)).await.unwrap();
    assert_eq!(stored(&store, BF_PAGE_ID).as_deref(), Some(FIRST_PAGE));

    stale.set_stage_field(MetaScope::Design, "verifier", "lee").unwrap();
    stale.save(&store, Some(&engine)).await.unwrap();

    assert_eq!(stored(&store, BF_PAGE_ID).as_deref(), Some(FIRST_PAGE));
    assert_eq!(stored(&store, "metadata.design.verifier").as_deref(), Some("lee"));
    assert_eq!(stale.run().metadata.fridges[BLUEFORS].page_id(), FIRST_PAGE);
}

#[tokio::test]
async fn test_half_written_linkage_is_repaired() {
    let store = MemoryStore::new();
    let mirror = Arc::new(RecordingMirror::new());
    let engine = engine(&mirror);

    let mut session = RunSession::create(new_run());
    session.save(&store, None).await.unwrap();
    let path = FieldPath::parse(BF_PAGE_ID).unwrap();
    store
        .update_field("main-007", &path, FieldValue::from("abc123"))
        .await
        .unwrap();

    let mut session = RunSession::load(&store, &key()).await.unwrap();
    let report = session.save(&store, Some(&engine)).await.unwrap();

    let repairs = report.sync.unwrap().repairs;
    assert_eq!(repairs.len(), 1);
    assert!(matches!(
        &repairs[0],
        Repair::RebuiltUrl { url, .. } if url == "https://www.notion.so/abc123"
    ));
    assert_eq!(stored(&store, BF_URL).as_deref(), Some("https://www.notion.so/abc123"));
    assert!(mirror.calls().is_empty());
}

#[tokio::test]
async fn test_delivery_slot_stamps_time_once() {
    let store = MemoryStore::new();
    let mut session = RunSession::create(new_run());

    session
        .set_step_status_at("Package", "C01", "Delivery", StepStatus::Delivery(2), "2026-03-01 10:00:00")
        .unwrap();
    session
        .set_step_status_at("Package", "C01", "Delivery", StepStatus::Delivery(3), "2026-03-05 10:00:00")
        .unwrap();
    session.save(&store, None).await.unwrap();

    let chip = &session.run().metadata.chips["chip_default_c01"];
    assert_eq!(chip.get("delivery"), "delivery#3");
    assert_eq!(chip.get("delivery_time"), "2026-03-01 10:00:00");

    session
        .set_step_status_at("Package", "C01", "Delivery", StepStatus::Pending, "2026-03-06 10:00:00")
        .unwrap();
    session.save(&store, None).await.unwrap();

    let chip = &session.run().metadata.chips["chip_default_c01"];
    assert_eq!(chip.get("delivery"), "");
    assert_eq!(chip.get("delivery_time"), "");
    assert_eq!(
        stored(&store, "metadata.package.chips.chip_default_c01.delivery_time").as_deref(),
        Some("")
    );
}

#[tokio::test]
async fn test_saved_run_survives_encode_decode() {
    let store = MemoryStore::new();
    let mut run = new_run();
    run.metadata.fab.set("notes", "thin film");
    store.insert("main-007", encode_run(&run).unwrap());

    let session = RunSession::load(&store, &key()).await.unwrap();

    assert_eq!(session.run().metadata.fab.get("notes"), "thin film");
    assert_eq!(session.run().layers, run.layers);
}
