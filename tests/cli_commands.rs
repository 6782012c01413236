//! CLI commands against a file store in a temporary directory

use fab_tracker::cli::commands::init::InitCommand;
use fab_tracker::cli::commands::set_field::SetFieldCommand;
use fab_tracker::cli::commands::show::ShowCommand;
use fab_tracker::cli::commands::status::StatusCommand;
use fab_tracker::cli::commands::sync::SyncCommand;
use fab_tracker::cli::commands::Command;
use fab_tracker::cli::StageArg;
use fab_tracker::model::{RunClass, RunKey};
use fab_tracker::store::{decode_run, DocumentStore, FileStore};
use fab_tracker::TrackerConfig;
use tempfile::TempDir;

fn key() -> RunKey {
    RunKey::new(RunClass::Test, "3")
}

fn config(dir: &TempDir) -> TrackerConfig {
    let mut config = TrackerConfig::default();
    config.store.data_dir = dir.path().to_string_lossy().to_string();
    config
}

fn cooldown(config: &TrackerConfig, dry_run: bool) -> StatusCommand {
    StatusCommand {
        key: key(),
        layer: "Measurement".to_string(),
        substep: "Bluefors".to_string(),
        step: "Cooldown".to_string(),
        to: "in_progress".to_string(),
        config: config.clone(),
        dry_run,
    }
}

async fn stored_fridge_field(dir: &TempDir, field: &str) -> String {
    let store = FileStore::new(dir.path());
    let document = store.get("test-3").await.unwrap();
    let run = decode_run("test-3", &document).unwrap();
    run.metadata.fridges["fridge_default_bluefors"].get(field).to_string()
}

#[tokio::test]
async fn test_init_then_show() {
    let dir = TempDir::new().unwrap();
    let config = config(&dir);

    InitCommand::new(key(), "Res-B".to_string(), "lee".to_string(), config.clone())
        .execute()
        .await
        .unwrap();
    assert!(dir.path().join("test-3.json").exists());

    ShowCommand::new(key(), config.clone()).execute().await.unwrap();

    // a second init must not clobber the run
    let again = InitCommand::new(key(), "Other".to_string(), "lee".to_string(), config)
        .execute()
        .await;
    assert!(again.is_err());
}

#[tokio::test]
async fn test_dry_run_leaves_store_untouched() {
    let dir = TempDir::new().unwrap();
    let config = config(&dir);
    InitCommand::new(key(), "Res-B".to_string(), "lee".to_string(), config.clone())
        .execute()
        .await
        .unwrap();

    cooldown(&config, true).execute().await.unwrap();
    assert_eq!(stored_fridge_field(&dir, "cooldown_start").await, "");
    assert_eq!(stored_fridge_field(&dir, "external_page_id").await, "");

    cooldown(&config, false).execute().await.unwrap();
    assert_ne!(stored_fridge_field(&dir, "cooldown_start").await, "");
    // mirror disabled by default, so no page linkage appears
    assert_eq!(stored_fridge_field(&dir, "external_page_id").await, "");
}

#[tokio::test]
async fn test_set_field_and_sync() {
    let dir = TempDir::new().unwrap();
    let config = config(&dir);
    InitCommand::new(key(), "Res-B".to_string(), "lee".to_string(), config.clone())
        .execute()
        .await
        .unwrap();

    SetFieldCommand {
        key: key(),
        stage: StageArg::Measure,
        entity: Some("Bluefors".to_string()),
        field: "Owner".to_string(),
        value: " kim ".to_string(),
        config: config.clone(),
        dry_run: false,
    }
    .execute()
    .await
    .unwrap();
    assert_eq!(stored_fridge_field(&dir, "owner").await, "kim");

    let missing_entity = SetFieldCommand {
        key: key(),
        stage: StageArg::Package,
        entity: None,
        field: "notes".to_string(),
        value: "x".to_string(),
        config: config.clone(),
        dry_run: false,
    }
    .execute()
    .await;
    assert!(missing_entity.is_err());

    SyncCommand {
        key: key(),
        config,
        dry_run: true,
    }
    .execute()
    .await
    .unwrap();
}

#[tokio::test]
async fn test_commands_on_missing_run_fail() {
    let dir = TempDir::new().unwrap();
    let config = config(&dir);

    assert!(ShowCommand::new(key(), config.clone()).execute().await.is_err());
    assert!(cooldown(&config, false).execute().await.is_err());
}
