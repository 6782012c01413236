use anyhow::{bail, Context, Result};
use std::sync::Arc;

use crate::config::{MirrorBackend, StoreBackend, TrackerConfig};
use crate::errors::TrackerError;
use crate::mirror::{MirrorCall, NotionMirror, RecordingMirror};
use crate::model::RunKey;
use crate::session::{RunSession, SaveReport};
use crate::store::{DocumentStore, FileStore, FirestoreStore, MemoryStore};
use crate::sync::{EdgeKind, Repair, SyncEngine};

pub mod init;
pub mod set_field;
pub mod show;
pub mod status;
pub mod sync;

#[allow(async_fn_in_trait)]
pub trait Command {
    async fn execute(&self) -> Result<()>;
}

/// Store and optional sync engine built from configuration
pub struct Backends {
    pub store: Box<dyn DocumentStore>,
    /// Dry runs read from `store` but write here, so recorded page ids
    /// never reach the real document
    pub scratch: Option<MemoryStore>,
    pub engine: Option<SyncEngine>,
    /// Present in dry-run mode
    pub recorder: Option<Arc<RecordingMirror>>,
    pub utc_offset_minutes: i32,
}

impl Backends {
    pub fn connect(config: &TrackerConfig, dry_run: bool) -> Result<Self> {
        let store: Box<dyn DocumentStore> = match config.store.backend {
            StoreBackend::File => Box::new(FileStore::new(config.store.data_dir.clone())),
            StoreBackend::Firestore => Box::new(
                FirestoreStore::new(config.firestore_settings()).context("Failed to set up the Firestore client")?,
            ),
        };

        let mut settings = config.sync_settings();
        let (engine, recorder) = if dry_run || config.mirror.backend == MirrorBackend::DryRun {
            // every entity gets a database so the recorder shows the full picture
            for database in [
                &mut settings.databases.fab,
                &mut settings.databases.bluefors,
                &mut settings.databases.iceoxford,
            ] {
                database.get_or_insert_with(|| "dry-run".to_string());
            }
            let recorder = Arc::new(RecordingMirror::with_url_prefix(&settings.page_url_prefix));
            (Some(SyncEngine::new(recorder.clone(), settings)), Some(recorder))
        } else if config.mirror.enabled {
            let mirror = NotionMirror::new(config.notion_settings()).context("Failed to set up the Notion client")?;
            (Some(SyncEngine::new(Arc::new(mirror), settings)), None)
        } else {
            (None, None)
        };

        Ok(Self {
            store,
            scratch: recorder.as_ref().map(|_| MemoryStore::new()),
            engine,
            recorder,
            utc_offset_minutes: config.time.utc_offset_minutes,
        })
    }

    /// Where sessions write
    pub fn store(&self) -> &dyn DocumentStore {
        match &self.scratch {
            Some(scratch) => scratch,
            None => self.store.as_ref(),
        }
    }

    /// Where runs are looked up
    pub fn source(&self) -> &dyn DocumentStore {
        self.store.as_ref()
    }

    pub async fn open_session(&self, key: &RunKey) -> Result<RunSession> {
        if let Some(scratch) = &self.scratch {
            let doc_id = key.doc_id();
            match self.store.get(&doc_id).await {
                Ok(document) => scratch.insert(&doc_id, document),
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e.into()),
            }
        }

        match RunSession::load(self.store(), key).await {
            Ok(session) => Ok(session.with_utc_offset(self.utc_offset_minutes)),
            Err(TrackerError::Store(e)) if e.is_not_found() => {
                bail!("no run document '{}'; create it with 'fab-tracker init'", key.doc_id())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Save and print what happened
    pub async fn save(&self, session: &mut RunSession) -> Result<()> {
        let report = session.save(self.store(), self.engine.as_ref()).await?;
        print_save_report(&report, self.recorder.as_deref());
        session.metrics().log_stats();
        Ok(())
    }
}

pub fn print_save_report(report: &SaveReport, recorder: Option<&RecordingMirror>) {
    println!("💾 Saved {} (correlation {})", report.doc_id, report.correlation_id);
    if report.flow_ids_assigned > 0 {
        println!("   🆔 Assigned {} missing flow identifiers", report.flow_ids_assigned);
    }
    for uid in &report.reconcile.created {
        println!("   ➕ New metadata record: {uid}");
    }
    for uid in &report.reconcile.pruned {
        println!("   ➖ Dropped metadata record: {uid}");
    }

    match &report.sync {
        None => println!("🔕 Mirror sync disabled"),
        Some(sync) => {
            for repair in &sync.repairs {
                match repair {
                    Repair::RebuiltUrl { location, url } => println!("   🔧 Rebuilt page url for {location:?}: {url}"),
                    Repair::ClearedUrl { location } => println!("   🔧 Cleared untrusted page url for {location:?}"),
                }
            }
            for edge in &sync.edges {
                let kind = match &edge.kind {
                    EdgeKind::Create => "create".to_string(),
                    EdgeKind::Rename => "rename".to_string(),
                    EdgeKind::Reset => "reset".to_string(),
                    EdgeKind::Secondary { property } => format!("update {property}"),
                };
                println!("   ⚡ {} {}: '{}' → '{}'", kind, edge.subject, edge.old, edge.new);
            }
            for subject in &sync.created {
                println!("   🆕 Created page for {subject}");
            }
            for subject in &sync.renamed {
                println!("   ✏️  Renamed page for {subject}");
            }
            for subject in &sync.archived {
                println!("   🗄️  Archived page for {subject}");
            }
            for warning in &sync.warnings {
                println!("   ⚠️  {warning}");
            }
            if sync.is_quiet() {
                println!("✅ Mirror already in sync");
            } else if sync.warnings.is_empty() {
                println!("✅ Mirror updated");
            } else {
                println!("⚠️  Saved locally; {} mirror call(s) will be retried on the next save", sync.warnings.len());
            }
        }
    }

    if let Some(recorder) = recorder {
        let calls = recorder.calls();
        println!("🧪 Dry run: {} mirror call(s) recorded", calls.len());
        for call in &calls {
            println!("   {}", describe_call(call));
        }
    }
}

fn describe_call(call: &MirrorCall) -> String {
    match call {
        MirrorCall::CreatePage { database_id, properties } => {
            format!("create page in {database_id} with {} properties", properties.len())
        }
        MirrorCall::UpdateProperties { page_id, properties } => {
            let names: Vec<&str> = properties.keys().map(String::as_str).collect();
            format!("update {} on {page_id}", names.join(", "))
        }
        MirrorCall::ArchivePage { page_id, .. } => format!("archive {page_id}"),
        MirrorCall::UpdateDateRange {
            page_id,
            property,
            start,
            end,
        } => format!(
            "set {property} on {page_id} to {} .. {}",
            start.as_deref().unwrap_or("(none)"),
            end.as_deref().unwrap_or("(none)")
        ),
        MirrorCall::SetRelation {
            page_id,
            property,
            related_ids,
        } => format!("relate {page_id} via {property} to {}", related_ids.join(", ")),
    }
}

pub fn show_how_to_start() -> Result<()> {
    println!("🧪 fab-tracker - fab and measurement run tracking");
    println!();
    println!("To get started:");
    println!("  🆕 fab-tracker init --run 007 --device Res-A --creator kim   # New run");
    println!("  📋 fab-tracker show --run 007                                # Inspect it");
    println!("  🔄 fab-tracker status --run 007 --layer Measurement \\");
    println!("        --substep Bluefors --step Cooldown --to in_progress    # Move a step");
    println!("  ✍️  fab-tracker set-field --run 007 --stage fab --key lot_id --value L-17");
    println!("  🔁 fab-tracker sync --run 007                                # Re-sync mirror");
    println!();
    println!("💡 Add --dry-run to see the mirror calls without sending them or saving");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dry_run_uses_recorder_with_all_databases() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = TrackerConfig::default();
        config.store.data_dir = dir.path().to_string_lossy().to_string();

        let backends = Backends::connect(&config, true).unwrap();
        assert!(backends.recorder.is_some());
        assert!(backends.scratch.is_some());
        let engine = backends.engine.as_ref().unwrap();
        assert_eq!(engine.settings().databases.fab.as_deref(), Some("dry-run"));
    }

    #[test]
    fn test_disabled_mirror_has_no_engine() {
        let config = TrackerConfig::default();
        let backends = Backends::connect(&config, false).unwrap();
        assert!(backends.engine.is_none());
        assert!(backends.recorder.is_none());
    }

    #[test]
    fn test_enabled_mirror_without_token_fails() {
        let mut config = TrackerConfig::default();
        config.mirror.enabled = true;
        config.mirror.token = None;
        assert!(Backends::connect(&config, false).is_err());
    }
}
