// Per-run working session: local edits, save, read-back and mirror sync

use std::sync::Arc;
use tracing::{debug, info, Instrument};

use crate::errors::TrackerError;
use crate::lifecycle::{handle_status_change, StepAddress, TransitionOutcome};
use crate::metadata::{default_record, normalize_key, reconcile_run, FieldKind, MetaScope, ReconcileSummary};
use crate::model::{Run, RunKey, StepStatus};
use crate::observability::{OperationTimer, SyncMetrics};
use crate::registry::{ensure_flow_ids, EntityKind, EntityRegistry};
use crate::store::{decode_run, encode_run, DocumentStore};
use crate::sync::{PreSnapshot, SignatureCache, SyncContext, SyncEngine, SyncReport};
use crate::telemetry::{generate_correlation_id, save_span};
use crate::timestamp::{is_canonical, is_date_only, now_string, DEFAULT_UTC_OFFSET_MINUTES};

#[derive(Debug, Clone)]
pub struct SaveReport {
    pub doc_id: String,
    pub correlation_id: String,
    pub flow_ids_assigned: usize,
    pub reconcile: ReconcileSummary,
    /// `None` when saved without a sync engine
    pub sync: Option<SyncReport>,
}

/// One run being worked on.
///
/// Holds the working document, the snapshot taken when the run was loaded,
/// the signature cache for duplicate-call suppression and the metrics. There
/// is no shared state between sessions.
pub struct RunSession {
    run: Run,
    doc_id: String,
    pre: PreSnapshot,
    signatures: SignatureCache,
    metrics: Arc<SyncMetrics>,
    utc_offset_minutes: i32,
}

impl RunSession {
    /// Session for a run that has not been stored yet
    pub fn create(run: Run) -> Self {
        let doc_id = run.key.doc_id();
        Self::start(doc_id, run)
    }

    pub async fn load(store: &dyn DocumentStore, key: &RunKey) -> Result<Self, TrackerError> {
        let doc_id = key.doc_id();
        let document = store.get(&doc_id).await?;
        let run = decode_run(&doc_id, &document)?;
        debug!(doc_id = %doc_id, layers = run.layers.len(), "Loaded run");
        Ok(Self::start(doc_id, run))
    }

    fn start(doc_id: String, run: Run) -> Self {
        Self {
            pre: PreSnapshot::capture(&run),
            run,
            doc_id,
            signatures: SignatureCache::new(),
            metrics: Arc::new(SyncMetrics::new()),
            utc_offset_minutes: DEFAULT_UTC_OFFSET_MINUTES,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<SyncMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn with_utc_offset(mut self, minutes: i32) -> Self {
        self.utc_offset_minutes = minutes;
        self
    }

    pub fn run(&self) -> &Run {
        &self.run
    }

    pub fn doc_id(&self) -> &str {
        &self.doc_id
    }

    pub fn pre_snapshot(&self) -> &PreSnapshot {
        &self.pre
    }

    pub fn signatures(&self) -> &SignatureCache {
        &self.signatures
    }

    pub fn metrics(&self) -> &Arc<SyncMetrics> {
        &self.metrics
    }

    pub fn set_step_status(
        &mut self,
        layer: &str,
        substep: &str,
        step: &str,
        status: StepStatus,
    ) -> Result<TransitionOutcome, TrackerError> {
        let now = now_string(self.utc_offset_minutes);
        self.set_step_status_at(layer, substep, step, status, &now)
    }

    /// Same as `set_step_status` with an explicit clock value
    pub fn set_step_status_at(
        &mut self,
        layer: &str,
        substep: &str,
        step: &str,
        status: StepStatus,
        now: &str,
    ) -> Result<TransitionOutcome, TrackerError> {
        // entity uids must exist before a transition can address a record
        ensure_flow_ids(&mut self.run.layers);
        let address = StepAddress::locate(&self.run, layer, substep, step)?;
        let outcome = handle_status_change(&mut self.run, address, status, now)?;
        info!(
            doc_id = %self.doc_id,
            step = %step,
            old = %outcome.old,
            new = %outcome.new,
            "Step status changed"
        );
        Ok(outcome)
    }

    /// Override one field of a chip or fridge record
    pub fn set_entity_field(&mut self, kind: EntityKind, uid: &str, key: &str, value: &str) -> Result<(), TrackerError> {
        let registry = EntityRegistry::from_layers(&self.run.layers)?;
        if registry.get(kind, uid).is_none() {
            return Err(TrackerError::UnknownEntity {
                kind,
                uid: uid.to_string(),
            });
        }

        let scope = match kind {
            EntityKind::Chip => MetaScope::Chip,
            EntityKind::Fridge => MetaScope::Fridge,
        };
        let (key, value) = validate_field(scope, key, value)?;
        let records = match kind {
            EntityKind::Chip => &mut self.run.metadata.chips,
            EntityKind::Fridge => &mut self.run.metadata.fridges,
        };
        records
            .entry(uid.to_string())
            .or_insert_with(|| default_record(scope))
            .set(&key, value);
        Ok(())
    }

    /// Override one field of the design or fab record
    pub fn set_stage_field(&mut self, scope: MetaScope, key: &str, value: &str) -> Result<(), TrackerError> {
        let (key, value) = validate_field(scope, key, value)?;
        let record = match scope {
            MetaScope::Design => &mut self.run.metadata.design,
            MetaScope::Fab => &mut self.run.metadata.fab,
            MetaScope::Chip | MetaScope::Fridge => {
                return Err(TrackerError::InvalidField {
                    key,
                    reason: format!("{} fields belong to an entity; name its uid", scope.name()),
                })
            }
        };
        record.set(&key, value);
        Ok(())
    }

    /// Persist the working document and synchronize the mirror.
    ///
    /// Order: flow ids, collision check, metadata reconciliation, write-once
    /// linkage carry-forward, full write, read-back, then the sync pass over
    /// the read-back. Mirror failures are in the report; everything else is
    /// an error, with the local write already done if it got that far.
    pub async fn save(
        &mut self,
        store: &dyn DocumentStore,
        engine: Option<&SyncEngine>,
    ) -> Result<SaveReport, TrackerError> {
        let correlation_id = generate_correlation_id();
        let span = save_span(&self.doc_id, &correlation_id);
        self.save_in_span(store, engine, correlation_id).instrument(span).await
    }

    async fn save_in_span(
        &mut self,
        store: &dyn DocumentStore,
        engine: Option<&SyncEngine>,
        correlation_id: String,
    ) -> Result<SaveReport, TrackerError> {
        let timer = OperationTimer::new("save");
        let flow_ids_assigned = ensure_flow_ids(&mut self.run.layers);
        EntityRegistry::from_layers(&self.run.layers)?;
        let reconcile = reconcile_run(&mut self.run);
        if !reconcile.pruned.is_empty() || !reconcile.created.is_empty() {
            info!(created = ?reconcile.created, pruned = ?reconcile.pruned, "Reconciled entity metadata");
        }

        self.carry_forward_linkage(store).await?;
        store.set(&self.doc_id, encode_run(&self.run)?).await?;
        self.metrics.record_save();

        let stored = store.get(&self.doc_id).await?;
        self.run = decode_run(&self.doc_id, &stored)?;

        let sync = match engine {
            Some(engine) => {
                let report = engine
                    .synchronize(
                        &mut self.run,
                        &self.pre,
                        SyncContext {
                            store,
                            doc_id: &self.doc_id,
                            signatures: &mut self.signatures,
                            metrics: self.metrics.as_ref(),
                        },
                    )
                    .await?;
                Some(report)
            }
            None => None,
        };

        info!(
            doc_id = %self.doc_id,
            flow_ids_assigned,
            warnings = sync.as_ref().map_or(0, |report| report.warnings.len()),
            "Saved run"
        );
        timer.finish();

        Ok(SaveReport {
            doc_id: self.doc_id.clone(),
            correlation_id,
            flow_ids_assigned,
            reconcile,
            sync,
        })
    }

    /// Page linkage is write-once: a stored pointer survives saves from a
    /// working copy that never saw it.
    async fn carry_forward_linkage(&mut self, store: &dyn DocumentStore) -> Result<(), TrackerError> {
        let stored = match store.get(&self.doc_id).await {
            Ok(document) => decode_run(&self.doc_id, &document)?,
            Err(e) if e.is_not_found() => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        for location in stored.metadata.locations() {
            let Some(previous) = stored.metadata.record(&location) else { continue };
            if previous.page_id().is_empty() {
                continue;
            }
            let Some(current) = self.run.metadata.record_mut(&location) else { continue };
            if current.page_id().is_empty() {
                current.set_linkage(previous.page_url(), previous.page_id());
                debug!(location = ?location, page_id = %previous.page_id(), "Kept stored page linkage");
            }
        }
        Ok(())
    }

    /// Replace the working document and the snapshot with the stored state
    pub async fn reload(&mut self, store: &dyn DocumentStore) -> Result<(), TrackerError> {
        let document = store.get(&self.doc_id).await?;
        self.run = decode_run(&self.doc_id, &document)?;
        self.pre = PreSnapshot::capture(&self.run);
        Ok(())
    }
}

/// Check a user-supplied value against the declared schema of `scope`
fn validate_field(scope: MetaScope, key: &str, value: &str) -> Result<(String, String), TrackerError> {
    let key = normalize_key(key);
    let value = value.trim().to_string();
    let invalid = |reason: String| TrackerError::InvalidField {
        key: key.clone(),
        reason,
    };

    match scope.kind_of(&key) {
        None => Err(invalid(format!("not a {} field", scope.name()))),
        Some(FieldKind::Linkage) => Err(invalid("page linkage is maintained by sync".to_string())),
        Some(FieldKind::Timestamp) => {
            if value.is_empty() || is_canonical(&value) || is_date_only(&value) {
                Ok((key.clone(), value))
            } else {
                Err(invalid("expected YYYY-MM-DD HH:MM:SS or YYYY-MM-DD".to_string()))
            }
        }
        Some(FieldKind::Token) => match value.parse::<StepStatus>() {
            Ok(StepStatus::Pending) => Ok((key.clone(), String::new())),
            Ok(status) if status.is_indexed() => Ok((key.clone(), status.to_string())),
            _ => Err(invalid(format!("'{value}' is not a slot token"))),
        },
        Some(FieldKind::Text) => Ok((key.clone(), value)),
    }
}
