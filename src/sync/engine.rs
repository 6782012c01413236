// Edge-triggered mirror synchronization, run once per save

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use super::edge::{detect_edges, Edge, EdgeKind};
use super::policy::{BestEffort, SyncWarning};
use super::repair::{apply_repairs, Repair};
use super::signature::{signature, Channel, SignatureCache};
use super::snapshot::{DateBinding, PostSnapshot, PreSnapshot, Subject, SubjectState};
use crate::errors::TrackerError;
use crate::mirror::{page_url, relation_property, FridgeSystem, PageMirror, Properties, PropertyValue, DEFAULT_PAGE_URL_PREFIX};
use crate::model::{Run, EXTERNAL_PAGE_ID, EXTERNAL_URL};
use crate::observability::SyncMetrics;
use crate::store::{DocumentStore, FieldPath, FieldValue};
use crate::timestamp::{date_only, to_utc_iso, DEFAULT_UTC_OFFSET_MINUTES};

pub const TITLE_PROPERTY: &str = "Name";
pub const CHIPS_PROPERTY: &str = "Chips";
pub const CHIP_COUNT_PROPERTY: &str = "# of chips";

/// How local timestamps are sent to date properties
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatePrecision {
    #[default]
    Date,
    Datetime,
}

/// Mirror database ids per watched entity type
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DatabaseTargets {
    pub fab: Option<String>,
    pub bluefors: Option<String>,
    pub iceoxford: Option<String>,
}

impl DatabaseTargets {
    pub fn for_state(&self, state: &SubjectState) -> Option<&str> {
        match state.system {
            None => self.fab.as_deref(),
            Some(FridgeSystem::Bluefors) => self.bluefors.as_deref(),
            Some(FridgeSystem::IceOxford) => self.iceoxford.as_deref(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSettings {
    pub databases: DatabaseTargets,
    pub page_url_prefix: String,
    pub date_precision: DatePrecision,
    pub utc_offset_minutes: i32,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            databases: DatabaseTargets::default(),
            page_url_prefix: DEFAULT_PAGE_URL_PREFIX.to_string(),
            date_precision: DatePrecision::Date,
            utc_offset_minutes: DEFAULT_UTC_OFFSET_MINUTES,
        }
    }
}

/// Per-save collaborators owned by the session
pub struct SyncContext<'a> {
    pub store: &'a dyn DocumentStore,
    pub doc_id: &'a str,
    pub signatures: &'a mut SignatureCache,
    pub metrics: &'a SyncMetrics,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncReport {
    pub repairs: Vec<Repair>,
    pub edges: Vec<Edge>,
    pub created: Vec<Subject>,
    pub renamed: Vec<Subject>,
    pub archived: Vec<Subject>,
    pub warnings: Vec<SyncWarning>,
}

impl SyncReport {
    pub fn is_quiet(&self) -> bool {
        self.repairs.is_empty() && self.edges.is_empty() && self.warnings.is_empty()
    }
}

pub struct SyncEngine {
    mirror: Arc<dyn PageMirror>,
    settings: SyncSettings,
}

impl SyncEngine {
    pub fn new(mirror: Arc<dyn PageMirror>, settings: SyncSettings) -> Self {
        Self { mirror, settings }
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    /// Page title: `BF260202` style for fridges, the device name for the fab record
    pub fn title(&self, subject: &Subject, state: &SubjectState) -> String {
        match state.system {
            Some(system) => system.display_name(state.anchor(subject)),
            None => state.label.clone(),
        }
    }

    fn boundary(&self, raw: &str) -> Option<String> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        match self.settings.date_precision {
            DatePrecision::Date => date_only(raw),
            DatePrecision::Datetime => to_utc_iso(raw, self.settings.utc_offset_minutes),
        }
    }

    fn create_properties(&self, subject: &Subject, state: &SubjectState, title: &str) -> Properties {
        let mut properties = Properties::new();
        properties.insert(TITLE_PROPERTY.to_string(), PropertyValue::Title(title.to_string()));
        if *subject == Subject::Fab {
            properties.insert(
                "Lot ID".to_string(),
                PropertyValue::Text(state.fields.get("lot_id").trim().to_string()),
            );
            properties.insert(
                "Type".to_string(),
                PropertyValue::Select(state.fields.get("type").trim().to_string()),
            );
        }
        properties
    }

    /// Bring the mirror in line with the saved run.
    ///
    /// `run` must be the authoritative read-back of the save; linkage changes
    /// made here are written to both `run` and the store. Mirror failures end
    /// up in the report, everything else is returned as an error.
    pub async fn synchronize(
        &self,
        run: &mut Run,
        pre: &PreSnapshot,
        ctx: SyncContext<'_>,
    ) -> Result<SyncReport, TrackerError> {
        let SyncContext {
            store,
            doc_id,
            signatures,
            metrics,
        } = ctx;

        let repairs = apply_repairs(store, doc_id, run, &self.settings.page_url_prefix).await?;
        for _ in &repairs {
            metrics.record_repair();
        }

        let post = PostSnapshot::capture(run);
        let edges = detect_edges(pre, &post);
        for edge in &edges {
            info!(
                doc_id,
                subject = %edge.subject,
                kind = ?edge.kind,
                field = %edge.field,
                old = %edge.old,
                new = %edge.new,
                "Detected edge"
            );
        }

        let relations = self.preflight(run, &post, &edges)?;

        let mut pass = Pass {
            engine: self,
            store,
            doc_id,
            signatures,
            policy: BestEffort::new(metrics),
            relations,
            report: SyncReport {
                repairs,
                ..SyncReport::default()
            },
        };

        for edge in &edges {
            match &edge.kind {
                EdgeKind::Create => pass.create(run, &post, &edge.subject).await?,
                EdgeKind::Rename => pass.rename(run, &post, &edge.subject).await,
                EdgeKind::Reset => pass.reset(run, &edge.subject).await?,
                EdgeKind::Secondary { property } => pass.secondary(run, &post, &edge.subject, property).await,
            }
        }
        pass.sync_chips(run, &post).await;

        let Pass { policy, mut report, .. } = pass;
        report.edges = edges;
        report.warnings = policy.into_warnings();
        Ok(report)
    }

    /// Checks that must pass before any mirror call of this save.
    /// Returns the relation property for every fridge that will be linked.
    fn preflight(
        &self,
        run: &Run,
        post: &PostSnapshot,
        edges: &[Edge],
    ) -> Result<HashMap<Subject, &'static str>, TrackerError> {
        let creates = |subject: &Subject| {
            edges
                .iter()
                .any(|edge| edge.kind == EdgeKind::Create && edge.subject == *subject)
        };

        let fab_create = creates(&Subject::Fab) && self.settings.databases.fab.is_some();
        if fab_create {
            let missing = missing_fab_fields(run);
            if !missing.is_empty() {
                return Err(TrackerError::ConsistencyViolation {
                    entity: "fab".to_string(),
                    missing,
                });
            }
        }

        let mut relations = HashMap::new();
        if !fab_create && run.metadata.fab.page_id().is_empty() {
            return Ok(relations);
        }
        for (subject, state) in post.subjects() {
            if *subject == Subject::Fab {
                continue;
            }
            let linking = creates(subject) || (fab_create && !state.fields.page_id().is_empty());
            if linking {
                relations.insert(subject.clone(), relation_property(&state.label, &post.run_class)?);
            }
        }
        Ok(relations)
    }
}

fn missing_fab_fields(run: &Run) -> Vec<String> {
    let fab = &run.metadata.fab;
    let mut missing = Vec::new();
    if !fab.has_value("lot_id") {
        missing.push("lot_id".to_string());
    }
    if run.device_name.trim().is_empty() {
        missing.push("name".to_string());
    }
    for key in ["fabin", "type"] {
        if !fab.has_value(key) {
            missing.push(key.to_string());
        }
    }
    missing
}

/// State of one synchronization pass
struct Pass<'a> {
    engine: &'a SyncEngine,
    store: &'a dyn DocumentStore,
    doc_id: &'a str,
    signatures: &'a mut SignatureCache,
    policy: BestEffort<'a>,
    relations: HashMap<Subject, &'static str>,
    report: SyncReport,
}

impl Pass<'_> {
    async fn create(&mut self, run: &mut Run, post: &PostSnapshot, subject: &Subject) -> Result<(), TrackerError> {
        let engine = self.engine;
        let Some(state) = post.get(subject) else {
            return Ok(());
        };
        let Some(database_id) = engine.settings.databases.for_state(state) else {
            self.policy.skip(subject, "create_page", "no mirror database configured");
            return Ok(());
        };

        let title = engine.title(subject, state);
        let properties = engine.create_properties(subject, state, &title);
        let Some(created) = self
            .policy
            .call(subject, "create_page", engine.mirror.create_page(database_id, &properties))
            .await
        else {
            return Ok(());
        };

        let url = if created.url.trim().is_empty() {
            page_url(&engine.settings.page_url_prefix, &created.page_id)
        } else {
            created.url.clone()
        };
        self.persist_linkage(run, subject, &url, &created.page_id).await?;
        self.signatures.record(subject, Channel::Title, title.clone());
        self.policy.metrics().record_page_created();
        self.report.created.push(subject.clone());
        info!(doc_id = self.doc_id, subject = %subject, page_id = %created.page_id, title = %title, "Created mirror page");

        self.link_created(run, post, subject, &created.page_id).await;
        for binding in subject.bindings() {
            if engine.boundary(state.fields.get(binding.start)).is_some() {
                self.send_range(subject, state, binding, &created.page_id).await;
            }
        }
        Ok(())
    }

    /// Relations for a page created in this pass. A new fridge page points at
    /// the fab page; a new fab page is linked from the fridge pages that exist.
    async fn link_created(&mut self, run: &Run, post: &PostSnapshot, subject: &Subject, page_id: &str) {
        let engine = self.engine;
        match subject {
            Subject::Fridge(_) => {
                let fab_page = run.metadata.fab.page_id().to_string();
                let Some(property) = self.relations.get(subject).copied() else {
                    return;
                };
                if fab_page.is_empty() {
                    return;
                }
                self.policy
                    .call(subject, "set_relation", engine.mirror.set_relation(page_id, property, &[fab_page]))
                    .await;
            }
            Subject::Fab => {
                let linked: Vec<(Subject, String, &'static str)> = post
                    .subjects()
                    .filter_map(|(fridge, _)| {
                        let property = self.relations.get(fridge).copied()?;
                        let fridge_page = run.metadata.record(&fridge.location())?.page_id();
                        (!fridge_page.is_empty()).then(|| (fridge.clone(), fridge_page.to_string(), property))
                    })
                    .collect();
                let fab_page = [page_id.to_string()];
                for (fridge, fridge_page, property) in linked {
                    self.policy
                        .call(&fridge, "set_relation", engine.mirror.set_relation(&fridge_page, property, &fab_page))
                        .await;
                }
            }
        }
    }

    async fn rename(&mut self, run: &Run, post: &PostSnapshot, subject: &Subject) {
        let engine = self.engine;
        let Some(state) = post.get(subject) else { return };
        let Some(record) = run.metadata.record(&subject.location()) else {
            return;
        };
        let page_id = record.page_id().to_string();
        if page_id.is_empty() || record.page_url().trim().is_empty() {
            self.policy.skip(subject, "update_properties", "page url could not be resolved");
            return;
        }

        let title = engine.title(subject, state);
        if self.signatures.is_unchanged(subject, &Channel::Title, &title) {
            self.suppressed(subject, "update_properties");
        } else {
            let properties = Properties::from([(TITLE_PROPERTY.to_string(), PropertyValue::Title(title.clone()))]);
            let renamed = self
                .policy
                .call(subject, "update_properties", engine.mirror.update_properties(&page_id, &properties))
                .await;
            if renamed.is_some() {
                self.signatures.record(subject, Channel::Title, title);
                self.report.renamed.push(subject.clone());
            }
        }

        let anchor = subject.anchor_key();
        for binding in subject.bindings() {
            if binding.start == anchor || binding.end == anchor {
                self.send_range(subject, state, binding, &page_id).await;
            }
        }
    }

    async fn reset(&mut self, run: &mut Run, subject: &Subject) -> Result<(), TrackerError> {
        let engine = self.engine;
        let page_id = run
            .metadata
            .record(&subject.location())
            .map(|record| record.page_id().to_string())
            .unwrap_or_default();
        if page_id.is_empty() {
            return Ok(());
        }

        // pointers stay until the page is really gone
        let archived = self
            .policy
            .call(subject, "archive_page", engine.mirror.archive_page(&page_id, true))
            .await;
        if archived.is_none() {
            return Ok(());
        }

        self.persist_linkage(run, subject, "", "").await?;
        self.signatures.forget(subject);
        self.policy.metrics().record_page_archived();
        self.report.archived.push(subject.clone());
        info!(doc_id = self.doc_id, subject = %subject, page_id = %page_id, "Archived mirror page");
        Ok(())
    }

    async fn secondary(&mut self, run: &Run, post: &PostSnapshot, subject: &Subject, property: &str) {
        let (Some(binding), Some(state)) = (subject.binding(property), post.get(subject)) else {
            return;
        };
        let Some(record) = run.metadata.record(&subject.location()) else {
            return;
        };
        let page_id = record.page_id().to_string();
        if !page_id.is_empty() {
            self.send_range(subject, state, binding, &page_id).await;
        }
    }

    async fn send_range(&mut self, subject: &Subject, state: &SubjectState, binding: &DateBinding, page_id: &str) {
        let engine = self.engine;
        let start = engine.boundary(state.fields.get(binding.start));
        let end = engine.boundary(state.fields.get(binding.end));
        let channel = Channel::DateRange(binding.property);
        let sent = format!("{}..{}", start.as_deref().unwrap_or(""), end.as_deref().unwrap_or(""));
        if self.signatures.is_unchanged(subject, &channel, &sent) {
            self.suppressed(subject, "update_date_range");
            return;
        }

        let updated = self
            .policy
            .call(
                subject,
                "update_date_range",
                engine
                    .mirror
                    .update_date_range(page_id, binding.property, start.as_deref(), end.as_deref()),
            )
            .await;
        if updated.is_some() {
            self.signatures.record(subject, channel, sent);
        }
    }

    /// `Chips` membership of the fab page, sent only when the label set changed
    async fn sync_chips(&mut self, run: &Run, post: &PostSnapshot) {
        let engine = self.engine;
        let subject = Subject::Fab;
        let page_id = run.metadata.fab.page_id().to_string();
        if page_id.is_empty() {
            return;
        }

        let sent = signature(&post.chip_labels);
        if self.signatures.is_unchanged(&subject, &Channel::Chips, &sent) {
            self.suppressed(&subject, "update_properties");
            return;
        }

        let properties = Properties::from([
            (
                CHIPS_PROPERTY.to_string(),
                PropertyValue::MultiSelect(post.chip_labels.clone()),
            ),
            (
                CHIP_COUNT_PROPERTY.to_string(),
                PropertyValue::Number(Some(post.chip_labels.len() as f64)),
            ),
        ]);
        let updated = self
            .policy
            .call(&subject, "update_properties", engine.mirror.update_properties(&page_id, &properties))
            .await;
        if updated.is_some() {
            self.signatures.record(&subject, Channel::Chips, sent);
        }
    }

    async fn persist_linkage(
        &mut self,
        run: &mut Run,
        subject: &Subject,
        url: &str,
        page_id: &str,
    ) -> Result<(), TrackerError> {
        let location = subject.location();
        for (key, value) in [(EXTERNAL_URL, url), (EXTERNAL_PAGE_ID, page_id)] {
            let path = FieldPath::from_segments(location.segments(key))?;
            self.store
                .update_field(self.doc_id, &path, FieldValue::String(value.to_string()))
                .await?;
        }
        if let Some(record) = run.metadata.record_mut(&location) {
            if page_id.is_empty() {
                record.clear_linkage();
            } else {
                record.set_linkage(url, page_id);
            }
        }
        Ok(())
    }

    fn suppressed(&self, subject: &Subject, operation: &'static str) {
        self.policy.metrics().record_suppressed();
        debug!(subject = %subject, operation, "Unchanged since last call, skipped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::reconcile_run;
    use crate::mirror::{MirrorCall, MirrorOp, RecordingMirror};
    use crate::model::{RunClass, RunKey};
    use crate::registry::default_flow;
    use crate::store::{encode_run, MemoryStore};

    const BLUEFORS: &str = "fridge_default_bluefors";

    fn settings() -> SyncSettings {
        SyncSettings {
            databases: DatabaseTargets {
                fab: Some("db-fab".to_string()),
                bluefors: Some("db-bf".to_string()),
                iceoxford: Some("db-io".to_string()),
            },
            ..SyncSettings::default()
        }
    }

    fn stored_run(store: &MemoryStore, class: RunClass) -> Run {
        let mut run = Run::new(RunKey::new(class, "001"), "Res-A", "kim", "2026-01-01").with_layers(default_flow());
        reconcile_run(&mut run);
        store.insert(&run.key.doc_id(), encode_run(&run).unwrap());
        run
    }

    async fn sync(engine: &SyncEngine, store: &MemoryStore, run: &mut Run, pre: &PreSnapshot) -> Result<SyncReport, TrackerError> {
        let mut signatures = SignatureCache::new();
        let metrics = SyncMetrics::new();
        let doc_id = run.key.doc_id();
        engine
            .synchronize(
                run,
                pre,
                SyncContext {
                    store,
                    doc_id: &doc_id,
                    signatures: &mut signatures,
                    metrics: &metrics,
                },
            )
            .await
    }

    #[tokio::test]
    async fn test_fridge_create_persists_linkage() {
        let store = MemoryStore::new();
        let mirror = Arc::new(RecordingMirror::new());
        let engine = SyncEngine::new(mirror.clone(), settings());
        let mut run = stored_run(&store, RunClass::Main);
        let pre = PreSnapshot::capture(&run);

        run.metadata
            .fridges
            .get_mut(BLUEFORS)
            .unwrap()
            .set("cooldown_start", "2026-02-02 08:00:00");
        let report = sync(&engine, &store, &mut run, &pre).await.unwrap();

        assert_eq!(report.created, vec![Subject::Fridge(BLUEFORS.to_string())]);
        let creates = mirror.calls_of(MirrorOp::Create);
        assert_eq!(
            creates,
            vec![MirrorCall::CreatePage {
                database_id: "db-bf".to_string(),
                properties: Properties::from([(
                    "Name".to_string(),
                    PropertyValue::Title("BF260202".to_string())
                )]),
            }]
        );
        assert_eq!(
            mirror.calls_of(MirrorOp::DateRange),
            vec![MirrorCall::UpdateDateRange {
                page_id: "00000000-0000-0000-0000-000000000001".to_string(),
                property: "Cooldown dates".to_string(),
                start: Some("2026-02-02".to_string()),
                end: None,
            }]
        );
        // no fab page yet, so nothing to relate to
        assert!(mirror.calls_of(MirrorOp::Relation).is_empty());

        let record = &run.metadata.fridges[BLUEFORS];
        assert_eq!(record.page_id(), "00000000-0000-0000-0000-000000000001");
        assert_eq!(record.page_url(), "https://www.notion.so/00000000000000000000000000000001");
        let doc = store.document("main-001").unwrap();
        let path = FieldPath::parse("metadata.measure.fridges.fridge_default_bluefors.external_page_id").unwrap();
        assert_eq!(
            crate::store::get_path(&doc, &path).and_then(FieldValue::as_str),
            Some("00000000-0000-0000-0000-000000000001")
        );
    }

    #[tokio::test]
    async fn test_fab_create_requires_identifying_fields() {
        let store = MemoryStore::new();
        let mirror = Arc::new(RecordingMirror::new());
        let engine = SyncEngine::new(mirror.clone(), settings());
        let mut run = stored_run(&store, RunClass::Main);
        let pre = PreSnapshot::capture(&run);

        run.metadata.fab.set("fabin", "2026-01-10 09:00:00");
        let err = sync(&engine, &store, &mut run, &pre).await.unwrap_err();

        match err {
            TrackerError::ConsistencyViolation { entity, missing } => {
                assert_eq!(entity, "fab");
                assert_eq!(missing, vec!["lot_id", "type"]);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(mirror.calls().is_empty());
    }

    #[tokio::test]
    async fn test_fab_create_links_existing_fridge_pages() {
        let store = MemoryStore::new();
        let mirror = Arc::new(RecordingMirror::new());
        let engine = SyncEngine::new(mirror.clone(), settings());
        let mut run = stored_run(&store, RunClass::Test);
        let fridge = run.metadata.fridges.get_mut(BLUEFORS).unwrap();
        fridge.set("cooldown_start", "2026-02-02 08:00:00");
        fridge.set_linkage("https://www.notion.so/bf", "bf-page");
        let pre = PreSnapshot::capture(&run);

        run.metadata.fab.set("fabin", "2026-01-10 09:00:00");
        run.metadata.fab.set("lot_id", "L-17");
        run.metadata.fab.set("type", "Resonator");
        let report = sync(&engine, &store, &mut run, &pre).await.unwrap();

        assert_eq!(report.created, vec![Subject::Fab]);
        let fab_page = run.metadata.fab.page_id().to_string();
        assert_eq!(
            mirror.calls_of(MirrorOp::Relation),
            vec![MirrorCall::SetRelation {
                page_id: "bf-page".to_string(),
                property: "Test run".to_string(),
                related_ids: vec![fab_page.clone()],
            }]
        );
        assert_eq!(
            mirror.calls_of(MirrorOp::UpdateProperties),
            vec![MirrorCall::UpdateProperties {
                page_id: fab_page,
                properties: Properties::from([
                    ("Chips".to_string(), PropertyValue::MultiSelect(vec!["C01".to_string()])),
                    ("# of chips".to_string(), PropertyValue::Number(Some(1.0))),
                ]),
            }]
        );
    }

    #[tokio::test]
    async fn test_unknown_relation_role_stops_before_any_call() {
        let store = MemoryStore::new();
        let mirror = Arc::new(RecordingMirror::new());
        let engine = SyncEngine::new(mirror.clone(), settings());
        let mut run = stored_run(&store, RunClass::Other("Pilot".to_string()));
        run.metadata.fab.set_linkage("https://www.notion.so/fab", "fab-page");
        let pre = PreSnapshot::capture(&run);

        run.metadata
            .fridges
            .get_mut(BLUEFORS)
            .unwrap()
            .set("cooldown_start", "2026-02-02 08:00:00");
        let err = sync(&engine, &store, &mut run, &pre).await.unwrap_err();

        assert!(matches!(err, TrackerError::UnknownRelationRole { .. }));
        assert!(mirror.calls().is_empty());
    }

    #[test]
    fn test_datetime_precision_converts_to_utc() {
        let engine = SyncEngine::new(
            Arc::new(RecordingMirror::new()),
            SyncSettings {
                date_precision: DatePrecision::Datetime,
                ..SyncSettings::default()
            },
        );
        assert_eq!(
            engine.boundary("2026-02-02 08:00:00").as_deref(),
            Some("2026-02-02T14:00:00+00:00")
        );
        assert_eq!(engine.boundary("  "), None);
    }
}
