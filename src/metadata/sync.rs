// Reconcile entity metadata against the current flow

use super::schema::MetaScope;
use crate::model::{EntityMetaMap, MetaRecord, Run, Stage};

/// Outcome of reconciling one entity map
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reconciled {
    pub meta: EntityMetaMap,
    pub created: Vec<String>,
    pub pruned: Vec<String>,
}

/// Summary over both entity contexts of a run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub created: Vec<String>,
    pub pruned: Vec<String>,
}

/// Record with every declared key present and empty
pub fn default_record(scope: MetaScope) -> MetaRecord {
    let mut record = MetaRecord::new();
    fill_declared(&mut record, scope);
    record
}

/// Add declared keys missing from `record` without touching existing ones
pub fn fill_declared(record: &mut MetaRecord, scope: MetaScope) {
    for key in scope.keys() {
        record.declare(key);
    }
}

/// Keep exactly the uids in `flow_uids`.
///
/// Retained records keep every field they had, new uids get a default record,
/// everything else is dropped. Applying it twice gives the same map.
pub fn reconcile(flow_uids: &[String], previous: &EntityMetaMap, scope: MetaScope) -> Reconciled {
    let mut result = Reconciled::default();

    for uid in flow_uids {
        if result.meta.contains_key(uid) {
            continue;
        }
        let record = match previous.get(uid) {
            Some(existing) => {
                let mut record = existing.clone();
                fill_declared(&mut record, scope);
                record
            }
            None => {
                result.created.push(uid.clone());
                default_record(scope)
            }
        };
        result.meta.insert(uid.clone(), record);
    }

    result.pruned = previous
        .keys()
        .filter(|uid| !result.meta.contains_key(*uid))
        .cloned()
        .collect();

    result
}

fn stage_uids(run: &Run, stage: Stage) -> Vec<String> {
    let Some(layer) = run.layer(stage) else {
        return Vec::new();
    };
    layer
        .substeps
        .iter()
        .filter_map(|substep| match stage {
            Stage::Package => substep.chip_uid.clone(),
            Stage::Measurement => substep.fridge_uid.clone(),
            _ => None,
        })
        .collect()
}

/// Reconcile chip and fridge metadata of `run` in place
pub fn reconcile_run(run: &mut Run) -> ReconcileSummary {
    let chips = reconcile(&stage_uids(run, Stage::Package), &run.metadata.chips, MetaScope::Chip);
    let fridges = reconcile(
        &stage_uids(run, Stage::Measurement),
        &run.metadata.fridges,
        MetaScope::Fridge,
    );

    fill_declared(&mut run.metadata.design, MetaScope::Design);
    fill_declared(&mut run.metadata.fab, MetaScope::Fab);

    let mut summary = ReconcileSummary::default();
    summary.created.extend(chips.created);
    summary.created.extend(fridges.created);
    summary.pruned.extend(chips.pruned);
    summary.pruned.extend(fridges.pruned);

    run.metadata.chips = chips.meta;
    run.metadata.fridges = fridges.meta;
    summary
}
