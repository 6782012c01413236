// External sync engine
//
// After each save the run's watched entities (fab record, fridges) are
// compared between the snapshot taken at load and the saved read-back. The
// edges found drive page creation, renames, archiving and date-range updates
// on the mirror. Mirror failures never undo the local save.

pub mod edge;
pub mod engine;
pub mod policy;
pub mod repair;
pub mod signature;
pub mod snapshot;

pub use edge::{detect_edges, Edge, EdgeKind};
pub use engine::{
    DatabaseTargets, DatePrecision, SyncContext, SyncEngine, SyncReport, SyncSettings, CHIPS_PROPERTY,
    CHIP_COUNT_PROPERTY, TITLE_PROPERTY,
};
pub use policy::{BestEffort, SyncWarning};
pub use repair::{apply_repairs, plan_repairs, Repair};
pub use signature::{signature, Channel, SignatureCache};
pub use snapshot::{DateBinding, PostSnapshot, PreSnapshot, Snapshot, Subject, SubjectState};
