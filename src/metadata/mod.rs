// Entity and stage metadata: declared schema, load-time coercion and
// reconciliation against the flow.

pub mod guard;
pub mod schema;
pub mod sync;

pub use guard::{coerce_metadata, coerce_record};
pub use schema::{normalize_key, FieldKind, FieldSpec, MetaScope};
pub use sync::{default_record, fill_declared, reconcile, reconcile_run, ReconcileSummary, Reconciled};
