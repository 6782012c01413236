// fab-tracker library - run tracking, metadata sync and page mirroring
// This exposes the core components for the CLI, tests and embedding

pub mod cli;
pub mod config;
pub mod errors;
pub mod http;
pub mod lifecycle;
pub mod metadata;
pub mod mirror;
pub mod model;
pub mod observability;
pub mod registry;
pub mod session;
pub mod store;
pub mod sync;
pub mod telemetry;
pub mod timestamp;

// Re-export key types for easy access
pub use config::TrackerConfig;
pub use errors::TrackerError;
pub use lifecycle::{handle_status_change, StepAddress, TransitionError, TransitionOutcome};
pub use metadata::{reconcile, reconcile_run, MetaScope};
pub use mirror::{MirrorError, NotionMirror, PageMirror, RecordingMirror};
pub use model::{Run, RunClass, RunKey, StepStatus};
pub use observability::{OperationTimer, SyncMetrics};
pub use registry::{default_flow, ensure_flow_ids, EntityKind, EntityRegistry};
pub use session::{RunSession, SaveReport};
pub use store::{DocumentStore, FileStore, FirestoreStore, MemoryStore, StoreError};
pub use sync::{detect_edges, SyncEngine, SyncReport, SyncSettings};
pub use telemetry::{generate_correlation_id, init_telemetry};
