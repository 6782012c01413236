pub mod flow;
pub mod meta;
pub mod run;
pub mod status;

pub use flow::{Layer, Stage, Step, Substep};
pub use meta::{EntityMetaMap, MetaLocation, MetaRecord, RunMetadata, EXTERNAL_PAGE_ID, EXTERNAL_URL};
pub use run::{Run, RunClass, RunKey};
pub use status::{StepStatus, UnknownStatus, MAX_SLOT};
