pub mod commands;
pub mod entity_record;
pub mod reports;
pub mod sync_conflict;
pub mod sync_task;

pub use commands::{ConflictChoice, MutationDraft};
pub use entity_record::EntityRecord;
pub use reports::{
    ConnectivitySnapshot, DrainReport, DrainStop, PriorityCounts, QueueCounts, StaleRelease,
};
pub use sync_conflict::SyncConflict;
pub use sync_task::SyncTask;
