mod conflict_log;
mod entity_store;
pub mod maintenance_job;
mod mappers;
mod rows;
mod sync_queue;

pub use conflict_log::SqliteConflictLog;
pub use entity_store::SqliteEntityStore;
pub use maintenance_job::{MaintenanceReport, QueueMaintenanceJob};
pub use sync_queue::SqliteSyncQueue;
