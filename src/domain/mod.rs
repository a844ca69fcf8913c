pub mod entities;
pub mod value_objects;

pub use entities::{EntityRecord, MutationDraft, SyncConflict, SyncTask};
pub use value_objects::{EntityId, EntityKind, TaskId, TaskPriority, TaskStatus};
