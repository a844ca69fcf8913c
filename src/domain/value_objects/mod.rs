pub mod conflict_resolution;
pub mod entity_id;
pub mod entity_kind;
pub mod entity_sync_state;
pub mod network_quality;
pub mod task_id;
pub mod task_operation;
pub mod task_payload;
pub mod task_priority;
pub mod task_status;

pub use conflict_resolution::ConflictResolution;
pub use entity_id::EntityId;
pub use entity_kind::EntityKind;
pub use entity_sync_state::EntitySyncState;
pub use network_quality::NetworkQuality;
pub use task_id::TaskId;
pub use task_operation::TaskOperation;
pub use task_payload::{FieldWrite, TaskPayload};
pub use task_priority::TaskPriority;
pub use task_status::TaskStatus;
