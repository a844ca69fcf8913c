use crate::domain::value_objects::{ConflictResolution, EntityId, EntityKind, TaskId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Audit record of one field-level divergence between a local edit and the
/// backend. `id` is assigned by the conflict log on insert.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SyncConflict {
    pub id: Option<i64>,
    pub task_id: TaskId,
    pub entity_kind: EntityKind,
    pub entity_id: EntityId,
    pub field: String,
    pub local_value: Value,
    pub remote_value: Value,
    pub local_modified_at: Option<DateTime<Utc>>,
    pub remote_modified_at: Option<DateTime<Utc>>,
    pub resolution: Option<ConflictResolution>,
    pub needs_review: bool,
    pub detected_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl SyncConflict {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        task_id: TaskId,
        entity_kind: EntityKind,
        entity_id: EntityId,
        field: String,
        local_value: Value,
        remote_value: Value,
        local_modified_at: Option<DateTime<Utc>>,
        remote_modified_at: Option<DateTime<Utc>>,
        resolution: Option<ConflictResolution>,
        needs_review: bool,
        detected_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: None,
            task_id,
            entity_kind,
            entity_id,
            field,
            local_value,
            remote_value,
            local_modified_at,
            remote_modified_at,
            resolution,
            needs_review,
            detected_at,
            resolved_at: None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved_at.is_some()
    }
}
