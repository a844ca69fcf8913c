use crate::domain::value_objects::{
    EntityId, EntityKind, TaskId, TaskOperation, TaskPayload, TaskPriority, TaskStatus,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One queued mutation. `not_before` gates retry backoff, `created_at` keeps
/// its original value across coalesced edits so FIFO order is preserved.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SyncTask {
    pub id: TaskId,
    pub entity_kind: EntityKind,
    pub entity_id: EntityId,
    pub operation: TaskOperation,
    pub payload: TaskPayload,
    pub priority: TaskPriority,
    pub status: TaskStatus,
    pub retry_count: u32,
    pub max_retries: u32,
    pub not_before: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl SyncTask {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: TaskId,
        entity_kind: EntityKind,
        entity_id: EntityId,
        operation: TaskOperation,
        payload: TaskPayload,
        priority: TaskPriority,
        status: TaskStatus,
        retry_count: u32,
        max_retries: u32,
        not_before: Option<DateTime<Utc>>,
        last_error: Option<String>,
        created_at: DateTime<Utc>,
        last_attempt_at: Option<DateTime<Utc>>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            entity_kind,
            entity_id,
            operation,
            payload,
            priority,
            status,
            retry_count,
            max_retries,
            not_before,
            last_error,
            created_at,
            last_attempt_at,
            updated_at,
        }
    }

    pub fn has_exhausted_retries(&self) -> bool {
        self.retry_count >= self.max_retries
    }
}
