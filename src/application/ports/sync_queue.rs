use crate::domain::entities::{MutationDraft, QueueCounts, StaleRelease, SyncTask};
use crate::domain::value_objects::{EntityId, EntityKind, TaskId, TaskPayload};
use crate::shared::error::AppError;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

/// Durable mutation queue. Ordering contract: strict priority bands, FIFO by
/// enqueue time within a band, and at most one task per entity in flight.
#[async_trait]
pub trait SyncQueue: Send + Sync {
    /// Persists a draft. A pending task for the same entity and operation is
    /// coalesced into instead of creating a second task.
    async fn enqueue(&self, draft: MutationDraft) -> Result<SyncTask, AppError>;

    /// Pops the next eligible task and marks it in flight in the same step.
    /// Returns `None` when nothing is currently eligible.
    async fn dequeue_next(&self) -> Result<Option<SyncTask>, AppError>;

    /// Marks a task synced after backend confirmation.
    async fn ack(&self, task_id: &TaskId) -> Result<(), AppError>;

    /// Returns a task to pending with its retry count bumped and a backoff
    /// gate it may not be dequeued before.
    async fn requeue(&self, task_id: &TaskId, delay: Duration, error: &str)
        -> Result<(), AppError>;

    async fn mark_failed(&self, task_id: &TaskId, error: &str) -> Result<(), AppError>;

    async fn mark_conflicted(&self, task_id: &TaskId) -> Result<(), AppError>;

    /// Puts a conflicted task back in line with a resolver-produced payload.
    /// Retry count restarts because the payload is new work.
    async fn reenqueue_resolved(&self, task_id: &TaskId, payload: TaskPayload)
        -> Result<(), AppError>;

    /// Manual retry of a terminally failed task.
    async fn retry_failed(&self, task_id: &TaskId) -> Result<SyncTask, AppError>;

    async fn list_pending(&self, limit: u32) -> Result<Vec<SyncTask>, AppError>;

    async fn list_terminal(&self, limit: u32) -> Result<Vec<SyncTask>, AppError>;

    async fn counts(&self) -> Result<QueueCounts, AppError>;

    async fn get(&self, task_id: &TaskId) -> Result<Option<SyncTask>, AppError>;

    async fn has_active_for_entity(
        &self,
        entity_kind: &EntityKind,
        entity_id: &EntityId,
    ) -> Result<bool, AppError>;

    /// Rewrites the entity id on every non-terminal task for an entity after
    /// the backend assigned a different identifier.
    async fn remap_entity(
        &self,
        entity_kind: &EntityKind,
        old_id: &EntityId,
        new_id: &EntityId,
    ) -> Result<u64, AppError>;

    async fn purge_synced(&self, before: DateTime<Utc>) -> Result<u64, AppError>;

    /// Re-arms tasks stuck in flight longer than `older_than`, failing the
    /// ones that already exhausted their retries.
    async fn release_stale_in_flight(&self, older_than: Duration) -> Result<StaleRelease, AppError>;
}
