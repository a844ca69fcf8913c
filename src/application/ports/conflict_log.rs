use crate::domain::entities::SyncConflict;
use crate::domain::value_objects::{ConflictResolution, EntityId, EntityKind};
use crate::shared::error::AppError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Append-mostly audit log of detected conflicts.
#[async_trait]
pub trait ConflictLog: Send + Sync {
    async fn record(&self, conflicts: &[SyncConflict]) -> Result<(), AppError>;

    async fn list_unresolved(&self, limit: u32) -> Result<Vec<SyncConflict>, AppError>;

    /// Conflicts flagged for review, including ones the resolver already
    /// auto-resolved on a tie-break.
    async fn list_needs_review(&self, limit: u32) -> Result<Vec<SyncConflict>, AppError>;

    async fn list_for_entity(
        &self,
        entity_kind: &EntityKind,
        entity_id: &EntityId,
    ) -> Result<Vec<SyncConflict>, AppError>;

    async fn get(&self, conflict_id: i64) -> Result<Option<SyncConflict>, AppError>;

    async fn mark_resolved(
        &self,
        conflict_id: i64,
        resolution: ConflictResolution,
        resolved_at: DateTime<Utc>,
    ) -> Result<(), AppError>;
}
