use crate::domain::entities::{EntityRecord, MutationDraft};
use crate::domain::value_objects::{EntityId, EntityKind, EntitySyncState};
use crate::shared::error::AppError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

/// Local store of entity snapshots the app reads while offline.
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Applies a local edit optimistically: merges field values into the
    /// snapshot, bumps `local_version` and marks the record pending.
    async fn apply_local(&self, draft: &MutationDraft) -> Result<EntityRecord, AppError>;

    async fn get(
        &self,
        entity_kind: &EntityKind,
        entity_id: &EntityId,
    ) -> Result<Option<EntityRecord>, AppError>;

    async fn set_sync_state(
        &self,
        entity_kind: &EntityKind,
        entity_id: &EntityId,
        state: EntitySyncState,
    ) -> Result<(), AppError>;

    /// Records backend confirmation. Only here does a record leave the
    /// pending set.
    async fn confirm_synced(
        &self,
        entity_kind: &EntityKind,
        entity_id: &EntityId,
        remote_version: i64,
        synced_at: DateTime<Utc>,
    ) -> Result<(), AppError>;

    /// Overwrites individual snapshot fields with values the backend won.
    /// `remote_version` is recorded when the caller knows it.
    async fn apply_remote_fields(
        &self,
        entity_kind: &EntityKind,
        entity_id: &EntityId,
        fields: &[(String, Value)],
        remote_version: Option<i64>,
    ) -> Result<(), AppError>;

    /// Moves a record to the identifier the backend assigned for it.
    async fn remap_identity(
        &self,
        entity_kind: &EntityKind,
        old_id: &EntityId,
        new_id: &EntityId,
    ) -> Result<(), AppError>;

    async fn list_pending(&self, limit: u32) -> Result<Vec<EntityRecord>, AppError>;

    async fn remove(&self, entity_kind: &EntityKind, entity_id: &EntityId)
        -> Result<(), AppError>;
}
