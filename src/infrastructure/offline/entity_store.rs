use super::mappers::{datetime_to_millis, domain_record_from_row};
use super::rows::EntityRecordRow;
use crate::application::ports::EntityStore;
use crate::domain::entities::{EntityRecord, MutationDraft};
use crate::domain::value_objects::{EntityId, EntityKind, EntitySyncState, TaskOperation};
use crate::shared::error::AppError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use sqlx::SqlitePool;

/// SQLite-backed store of local entity snapshots. Records stay in the
/// pending set until the backend confirms them, so a restart never drops
/// unsynced work.
pub struct SqliteEntityStore {
    pool: SqlitePool,
}

impl SqliteEntityStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn fetch(
        &self,
        entity_kind: &EntityKind,
        entity_id: &EntityId,
    ) -> Result<Option<EntityRecord>, AppError> {
        let row = sqlx::query_as::<_, EntityRecordRow>(
            "SELECT * FROM entity_records WHERE entity_type = ?1 AND entity_id = ?2",
        )
        .bind(entity_kind.as_str())
        .bind(entity_id.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.map(domain_record_from_row).transpose()
    }

    async fn write_snapshot(
        &self,
        entity_kind: &EntityKind,
        entity_id: &EntityId,
        snapshot: &Value,
        remote_version: Option<i64>,
        bump_local_version: bool,
        sync_state: Option<&EntitySyncState>,
    ) -> Result<(), AppError> {
        let snapshot_json =
            serde_json::to_string(snapshot).map_err(|e| AppError::Serialization(e.to_string()))?;
        let result = sqlx::query(
            r#"
            UPDATE entity_records
            SET snapshot = ?1,
                local_version = local_version + ?2,
                remote_version = COALESCE(?3, remote_version),
                sync_state = COALESCE(?4, sync_state),
                updated_at = ?5
            WHERE entity_type = ?6 AND entity_id = ?7
            "#,
        )
        .bind(&snapshot_json)
        .bind(i64::from(bump_local_version))
        .bind(remote_version)
        .bind(sync_state.map(|state| state.as_str().to_string()))
        .bind(datetime_to_millis(Utc::now()))
        .bind(entity_kind.as_str())
        .bind(entity_id.as_str())
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!(
                "Entity record {}/{entity_id} not found",
                entity_kind.as_str()
            )));
        }
        Ok(())
    }
}

fn merged_snapshot(base: &Value, draft: &MutationDraft) -> Value {
    let mut object = base
        .as_object()
        .cloned()
        .unwrap_or_else(Map::new);
    for (field, write) in draft.fields.fields() {
        object.insert(field.clone(), write.value.clone());
    }
    Value::Object(object)
}

#[async_trait]
impl EntityStore for SqliteEntityStore {
    async fn apply_local(&self, draft: &MutationDraft) -> Result<EntityRecord, AppError> {
        let now = Utc::now();
        let existing = self.fetch(&draft.entity_kind, &draft.entity_id).await?;

        match existing {
            Some(record) => {
                let snapshot = if draft.operation == TaskOperation::Delete {
                    // Keep the last known snapshot around until the delete is
                    // confirmed, for display and for conflict comparison.
                    record.snapshot.clone()
                } else {
                    merged_snapshot(&record.snapshot, draft)
                };
                self.write_snapshot(
                    &draft.entity_kind,
                    &draft.entity_id,
                    &snapshot,
                    None,
                    true,
                    Some(&EntitySyncState::Pending),
                )
                .await?;
                self.fetch(&draft.entity_kind, &draft.entity_id)
                    .await?
                    .ok_or_else(|| {
                        AppError::Internal("Entity record vanished during update".to_string())
                    })
            }
            None => {
                let snapshot = merged_snapshot(&Value::Null, draft);
                let snapshot_json = serde_json::to_string(&snapshot)
                    .map_err(|e| AppError::Serialization(e.to_string()))?;
                sqlx::query(
                    r#"
                    INSERT INTO entity_records (
                        entity_type, entity_id, local_version, snapshot,
                        sync_state, updated_at
                    ) VALUES (?1, ?2, 1, ?3, 'pending', ?4)
                    "#,
                )
                .bind(draft.entity_kind.as_str())
                .bind(draft.entity_id.as_str())
                .bind(&snapshot_json)
                .bind(datetime_to_millis(now))
                .execute(&self.pool)
                .await?;
                Ok(EntityRecord::new(
                    draft.entity_kind.clone(),
                    draft.entity_id.clone(),
                    1,
                    None,
                    snapshot,
                    EntitySyncState::Pending,
                    None,
                    now,
                ))
            }
        }
    }

    async fn get(
        &self,
        entity_kind: &EntityKind,
        entity_id: &EntityId,
    ) -> Result<Option<EntityRecord>, AppError> {
        self.fetch(entity_kind, entity_id).await
    }

    async fn set_sync_state(
        &self,
        entity_kind: &EntityKind,
        entity_id: &EntityId,
        state: EntitySyncState,
    ) -> Result<(), AppError> {
        let result = sqlx::query(
            r#"
            UPDATE entity_records
            SET sync_state = ?1, updated_at = ?2
            WHERE entity_type = ?3 AND entity_id = ?4
            "#,
        )
        .bind(state.as_str())
        .bind(datetime_to_millis(Utc::now()))
        .bind(entity_kind.as_str())
        .bind(entity_id.as_str())
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!(
                "Entity record {}/{entity_id} not found",
                entity_kind.as_str()
            )));
        }
        Ok(())
    }

    async fn confirm_synced(
        &self,
        entity_kind: &EntityKind,
        entity_id: &EntityId,
        remote_version: i64,
        synced_at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let result = sqlx::query(
            r#"
            UPDATE entity_records
            SET sync_state = 'synced', remote_version = ?1,
                last_synced_at = ?2, updated_at = ?3
            WHERE entity_type = ?4 AND entity_id = ?5
            "#,
        )
        .bind(remote_version)
        .bind(datetime_to_millis(synced_at))
        .bind(datetime_to_millis(Utc::now()))
        .bind(entity_kind.as_str())
        .bind(entity_id.as_str())
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!(
                "Entity record {}/{entity_id} not found",
                entity_kind.as_str()
            )));
        }
        Ok(())
    }

    async fn apply_remote_fields(
        &self,
        entity_kind: &EntityKind,
        entity_id: &EntityId,
        fields: &[(String, Value)],
        remote_version: Option<i64>,
    ) -> Result<(), AppError> {
        let record = self.fetch(entity_kind, entity_id).await?.ok_or_else(|| {
            AppError::NotFound(format!(
                "Entity record {}/{entity_id} not found",
                entity_kind.as_str()
            ))
        })?;
        let mut object = record
            .snapshot
            .as_object()
            .cloned()
            .unwrap_or_else(Map::new);
        for (field, value) in fields {
            object.insert(field.clone(), value.clone());
        }
        self.write_snapshot(
            entity_kind,
            entity_id,
            &Value::Object(object),
            remote_version,
            false,
            None,
        )
        .await
    }

    async fn remap_identity(
        &self,
        entity_kind: &EntityKind,
        old_id: &EntityId,
        new_id: &EntityId,
    ) -> Result<(), AppError> {
        // If the server id already has a local row, the remapped record
        // supersedes it.
        sqlx::query("DELETE FROM entity_records WHERE entity_type = ?1 AND entity_id = ?2")
            .bind(entity_kind.as_str())
            .bind(new_id.as_str())
            .execute(&self.pool)
            .await?;
        let result = sqlx::query(
            r#"
            UPDATE entity_records
            SET entity_id = ?1, updated_at = ?2
            WHERE entity_type = ?3 AND entity_id = ?4
            "#,
        )
        .bind(new_id.as_str())
        .bind(datetime_to_millis(Utc::now()))
        .bind(entity_kind.as_str())
        .bind(old_id.as_str())
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!(
                "Entity record {}/{old_id} not found",
                entity_kind.as_str()
            )));
        }
        Ok(())
    }

    async fn list_pending(&self, limit: u32) -> Result<Vec<EntityRecord>, AppError> {
        let rows = sqlx::query_as::<_, EntityRecordRow>(
            r#"
            SELECT * FROM entity_records
            WHERE sync_state IN ('pending', 'in_flight', 'conflicted', 'error')
            ORDER BY updated_at ASC
            LIMIT ?1
            "#,
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(domain_record_from_row).collect()
    }

    async fn remove(
        &self,
        entity_kind: &EntityKind,
        entity_id: &EntityId,
    ) -> Result<(), AppError> {
        sqlx::query("DELETE FROM entity_records WHERE entity_type = ?1 AND entity_id = ?2")
            .bind(entity_kind.as_str())
            .bind(entity_id.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
