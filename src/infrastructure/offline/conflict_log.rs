use super::mappers::{datetime_to_millis, domain_conflict_from_row, value_column};
use super::rows::SyncConflictRow;
use crate::application::ports::ConflictLog;
use crate::domain::entities::SyncConflict;
use crate::domain::value_objects::{ConflictResolution, EntityId, EntityKind};
use crate::shared::error::AppError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

/// SQLite-backed audit log of field conflicts, auto-resolved and manual.
pub struct SqliteConflictLog {
    pool: SqlitePool,
}

impl SqliteConflictLog {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ConflictLog for SqliteConflictLog {
    async fn record(&self, conflicts: &[SyncConflict]) -> Result<(), AppError> {
        for conflict in conflicts {
            sqlx::query(
                r#"
                INSERT INTO sync_conflicts (
                    task_id, entity_type, entity_id, field,
                    local_value, remote_value,
                    local_modified_at, remote_modified_at,
                    resolution, needs_review, detected_at, resolved_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
                "#,
            )
            .bind(conflict.task_id.as_str())
            .bind(conflict.entity_kind.as_str())
            .bind(conflict.entity_id.as_str())
            .bind(&conflict.field)
            .bind(value_column(&conflict.local_value)?)
            .bind(value_column(&conflict.remote_value)?)
            .bind(conflict.local_modified_at.map(datetime_to_millis))
            .bind(conflict.remote_modified_at.map(datetime_to_millis))
            .bind(conflict.resolution.map(|r| r.as_str().to_string()))
            .bind(conflict.needs_review)
            .bind(datetime_to_millis(conflict.detected_at))
            .bind(conflict.resolved_at.map(datetime_to_millis))
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    async fn list_unresolved(&self, limit: u32) -> Result<Vec<SyncConflict>, AppError> {
        let rows = sqlx::query_as::<_, SyncConflictRow>(
            r#"
            SELECT * FROM sync_conflicts
            WHERE resolved_at IS NULL
            ORDER BY detected_at ASC
            LIMIT ?1
            "#,
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(domain_conflict_from_row).collect()
    }

    async fn list_needs_review(&self, limit: u32) -> Result<Vec<SyncConflict>, AppError> {
        let rows = sqlx::query_as::<_, SyncConflictRow>(
            r#"
            SELECT * FROM sync_conflicts
            WHERE needs_review = 1
            ORDER BY detected_at ASC
            LIMIT ?1
            "#,
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(domain_conflict_from_row).collect()
    }

    async fn list_for_entity(
        &self,
        entity_kind: &EntityKind,
        entity_id: &EntityId,
    ) -> Result<Vec<SyncConflict>, AppError> {
        let rows = sqlx::query_as::<_, SyncConflictRow>(
            r#"
            SELECT * FROM sync_conflicts
            WHERE entity_type = ?1 AND entity_id = ?2
            ORDER BY detected_at ASC
            "#,
        )
        .bind(entity_kind.as_str())
        .bind(entity_id.as_str())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(domain_conflict_from_row).collect()
    }

    async fn get(&self, conflict_id: i64) -> Result<Option<SyncConflict>, AppError> {
        let row = sqlx::query_as::<_, SyncConflictRow>("SELECT * FROM sync_conflicts WHERE id = ?1")
            .bind(conflict_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(domain_conflict_from_row).transpose()
    }

    async fn mark_resolved(
        &self,
        conflict_id: i64,
        resolution: ConflictResolution,
        resolved_at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let result = sqlx::query(
            r#"
            UPDATE sync_conflicts
            SET resolution = ?1, resolved_at = ?2, needs_review = 0
            WHERE id = ?3
            "#,
        )
        .bind(resolution.as_str())
        .bind(datetime_to_millis(resolved_at))
        .bind(conflict_id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!(
                "Conflict {conflict_id} not found"
            )));
        }
        Ok(())
    }
}
