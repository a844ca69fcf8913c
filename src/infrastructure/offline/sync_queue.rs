use super::mappers::{datetime_to_millis, domain_task_from_row, now_at_millis};
use super::rows::SyncTaskRow;
use crate::application::ports::SyncQueue;
use crate::domain::entities::{MutationDraft, PriorityCounts, QueueCounts, StaleRelease, SyncTask};
use crate::domain::value_objects::{
    EntityId, EntityKind, TaskId, TaskPayload, TaskPriority, TaskStatus,
};
use crate::shared::error::AppError;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::{Row, SqlitePool};

/// SQLite-backed task queue. Every mutating statement commits before the
/// call returns, so a crash between enqueue and drain cannot lose work.
pub struct SqliteSyncQueue {
    pool: SqlitePool,
    default_max_retries: u32,
    refresh_created_at_on_coalesce: bool,
}

impl SqliteSyncQueue {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            default_max_retries: 5,
            refresh_created_at_on_coalesce: false,
        }
    }

    pub fn with_default_max_retries(mut self, max_retries: u32) -> Self {
        self.default_max_retries = max_retries;
        self
    }

    pub fn with_refresh_created_at_on_coalesce(mut self, refresh: bool) -> Self {
        self.refresh_created_at_on_coalesce = refresh;
        self
    }

    async fn fetch_by_id(&self, task_id: &TaskId) -> Result<Option<SyncTask>, AppError> {
        let row = sqlx::query_as::<_, SyncTaskRow>("SELECT * FROM sync_tasks WHERE id = ?1")
            .bind(task_id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.map(domain_task_from_row).transpose()
    }

    async fn require(&self, task_id: &TaskId) -> Result<SyncTask, AppError> {
        self.fetch_by_id(task_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Sync task {task_id} not found")))
    }

    async fn fetch_coalesce_target(
        &self,
        draft: &MutationDraft,
    ) -> Result<Option<SyncTask>, AppError> {
        let row = sqlx::query_as::<_, SyncTaskRow>(
            r#"
            SELECT * FROM sync_tasks
            WHERE entity_type = ?1 AND entity_id = ?2 AND operation = ?3
              AND status = 'pending'
            LIMIT 1
            "#,
        )
        .bind(draft.entity_kind.as_str())
        .bind(draft.entity_id.as_str())
        .bind(draft.operation.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.map(domain_task_from_row).transpose()
    }
}

#[async_trait]
impl SyncQueue for SqliteSyncQueue {
    async fn enqueue(&self, draft: MutationDraft) -> Result<SyncTask, AppError> {
        if let EntityKind::Unknown(kind) = &draft.entity_kind {
            return Err(AppError::Validation(format!("Unknown entity kind: {kind}")));
        }

        let now = now_at_millis();
        if let Some(existing) = self.fetch_coalesce_target(&draft).await? {
            // Same entity, same operation, still pending: fold the new edits
            // into the existing task instead of queueing a duplicate.
            let mut payload = existing.payload.clone();
            payload.merge_newer(&draft.fields);
            let priority = draft
                .priority
                .map_or(existing.priority, |incoming| incoming.min(existing.priority));
            let created_at = if self.refresh_created_at_on_coalesce {
                now
            } else {
                existing.created_at
            };
            let payload_json =
                serde_json::to_string(&payload).map_err(|e| AppError::Serialization(e.to_string()))?;
            sqlx::query(
                r#"
                UPDATE sync_tasks
                SET payload = ?1, priority = ?2, created_at = ?3, updated_at = ?4
                WHERE id = ?5
                "#,
            )
            .bind(&payload_json)
            .bind(priority.rank())
            .bind(datetime_to_millis(created_at))
            .bind(datetime_to_millis(now))
            .bind(existing.id.as_str())
            .execute(&self.pool)
            .await?;
            tracing::debug!(
                target: "sync::queue",
                task_id = %existing.id,
                entity = %existing.entity_id,
                "coalesced mutation into pending task"
            );
            return self.require(&existing.id).await;
        }

        let task = SyncTask::new(
            TaskId::generate(),
            draft.entity_kind,
            draft.entity_id,
            draft.operation,
            draft.fields,
            draft.priority.unwrap_or_default(),
            TaskStatus::Pending,
            0,
            draft.max_retries.unwrap_or(self.default_max_retries),
            None,
            None,
            now,
            None,
            now,
        );
        let payload_json = serde_json::to_string(&task.payload)
            .map_err(|e| AppError::Serialization(e.to_string()))?;
        sqlx::query(
            r#"
            INSERT INTO sync_tasks (
                id, entity_type, entity_id, operation, payload, priority,
                status, retry_count, max_retries, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'pending', 0, ?7, ?8, ?8)
            "#,
        )
        .bind(task.id.as_str())
        .bind(task.entity_kind.as_str())
        .bind(task.entity_id.as_str())
        .bind(task.operation.as_str())
        .bind(&payload_json)
        .bind(task.priority.rank())
        .bind(i64::from(task.max_retries))
        .bind(datetime_to_millis(now))
        .execute(&self.pool)
        .await?;
        Ok(task)
    }

    async fn dequeue_next(&self) -> Result<Option<SyncTask>, AppError> {
        let now = now_at_millis();
        // Strict priority, FIFO by insertion order within a band, skipping
        // backoff-gated tasks. An entity with a task in flight, or with an
        // earlier task still queued, is held back entirely: per-entity
        // mutations always go out in enqueue order, whatever their
        // priorities, so an update can never overtake its create.
        let row = sqlx::query_as::<_, SyncTaskRow>(
            r#"
            SELECT * FROM sync_tasks t
            WHERE t.status = 'pending'
              AND (t.not_before IS NULL OR t.not_before <= ?1)
              AND NOT EXISTS (
                  SELECT 1 FROM sync_tasks e
                  WHERE e.entity_type = t.entity_type
                    AND e.entity_id = t.entity_id
                    AND (e.status = 'in_flight'
                         OR (e.status = 'pending' AND e.seq < t.seq))
              )
            ORDER BY t.priority ASC, t.seq ASC
            LIMIT 1
            "#,
        )
        .bind(datetime_to_millis(now))
        .fetch_optional(&self.pool)
        .await?;
        let Some(row) = row else {
            return Ok(None);
        };

        sqlx::query(
            r#"
            UPDATE sync_tasks
            SET status = 'in_flight', last_attempt_at = ?1, updated_at = ?1
            WHERE id = ?2
            "#,
        )
        .bind(datetime_to_millis(now))
        .bind(&row.id)
        .execute(&self.pool)
        .await?;

        let mut task = domain_task_from_row(row)?;
        task.status = TaskStatus::InFlight;
        task.last_attempt_at = Some(now);
        task.updated_at = now;
        Ok(Some(task))
    }

    async fn ack(&self, task_id: &TaskId) -> Result<(), AppError> {
        let result = sqlx::query(
            "UPDATE sync_tasks SET status = 'synced', last_error = NULL, updated_at = ?1 WHERE id = ?2",
        )
        .bind(datetime_to_millis(Utc::now()))
        .bind(task_id.as_str())
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Sync task {task_id} not found")));
        }
        Ok(())
    }

    async fn requeue(
        &self,
        task_id: &TaskId,
        delay: Duration,
        error: &str,
    ) -> Result<(), AppError> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            UPDATE sync_tasks
            SET status = 'pending', retry_count = retry_count + 1,
                not_before = ?1, last_error = ?2, updated_at = ?3
            WHERE id = ?4
            "#,
        )
        .bind(datetime_to_millis(now + delay))
        .bind(error)
        .bind(datetime_to_millis(now))
        .bind(task_id.as_str())
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Sync task {task_id} not found")));
        }
        Ok(())
    }

    async fn mark_failed(&self, task_id: &TaskId, error: &str) -> Result<(), AppError> {
        let result = sqlx::query(
            "UPDATE sync_tasks SET status = 'failed', last_error = ?1, updated_at = ?2 WHERE id = ?3",
        )
        .bind(error)
        .bind(datetime_to_millis(Utc::now()))
        .bind(task_id.as_str())
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Sync task {task_id} not found")));
        }
        Ok(())
    }

    async fn mark_conflicted(&self, task_id: &TaskId) -> Result<(), AppError> {
        let result = sqlx::query(
            "UPDATE sync_tasks SET status = 'conflicted', updated_at = ?1 WHERE id = ?2",
        )
        .bind(datetime_to_millis(Utc::now()))
        .bind(task_id.as_str())
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Sync task {task_id} not found")));
        }
        Ok(())
    }

    async fn reenqueue_resolved(
        &self,
        task_id: &TaskId,
        payload: TaskPayload,
    ) -> Result<(), AppError> {
        let payload_json =
            serde_json::to_string(&payload).map_err(|e| AppError::Serialization(e.to_string()))?;
        let result = sqlx::query(
            r#"
            UPDATE sync_tasks
            SET payload = ?1, status = 'pending', retry_count = 0,
                not_before = NULL, last_error = NULL, updated_at = ?2
            WHERE id = ?3
            "#,
        )
        .bind(&payload_json)
        .bind(datetime_to_millis(Utc::now()))
        .bind(task_id.as_str())
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Sync task {task_id} not found")));
        }
        Ok(())
    }

    async fn retry_failed(&self, task_id: &TaskId) -> Result<SyncTask, AppError> {
        let task = self.require(task_id).await?;
        if task.status != TaskStatus::Failed {
            return Err(AppError::Validation(format!(
                "Task {task_id} is not failed (status: {})",
                task.status.as_str()
            )));
        }
        sqlx::query(
            r#"
            UPDATE sync_tasks
            SET status = 'pending', retry_count = 0, not_before = NULL,
                last_error = NULL, updated_at = ?1
            WHERE id = ?2
            "#,
        )
        .bind(datetime_to_millis(Utc::now()))
        .bind(task_id.as_str())
        .execute(&self.pool)
        .await?;
        self.require(task_id).await
    }

    async fn list_pending(&self, limit: u32) -> Result<Vec<SyncTask>, AppError> {
        let rows = sqlx::query_as::<_, SyncTaskRow>(
            r#"
            SELECT * FROM sync_tasks
            WHERE status IN ('pending', 'in_flight')
            ORDER BY priority ASC, seq ASC
            LIMIT ?1
            "#,
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(domain_task_from_row).collect()
    }

    async fn list_terminal(&self, limit: u32) -> Result<Vec<SyncTask>, AppError> {
        let rows = sqlx::query_as::<_, SyncTaskRow>(
            r#"
            SELECT * FROM sync_tasks
            WHERE status IN ('failed', 'conflicted')
            ORDER BY updated_at DESC
            LIMIT ?1
            "#,
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(domain_task_from_row).collect()
    }

    async fn counts(&self) -> Result<QueueCounts, AppError> {
        let status_rows =
            sqlx::query("SELECT status, COUNT(*) AS n FROM sync_tasks GROUP BY status")
                .fetch_all(&self.pool)
                .await?;
        let mut counts = QueueCounts::default();
        for row in status_rows {
            let status: String = row.try_get("status")?;
            let n: i64 = row.try_get("n")?;
            let n = n as u64;
            match status.as_str() {
                "pending" => counts.pending = n,
                "in_flight" => counts.in_flight = n,
                "synced" => counts.synced = n,
                "failed" => counts.failed = n,
                "conflicted" => counts.conflicted = n,
                _ => {}
            }
        }

        let priority_rows = sqlx::query(
            "SELECT priority, COUNT(*) AS n FROM sync_tasks WHERE status = 'pending' GROUP BY priority",
        )
        .fetch_all(&self.pool)
        .await?;
        let mut by_priority = PriorityCounts::default();
        for row in priority_rows {
            let rank: i64 = row.try_get("priority")?;
            let n: i64 = row.try_get("n")?;
            let n = n as u64;
            match TaskPriority::from_rank(rank) {
                Ok(TaskPriority::Immediate) => by_priority.immediate = n,
                Ok(TaskPriority::High) => by_priority.high = n,
                Ok(TaskPriority::Normal) => by_priority.normal = n,
                Ok(TaskPriority::Low) => by_priority.low = n,
                Err(_) => {}
            }
        }
        counts.pending_by_priority = by_priority;
        Ok(counts)
    }

    async fn get(&self, task_id: &TaskId) -> Result<Option<SyncTask>, AppError> {
        self.fetch_by_id(task_id).await
    }

    async fn has_active_for_entity(
        &self,
        entity_kind: &EntityKind,
        entity_id: &EntityId,
    ) -> Result<bool, AppError> {
        let row = sqlx::query(
            r#"
            SELECT 1 FROM sync_tasks
            WHERE entity_type = ?1 AND entity_id = ?2
              AND status IN ('pending', 'in_flight')
            LIMIT 1
            "#,
        )
        .bind(entity_kind.as_str())
        .bind(entity_id.as_str())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.is_some())
    }

    async fn remap_entity(
        &self,
        entity_kind: &EntityKind,
        old_id: &EntityId,
        new_id: &EntityId,
    ) -> Result<u64, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE sync_tasks
            SET entity_id = ?1, updated_at = ?2
            WHERE entity_type = ?3 AND entity_id = ?4
              AND status IN ('pending', 'in_flight', 'conflicted')
            "#,
        )
        .bind(new_id.as_str())
        .bind(datetime_to_millis(Utc::now()))
        .bind(entity_kind.as_str())
        .bind(old_id.as_str())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn purge_synced(&self, before: DateTime<Utc>) -> Result<u64, AppError> {
        let result =
            sqlx::query("DELETE FROM sync_tasks WHERE status = 'synced' AND updated_at < ?1")
                .bind(datetime_to_millis(before))
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected())
    }

    async fn release_stale_in_flight(&self, older_than: Duration) -> Result<StaleRelease, AppError> {
        let now = Utc::now();
        let cutoff = datetime_to_millis(now - older_than);
        let failed = sqlx::query(
            r#"
            UPDATE sync_tasks
            SET status = 'failed',
                last_error = 'Released from stale in-flight state with retries exhausted',
                updated_at = ?1
            WHERE status = 'in_flight' AND last_attempt_at <= ?2
              AND retry_count >= max_retries
            "#,
        )
        .bind(datetime_to_millis(now))
        .bind(cutoff)
        .execute(&self.pool)
        .await?
        .rows_affected();

        let rearmed = sqlx::query(
            r#"
            UPDATE sync_tasks
            SET status = 'pending', retry_count = retry_count + 1, updated_at = ?1
            WHERE status = 'in_flight' AND last_attempt_at <= ?2
            "#,
        )
        .bind(datetime_to_millis(now))
        .bind(cutoff)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if failed > 0 || rearmed > 0 {
            tracing::warn!(
                target: "sync::queue",
                rearmed,
                failed,
                "released tasks stranded in flight"
            );
        }
        Ok(StaleRelease { rearmed, failed })
    }
}
