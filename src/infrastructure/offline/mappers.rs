use super::rows::{EntityRecordRow, SyncConflictRow, SyncTaskRow};
use crate::domain::entities::{EntityRecord, SyncConflict, SyncTask};
use crate::domain::value_objects::{
    ConflictResolution, EntityId, EntityKind, EntitySyncState, TaskId, TaskOperation, TaskPayload,
    TaskPriority, TaskStatus,
};
use crate::shared::error::AppError;
use chrono::{DateTime, Utc};
use serde_json::Value;

pub fn millis_to_datetime(millis: i64) -> Result<DateTime<Utc>, AppError> {
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| AppError::Deserialization(format!("Timestamp out of range: {millis}")))
}

pub fn datetime_to_millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

/// Current time truncated to the precision the store keeps. Tasks built in
/// memory then compare equal to the same task read back from a row.
pub fn now_at_millis() -> DateTime<Utc> {
    let now = Utc::now();
    DateTime::from_timestamp_millis(now.timestamp_millis()).unwrap_or(now)
}

pub fn domain_task_from_row(row: SyncTaskRow) -> Result<SyncTask, AppError> {
    let id = TaskId::new(row.id).map_err(AppError::Validation)?;
    let entity_id = EntityId::new(row.entity_id).map_err(AppError::Validation)?;
    let operation = TaskOperation::parse(&row.operation).map_err(AppError::Deserialization)?;
    let payload = TaskPayload::from_json_str(&row.payload).map_err(AppError::Deserialization)?;
    let priority = TaskPriority::from_rank(row.priority).map_err(AppError::Deserialization)?;

    Ok(SyncTask::new(
        id,
        EntityKind::from(row.entity_type.as_str()),
        entity_id,
        operation,
        payload,
        priority,
        TaskStatus::from(row.status.as_str()),
        u32::try_from(row.retry_count)
            .map_err(|_| AppError::Deserialization("Negative retry_count".to_string()))?,
        u32::try_from(row.max_retries)
            .map_err(|_| AppError::Deserialization("Negative max_retries".to_string()))?,
        row.not_before.map(millis_to_datetime).transpose()?,
        row.last_error,
        millis_to_datetime(row.created_at)?,
        row.last_attempt_at.map(millis_to_datetime).transpose()?,
        millis_to_datetime(row.updated_at)?,
    ))
}

pub fn domain_record_from_row(row: EntityRecordRow) -> Result<EntityRecord, AppError> {
    let entity_id = EntityId::new(row.entity_id).map_err(AppError::Validation)?;
    let snapshot: Value = serde_json::from_str(&row.snapshot)
        .map_err(|err| AppError::Deserialization(err.to_string()))?;

    Ok(EntityRecord::new(
        EntityKind::from(row.entity_type.as_str()),
        entity_id,
        row.local_version,
        row.remote_version,
        snapshot,
        EntitySyncState::from(row.sync_state.as_str()),
        row.last_synced_at.map(millis_to_datetime).transpose()?,
        millis_to_datetime(row.updated_at)?,
    ))
}

pub fn domain_conflict_from_row(row: SyncConflictRow) -> Result<SyncConflict, AppError> {
    let task_id = TaskId::new(row.task_id).map_err(AppError::Validation)?;
    let entity_id = EntityId::new(row.entity_id).map_err(AppError::Validation)?;
    let resolution = row
        .resolution
        .as_deref()
        .map(ConflictResolution::parse)
        .transpose()
        .map_err(AppError::Deserialization)?;

    let mut conflict = SyncConflict::new(
        task_id,
        EntityKind::from(row.entity_type.as_str()),
        entity_id,
        row.field,
        parse_value_column(row.local_value)?,
        parse_value_column(row.remote_value)?,
        row.local_modified_at.map(millis_to_datetime).transpose()?,
        row.remote_modified_at.map(millis_to_datetime).transpose()?,
        resolution,
        row.needs_review,
        millis_to_datetime(row.detected_at)?,
    );
    conflict.id = Some(row.id);
    conflict.resolved_at = row.resolved_at.map(millis_to_datetime).transpose()?;
    Ok(conflict)
}

fn parse_value_column(column: Option<String>) -> Result<Value, AppError> {
    match column {
        Some(text) => {
            serde_json::from_str(&text).map_err(|err| AppError::Deserialization(err.to_string()))
        }
        None => Ok(Value::Null),
    }
}

pub fn value_column(value: &Value) -> Result<Option<String>, AppError> {
    if value.is_null() {
        return Ok(None);
    }
    serde_json::to_string(value)
        .map(Some)
        .map_err(|err| AppError::Serialization(err.to_string()))
}
