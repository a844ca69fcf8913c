use crate::application::services::sync_engine::EngineStatus;
use crate::application::services::{NetworkMonitor, SyncEngine};
use crate::domain::entities::{
    ConflictChoice, DrainReport, DrainStop, EntityRecord, MutationDraft, SyncConflict, SyncTask,
};
use crate::domain::value_objects::{
    EntityId, EntityKind, TaskId, TaskOperation, TaskPayload, TaskPriority,
};
use crate::presentation::dto::sync::{
    BreakerStatusResponse, DrainReportResponse, EngineStatusResponse, EntityRecordResponse,
    ListLimitRequest, QueueCountsResponse, ResolveConflictRequest, SubmitMutationRequest,
    SyncConflictResponse, SyncTaskResponse,
};
use crate::presentation::dto::Validate;
use crate::shared::error::AppError;
use chrono::Utc;
use std::sync::Arc;

const DEFAULT_LIST_LIMIT: u32 = 100;

/// UI-facing facade over the sync engine. Translates wire-shaped requests
/// into domain types and engine results back into DTOs.
pub struct SyncHandler {
    engine: Arc<SyncEngine>,
    monitor: Arc<NetworkMonitor>,
}

impl SyncHandler {
    pub fn new(engine: Arc<SyncEngine>, monitor: Arc<NetworkMonitor>) -> Self {
        Self { engine, monitor }
    }

    /// Feeds a platform connectivity signal through. Returns true when the
    /// signal changed the tracked state.
    pub async fn report_connectivity(&self, online: bool, latency_ms: Option<u64>) -> bool {
        if online {
            self.monitor.report_online(latency_ms).await
        } else {
            self.monitor.report_offline().await
        }
    }

    pub async fn submit_mutation(
        &self,
        request: SubmitMutationRequest,
    ) -> Result<SyncTaskResponse, AppError> {
        request.validate().map_err(AppError::Validation)?;

        let operation = parse_operation(&request.operation)?;
        let payload = if operation == TaskOperation::Delete && request.data.is_null() {
            TaskPayload::default()
        } else {
            TaskPayload::from_object(&request.data, Utc::now()).map_err(AppError::Validation)?
        };
        let draft = MutationDraft::new(
            parse_entity_kind(&request.entity_type)?,
            parse_entity_id(&request.entity_id)?,
            operation,
            payload,
            request
                .priority
                .as_deref()
                .map(parse_priority)
                .transpose()?,
            request.max_retries,
        );

        let task = self.engine.submit(draft).await?;
        Ok(map_task(&task))
    }

    pub async fn sync_now(&self) -> Result<DrainReportResponse, AppError> {
        let report = self.engine.sync_now().await?;
        Ok(map_drain_report(&report))
    }

    pub async fn status(&self) -> Result<EngineStatusResponse, AppError> {
        let status = self.engine.status().await?;
        Ok(map_status(&status))
    }

    pub async fn list_pending_tasks(
        &self,
        request: ListLimitRequest,
    ) -> Result<Vec<SyncTaskResponse>, AppError> {
        request.validate().map_err(AppError::Validation)?;
        let tasks = self
            .engine
            .pending_tasks(request.limit.unwrap_or(DEFAULT_LIST_LIMIT))
            .await?;
        Ok(tasks.iter().map(map_task).collect())
    }

    pub async fn list_stuck_tasks(
        &self,
        request: ListLimitRequest,
    ) -> Result<Vec<SyncTaskResponse>, AppError> {
        request.validate().map_err(AppError::Validation)?;
        let tasks = self
            .engine
            .terminal_tasks(request.limit.unwrap_or(DEFAULT_LIST_LIMIT))
            .await?;
        Ok(tasks.iter().map(map_task).collect())
    }

    pub async fn retry_task(&self, task_id: &str) -> Result<SyncTaskResponse, AppError> {
        let task_id = TaskId::parse(task_id).map_err(AppError::Validation)?;
        let task = self.engine.retry_task(&task_id).await?;
        Ok(map_task(&task))
    }

    pub async fn list_unresolved_conflicts(
        &self,
        request: ListLimitRequest,
    ) -> Result<Vec<SyncConflictResponse>, AppError> {
        request.validate().map_err(AppError::Validation)?;
        let conflicts = self
            .engine
            .unresolved_conflicts(request.limit.unwrap_or(DEFAULT_LIST_LIMIT))
            .await?;
        conflicts.iter().map(map_conflict).collect()
    }

    pub async fn list_review_conflicts(
        &self,
        request: ListLimitRequest,
    ) -> Result<Vec<SyncConflictResponse>, AppError> {
        request.validate().map_err(AppError::Validation)?;
        let conflicts = self
            .engine
            .review_conflicts(request.limit.unwrap_or(DEFAULT_LIST_LIMIT))
            .await?;
        conflicts.iter().map(map_conflict).collect()
    }

    pub async fn list_entity_conflicts(
        &self,
        entity_type: &str,
        entity_id: &str,
    ) -> Result<Vec<SyncConflictResponse>, AppError> {
        let kind = parse_entity_kind(entity_type)?;
        let id = parse_entity_id(entity_id)?;
        let conflicts = self.engine.entity_conflicts(&kind, &id).await?;
        conflicts.iter().map(map_conflict).collect()
    }

    pub async fn resolve_conflict(
        &self,
        request: ResolveConflictRequest,
    ) -> Result<(), AppError> {
        request.validate().map_err(AppError::Validation)?;
        let choice = ConflictChoice::parse(&request.choice).map_err(AppError::Validation)?;
        self.engine
            .resolve_conflict(request.conflict_id, choice, request.merged_value)
            .await
    }

    pub async fn get_entity(
        &self,
        entity_type: &str,
        entity_id: &str,
    ) -> Result<Option<EntityRecordResponse>, AppError> {
        let kind = parse_entity_kind(entity_type)?;
        let id = parse_entity_id(entity_id)?;
        let record = self.engine.entity(&kind, &id).await?;
        Ok(record.as_ref().map(map_record))
    }

    pub async fn list_pending_entities(
        &self,
        request: ListLimitRequest,
    ) -> Result<Vec<EntityRecordResponse>, AppError> {
        request.validate().map_err(AppError::Validation)?;
        let records = self
            .engine
            .pending_entities(request.limit.unwrap_or(DEFAULT_LIST_LIMIT))
            .await?;
        Ok(records.iter().map(map_record).collect())
    }
}

fn parse_entity_kind(value: &str) -> Result<EntityKind, AppError> {
    EntityKind::parse(value).map_err(AppError::Validation)
}

fn parse_entity_id(value: &str) -> Result<EntityId, AppError> {
    EntityId::parse(value).map_err(AppError::Validation)
}

fn parse_operation(value: &str) -> Result<TaskOperation, AppError> {
    TaskOperation::parse(value).map_err(AppError::Validation)
}

fn parse_priority(value: &str) -> Result<TaskPriority, AppError> {
    TaskPriority::parse(value).map_err(AppError::Validation)
}

fn map_task(task: &SyncTask) -> SyncTaskResponse {
    SyncTaskResponse {
        id: task.id.to_string(),
        entity_type: task.entity_kind.as_str().to_string(),
        entity_id: task.entity_id.to_string(),
        operation: task.operation.as_str().to_string(),
        priority: task.priority.as_str().to_string(),
        status: task.status.as_str().to_string(),
        retry_count: task.retry_count,
        max_retries: task.max_retries,
        created_at: task.created_at.timestamp_millis(),
        last_attempt_at: task.last_attempt_at.map(|at| at.timestamp_millis()),
        not_before: task.not_before.map(|at| at.timestamp_millis()),
        last_error: task.last_error.clone(),
        payload: task.payload.values_json(),
    }
}

fn map_record(record: &EntityRecord) -> EntityRecordResponse {
    EntityRecordResponse {
        entity_type: record.entity_kind.as_str().to_string(),
        entity_id: record.entity_id.to_string(),
        local_version: record.local_version,
        remote_version: record.remote_version,
        sync_status: record.sync_state.as_str().to_string(),
        last_synced_at: record.last_synced_at.map(|at| at.timestamp_millis()),
        snapshot: record.snapshot.clone(),
    }
}

fn map_conflict(conflict: &SyncConflict) -> Result<SyncConflictResponse, AppError> {
    let id = conflict
        .id
        .ok_or_else(|| AppError::Internal("Conflict is missing its log id".to_string()))?;
    Ok(SyncConflictResponse {
        id,
        task_id: conflict.task_id.to_string(),
        entity_type: conflict.entity_kind.as_str().to_string(),
        entity_id: conflict.entity_id.to_string(),
        field: conflict.field.clone(),
        local_value: conflict.local_value.clone(),
        remote_value: conflict.remote_value.clone(),
        local_modified_at: conflict.local_modified_at.map(|at| at.timestamp_millis()),
        remote_modified_at: conflict.remote_modified_at.map(|at| at.timestamp_millis()),
        resolution: conflict.resolution.map(|r| r.as_str().to_string()),
        needs_review: conflict.needs_review,
        detected_at: conflict.detected_at.timestamp_millis(),
        resolved_at: conflict.resolved_at.map(|at| at.timestamp_millis()),
    })
}

fn map_drain_report(report: &DrainReport) -> DrainReportResponse {
    DrainReportResponse {
        drained: report.drained,
        synced: report.synced,
        conflicted: report.conflicted,
        failed: report.failed,
        requeued: report.requeued,
        stopped: match report.stopped {
            DrainStop::QueueEmpty => "queue_empty",
            DrainStop::BreakerOpen => "breaker_open",
            DrainStop::Offline => "offline",
            DrainStop::Stopped => "stopped",
        }
        .to_string(),
        started_at: report.started_at.timestamp_millis(),
        finished_at: report.finished_at.timestamp_millis(),
    }
}

fn map_status(status: &EngineStatus) -> EngineStatusResponse {
    EngineStatusResponse {
        running: status.running,
        online: status.connectivity.online,
        network_quality: status.connectivity.quality.as_str().to_string(),
        breaker: BreakerStatusResponse {
            state: status.breaker.state.as_str().to_string(),
            consecutive_failures: status.breaker.consecutive_failures,
            opened_at: status.breaker.opened_at.map(|at| at.timestamp_millis()),
            next_probe_at: status.breaker.next_probe_at.map(|at| at.timestamp_millis()),
        },
        queue: QueueCountsResponse {
            pending: status.queue.pending,
            in_flight: status.queue.in_flight,
            synced: status.queue.synced,
            failed: status.queue.failed,
            conflicted: status.queue.conflicted,
            immediate_pending: status.queue.pending_by_priority.immediate,
            high_pending: status.queue.pending_by_priority.high,
            normal_pending: status.queue.pending_by_priority.normal,
            low_pending: status.queue.pending_by_priority.low,
        },
        last_drain: status.last_drain.as_ref().map(map_drain_report),
    }
}
