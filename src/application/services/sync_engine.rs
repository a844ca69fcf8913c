use crate::application::ports::remote_backend::RemoteConflict;
use crate::application::ports::{
    ConflictLog, EntityStore, PushError, PushOutcome, RemoteBackend, SyncEventSink, SyncQueue,
};
use crate::application::services::conflict_resolver::{ConflictResolver, PlanOutcome};
use crate::application::services::network_monitor::NetworkMonitor;
use crate::application::services::retry::RetryPolicy;
use crate::domain::entities::{
    ConflictChoice, ConnectivitySnapshot, DrainReport, DrainStop, EntityRecord, MutationDraft,
    QueueCounts, SyncConflict, SyncTask,
};
use crate::domain::value_objects::{
    ConflictResolution, EntityId, EntityKind, EntitySyncState, FieldWrite, TaskId, TaskOperation,
    TaskPayload,
};
use crate::shared::circuit_breaker::{BreakerSnapshot, CallPermit, CircuitBreaker};
use crate::shared::config::SyncConfig;
use crate::shared::error::AppError;
use chrono::Utc;
use rand::Rng;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::timeout;

#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    pub running: bool,
    pub connectivity: ConnectivitySnapshot,
    pub breaker: BreakerSnapshot,
    pub queue: QueueCounts,
    pub last_drain: Option<DrainReport>,
}

/// Drives queued mutations to the backend. One drain pass runs at a time;
/// connectivity and the circuit breaker gate every backend call.
pub struct SyncEngine {
    queue: Arc<dyn SyncQueue>,
    entities: Arc<dyn EntityStore>,
    conflicts: Arc<dyn ConflictLog>,
    backend: Arc<dyn RemoteBackend>,
    monitor: Arc<NetworkMonitor>,
    breaker: Arc<CircuitBreaker>,
    resolver: ConflictResolver,
    retry: RetryPolicy,
    sink: Option<Arc<dyn SyncEventSink>>,
    config: SyncConfig,
    drain_gate: Mutex<()>,
    stopped: AtomicBool,
    scheduler: Mutex<Option<JoinHandle<()>>>,
    last_drain: RwLock<Option<DrainReport>>,
}

impl SyncEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        queue: Arc<dyn SyncQueue>,
        entities: Arc<dyn EntityStore>,
        conflicts: Arc<dyn ConflictLog>,
        backend: Arc<dyn RemoteBackend>,
        monitor: Arc<NetworkMonitor>,
        breaker: Arc<CircuitBreaker>,
        sink: Option<Arc<dyn SyncEventSink>>,
        config: SyncConfig,
    ) -> Self {
        let retry = RetryPolicy::new(config.backoff.clone());
        Self {
            queue,
            entities,
            conflicts,
            backend,
            monitor,
            breaker,
            resolver: ConflictResolver::new(),
            retry,
            sink,
            config,
            drain_gate: Mutex::new(()),
            stopped: AtomicBool::new(false),
            scheduler: Mutex::new(None),
            last_drain: RwLock::new(None),
        }
    }

    /// Queues a mutation durably, then applies it to the local store. The
    /// task is on disk before this returns, so a crash cannot lose the edit.
    pub async fn submit(&self, draft: MutationDraft) -> Result<SyncTask, AppError> {
        let task = self.queue.enqueue(draft.clone()).await?;
        self.entities.apply_local(&draft).await?;
        tracing::debug!(
            target: "sync::engine",
            task_id = %task.id,
            entity = %task.entity_id,
            operation = task.operation.as_str(),
            "mutation queued"
        );
        Ok(task)
    }

    /// Runs one drain pass. Concurrent callers are serialized; each gets its
    /// own pass and report.
    pub async fn sync_now(&self) -> Result<DrainReport, AppError> {
        let _guard = self.drain_gate.lock().await;
        self.drain().await
    }

    async fn drain(&self) -> Result<DrainReport, AppError> {
        let started_at = Utc::now();
        let mut report = DrainReport {
            drained: 0,
            synced: 0,
            conflicted: 0,
            failed: 0,
            requeued: 0,
            stopped: DrainStop::QueueEmpty,
            started_at,
            finished_at: started_at,
        };

        loop {
            if self.stopped.load(Ordering::SeqCst) {
                report.stopped = DrainStop::Stopped;
                break;
            }
            if !self.monitor.is_usable().await {
                report.stopped = DrainStop::Offline;
                break;
            }
            let permit = self.breaker.check().await;
            if let CallPermit::Rejected { next_probe_at } = permit {
                tracing::debug!(
                    target: "sync::engine",
                    next_probe_at = ?next_probe_at,
                    "breaker open, drain deferred"
                );
                report.stopped = DrainStop::BreakerOpen;
                break;
            }

            let Some(task) = self.queue.dequeue_next().await? else {
                report.stopped = DrainStop::QueueEmpty;
                break;
            };

            // A half-open probe must stay a single call.
            if permit == CallPermit::Allowed
                && self.config.batch_size > 1
                && self.backend.supports_batching()
            {
                let (batch, leftover) = self.collect_batch(task).await?;
                self.process_batch(batch, &mut report).await?;
                if let Some(extra) = leftover {
                    self.process_single(extra, &mut report).await?;
                }
            } else {
                self.process_single(task, &mut report).await?;
            }

            tokio::task::yield_now().await;
        }

        report.finished_at = Utc::now();
        *self.last_drain.write().await = Some(report.clone());
        tracing::info!(
            target: "sync::engine",
            drained = report.drained,
            synced = report.synced,
            conflicted = report.conflicted,
            failed = report.failed,
            requeued = report.requeued,
            stopped = ?report.stopped,
            "drain pass finished"
        );
        self.emit(|sink| sink.drain_finished(&report));
        Ok(report)
    }

    /// Pulls further pending tasks of the same entity kind, up to the batch
    /// size. A task of a different kind comes back as leftover.
    async fn collect_batch(
        &self,
        first: SyncTask,
    ) -> Result<(Vec<SyncTask>, Option<SyncTask>), AppError> {
        let kind = first.entity_kind.clone();
        let mut batch = vec![first];
        let mut leftover = None;
        while batch.len() < self.config.batch_size as usize {
            let Some(next) = self.queue.dequeue_next().await? else {
                break;
            };
            if next.entity_kind == kind {
                batch.push(next);
            } else {
                leftover = Some(next);
                break;
            }
        }
        Ok((batch, leftover))
    }

    async fn process_single(
        &self,
        task: SyncTask,
        report: &mut DrainReport,
    ) -> Result<(), AppError> {
        report.drained += 1;
        self.entities
            .set_sync_state(&task.entity_kind, &task.entity_id, EntitySyncState::InFlight)
            .await?;
        let limit = std::time::Duration::from_secs(self.config.call_timeout_secs);
        let result = match timeout(limit, self.backend.push(&task)).await {
            Ok(result) => result,
            Err(_) => Err(PushError::Transport(format!(
                "backend call timed out after {}s",
                self.config.call_timeout_secs
            ))),
        };
        self.handle_push_result(task, result, report).await
    }

    async fn process_batch(
        &self,
        batch: Vec<SyncTask>,
        report: &mut DrainReport,
    ) -> Result<(), AppError> {
        report.drained += batch.len() as u64;
        for task in &batch {
            self.entities
                .set_sync_state(&task.entity_kind, &task.entity_id, EntitySyncState::InFlight)
                .await?;
        }
        let limit = std::time::Duration::from_secs(self.config.call_timeout_secs);
        let outcome = match timeout(limit, self.backend.push_batch(&batch)).await {
            Ok(result) => result,
            Err(_) => Err(PushError::Transport(format!(
                "batch call timed out after {}s",
                self.config.call_timeout_secs
            ))),
        };
        match outcome {
            Ok(results) => {
                let mut by_id: HashMap<String, Result<PushOutcome, PushError>> = results
                    .into_iter()
                    .map(|(id, result)| (String::from(id), result))
                    .collect();
                for task in batch {
                    let result = by_id.remove(task.id.as_str()).unwrap_or_else(|| {
                        Err(PushError::Transport(
                            "backend returned no result for task".to_string(),
                        ))
                    });
                    self.handle_push_result(task, result, report).await?;
                }
            }
            Err(err) => {
                // The exchange itself failed; one breaker strike covers it.
                self.note_breaker_failure().await;
                let reason = err.to_string();
                for task in batch {
                    self.requeue_or_fail(task, &reason, report).await?;
                }
            }
        }
        Ok(())
    }

    async fn handle_push_result(
        &self,
        task: SyncTask,
        result: Result<PushOutcome, PushError>,
        report: &mut DrainReport,
    ) -> Result<(), AppError> {
        match result {
            Ok(PushOutcome::Applied { remote_version, .. }) => {
                self.note_breaker_success().await;
                self.finish_synced(task, remote_version, report).await
            }
            Ok(PushOutcome::Conflict(remote)) => {
                // The backend answered; a conflict says nothing about
                // transport health.
                self.note_breaker_success().await;
                self.apply_resolution(task, remote, report).await
            }
            Err(PushError::Rejected(reason)) => {
                self.note_breaker_success().await;
                self.finish_failed(task, &reason, report).await
            }
            Err(PushError::Transport(reason)) => {
                self.note_breaker_failure().await;
                self.requeue_or_fail(task, &reason, report).await
            }
        }
    }

    async fn finish_synced(
        &self,
        task: SyncTask,
        remote_version: i64,
        report: &mut DrainReport,
    ) -> Result<(), AppError> {
        self.queue.ack(&task.id).await?;
        if task.operation == TaskOperation::Delete {
            self.entities
                .remove(&task.entity_kind, &task.entity_id)
                .await?;
        } else if self
            .queue
            .has_active_for_entity(&task.entity_kind, &task.entity_id)
            .await?
        {
            // More edits queued for this entity; note the confirmed version
            // but keep the record in the pending set.
            self.entities
                .apply_remote_fields(&task.entity_kind, &task.entity_id, &[], Some(remote_version))
                .await?;
            self.entities
                .set_sync_state(&task.entity_kind, &task.entity_id, EntitySyncState::Pending)
                .await?;
        } else {
            self.entities
                .confirm_synced(&task.entity_kind, &task.entity_id, remote_version, Utc::now())
                .await?;
        }
        tracing::info!(target: "sync::engine", task_id = %task.id, "task synced");
        report.synced += 1;
        self.emit(|sink| sink.task_synced(&task));
        Ok(())
    }

    async fn finish_failed(
        &self,
        task: SyncTask,
        reason: &str,
        report: &mut DrainReport,
    ) -> Result<(), AppError> {
        self.queue.mark_failed(&task.id, reason).await?;
        self.entities
            .set_sync_state(&task.entity_kind, &task.entity_id, EntitySyncState::Error)
            .await?;
        tracing::warn!(
            target: "sync::engine",
            task_id = %task.id,
            error = reason,
            "task failed permanently"
        );
        report.failed += 1;
        self.emit(|sink| sink.task_failed(&task.id, reason, true));
        Ok(())
    }

    async fn requeue_or_fail(
        &self,
        task: SyncTask,
        reason: &str,
        report: &mut DrainReport,
    ) -> Result<(), AppError> {
        if task.has_exhausted_retries() {
            return self.finish_failed(task, reason, report).await;
        }
        let delay = self.retry.delay_for(task.priority, task.retry_count);
        self.queue.requeue(&task.id, delay, reason).await?;
        self.entities
            .set_sync_state(&task.entity_kind, &task.entity_id, EntitySyncState::Pending)
            .await?;
        tracing::debug!(
            target: "sync::engine",
            task_id = %task.id,
            retry_count = task.retry_count + 1,
            delay_secs = delay.num_seconds(),
            error = reason,
            "task requeued after transient failure"
        );
        report.requeued += 1;
        self.emit(|sink| sink.task_failed(&task.id, reason, false));
        Ok(())
    }

    async fn apply_resolution(
        &self,
        task: SyncTask,
        remote: RemoteConflict,
        report: &mut DrainReport,
    ) -> Result<(), AppError> {
        let plan = self.resolver.resolve(&task, &remote, Utc::now());
        if !plan.records.is_empty() {
            self.conflicts.record(&plan.records).await?;
        }
        match plan.outcome {
            PlanOutcome::Resend => {
                if !plan.accept_remote.is_empty() {
                    self.entities
                        .apply_remote_fields(
                            &task.entity_kind,
                            &task.entity_id,
                            &plan.accept_remote,
                            Some(plan.remote_version),
                        )
                        .await?;
                }
                self.queue
                    .reenqueue_resolved(&task.id, plan.resend)
                    .await?;
                self.entities
                    .set_sync_state(&task.entity_kind, &task.entity_id, EntitySyncState::Pending)
                    .await?;
                tracing::info!(
                    target: "sync::engine",
                    task_id = %task.id,
                    records = plan.records.len(),
                    "conflict auto-resolved, resending surviving fields"
                );
                report.requeued += 1;
                Ok(())
            }
            PlanOutcome::AcceptRemote => {
                let kind = task.entity_kind.clone();
                let mut entity_id = task.entity_id.clone();
                if let Some(new_id) = &plan.remap_to {
                    self.entities
                        .remap_identity(&kind, &entity_id, new_id)
                        .await?;
                    self.queue.remap_entity(&kind, &entity_id, new_id).await?;
                    tracing::info!(
                        target: "sync::engine",
                        old_id = %entity_id,
                        new_id = %new_id,
                        "entity identity remapped to server copy"
                    );
                    entity_id = new_id.clone();
                }
                if !plan.accept_remote.is_empty() {
                    self.entities
                        .apply_remote_fields(
                            &kind,
                            &entity_id,
                            &plan.accept_remote,
                            Some(plan.remote_version),
                        )
                        .await?;
                }
                self.queue.ack(&task.id).await?;
                if task.operation == TaskOperation::Delete && remote.server_state.is_null() {
                    self.entities.remove(&kind, &entity_id).await?;
                } else if self.queue.has_active_for_entity(&kind, &entity_id).await? {
                    self.entities
                        .set_sync_state(&kind, &entity_id, EntitySyncState::Pending)
                        .await?;
                } else {
                    self.entities
                        .confirm_synced(&kind, &entity_id, plan.remote_version, Utc::now())
                        .await?;
                }
                tracing::info!(
                    target: "sync::engine",
                    task_id = %task.id,
                    records = plan.records.len(),
                    "conflict resolved in favor of the backend"
                );
                report.synced += 1;
                self.emit(|sink| sink.task_synced(&task));
                Ok(())
            }
            PlanOutcome::Manual => {
                self.queue.mark_conflicted(&task.id).await?;
                self.entities
                    .set_sync_state(
                        &task.entity_kind,
                        &task.entity_id,
                        EntitySyncState::Conflicted,
                    )
                    .await?;
                tracing::warn!(
                    target: "sync::engine",
                    task_id = %task.id,
                    records = plan.records.len(),
                    "conflict needs manual resolution"
                );
                report.conflicted += 1;
                for record in &plan.records {
                    self.emit(|sink| sink.conflict_detected(record));
                }
                Ok(())
            }
        }
    }

    /// Settles a parked conflict with the user's decision.
    pub async fn resolve_conflict(
        &self,
        conflict_id: i64,
        choice: ConflictChoice,
        merged_value: Option<Value>,
    ) -> Result<(), AppError> {
        let conflict = self
            .conflicts
            .get(conflict_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Conflict {conflict_id} not found")))?;
        if conflict.is_resolved() {
            return Err(AppError::Validation(format!(
                "Conflict {conflict_id} is already resolved"
            )));
        }

        let now = Utc::now();
        match choice {
            ConflictChoice::Local => {
                let mut payload = TaskPayload::default();
                payload.insert(
                    conflict.field.clone(),
                    FieldWrite {
                        value: conflict.local_value.clone(),
                        modified_at: now,
                    },
                );
                self.queue
                    .reenqueue_resolved(&conflict.task_id, payload)
                    .await?;
                self.entities
                    .set_sync_state(
                        &conflict.entity_kind,
                        &conflict.entity_id,
                        EntitySyncState::Pending,
                    )
                    .await?;
                self.conflicts
                    .mark_resolved(conflict_id, ConflictResolution::LocalWins, now)
                    .await?;
            }
            ConflictChoice::Remote => {
                self.entities
                    .apply_remote_fields(
                        &conflict.entity_kind,
                        &conflict.entity_id,
                        &[(conflict.field.clone(), conflict.remote_value.clone())],
                        None,
                    )
                    .await?;
                self.queue.ack(&conflict.task_id).await?;
                let state = if self
                    .queue
                    .has_active_for_entity(&conflict.entity_kind, &conflict.entity_id)
                    .await?
                {
                    EntitySyncState::Pending
                } else {
                    EntitySyncState::Synced
                };
                self.entities
                    .set_sync_state(&conflict.entity_kind, &conflict.entity_id, state)
                    .await?;
                self.conflicts
                    .mark_resolved(conflict_id, ConflictResolution::RemoteWins, now)
                    .await?;
            }
            ConflictChoice::Merge => {
                let merged = merged_value.ok_or_else(|| {
                    AppError::Validation("Merge resolution requires a merged value".to_string())
                })?;
                let mut payload = TaskPayload::default();
                payload.insert(
                    conflict.field.clone(),
                    FieldWrite {
                        value: merged,
                        modified_at: now,
                    },
                );
                self.queue
                    .reenqueue_resolved(&conflict.task_id, payload)
                    .await?;
                self.entities
                    .set_sync_state(
                        &conflict.entity_kind,
                        &conflict.entity_id,
                        EntitySyncState::Pending,
                    )
                    .await?;
                self.conflicts
                    .mark_resolved(conflict_id, ConflictResolution::Merged, now)
                    .await?;
            }
        }
        tracing::info!(
            target: "sync::engine",
            conflict_id,
            choice = choice.as_str(),
            "conflict resolved manually"
        );
        Ok(())
    }

    /// Puts a terminally failed task back in the queue at the user's request.
    pub async fn retry_task(&self, task_id: &TaskId) -> Result<SyncTask, AppError> {
        let task = self.queue.retry_failed(task_id).await?;
        self.entities
            .set_sync_state(&task.entity_kind, &task.entity_id, EntitySyncState::Pending)
            .await?;
        tracing::info!(target: "sync::engine", task_id = %task_id, "failed task queued for retry");
        Ok(task)
    }

    pub async fn status(&self) -> Result<EngineStatus, AppError> {
        Ok(EngineStatus {
            running: self.scheduler.lock().await.is_some(),
            connectivity: self.monitor.snapshot().await,
            breaker: self.breaker.snapshot().await,
            queue: self.queue.counts().await?,
            last_drain: self.last_drain.read().await.clone(),
        })
    }

    /// Starts the periodic drain scheduler with jitter so a fleet of clients
    /// does not thunder at the backend in lockstep.
    pub async fn start(self: &Arc<Self>) {
        let mut slot = self.scheduler.lock().await;
        if slot.is_some() {
            return;
        }
        self.stopped.store(false, Ordering::SeqCst);
        let engine = Arc::clone(self);
        *slot = Some(tokio::spawn(async move {
            loop {
                let jitter = if engine.config.drain_jitter_secs > 0 {
                    rand::thread_rng().gen_range(0..=engine.config.drain_jitter_secs)
                } else {
                    0
                };
                tokio::time::sleep(std::time::Duration::from_secs(
                    engine.config.drain_interval_secs + jitter,
                ))
                .await;
                if engine.stopped.load(Ordering::SeqCst) {
                    break;
                }
                if let Err(err) = engine.sync_now().await {
                    tracing::error!(target: "sync::engine", error = %err, "scheduled drain failed");
                }
            }
        }));
        tracing::info!(
            target: "sync::engine",
            interval_secs = self.config.drain_interval_secs,
            "sync scheduler started"
        );
    }

    pub async fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        if let Some(handle) = self.scheduler.lock().await.take() {
            handle.abort();
        }
        tracing::info!(target: "sync::engine", "sync engine stopped");
    }

    pub async fn task(&self, task_id: &TaskId) -> Result<Option<SyncTask>, AppError> {
        self.queue.get(task_id).await
    }

    pub async fn pending_tasks(&self, limit: u32) -> Result<Vec<SyncTask>, AppError> {
        self.queue.list_pending(limit).await
    }

    pub async fn terminal_tasks(&self, limit: u32) -> Result<Vec<SyncTask>, AppError> {
        self.queue.list_terminal(limit).await
    }

    pub async fn queue_counts(&self) -> Result<QueueCounts, AppError> {
        self.queue.counts().await
    }

    pub async fn unresolved_conflicts(&self, limit: u32) -> Result<Vec<SyncConflict>, AppError> {
        self.conflicts.list_unresolved(limit).await
    }

    /// Conflicts a user should look at, resolved or not. Tie-break
    /// auto-resolutions land here even though they no longer block syncing.
    pub async fn review_conflicts(&self, limit: u32) -> Result<Vec<SyncConflict>, AppError> {
        self.conflicts.list_needs_review(limit).await
    }

    pub async fn entity_conflicts(
        &self,
        entity_kind: &EntityKind,
        entity_id: &EntityId,
    ) -> Result<Vec<SyncConflict>, AppError> {
        self.conflicts.list_for_entity(entity_kind, entity_id).await
    }

    pub async fn entity(
        &self,
        entity_kind: &EntityKind,
        entity_id: &EntityId,
    ) -> Result<Option<EntityRecord>, AppError> {
        self.entities.get(entity_kind, entity_id).await
    }

    pub async fn pending_entities(&self, limit: u32) -> Result<Vec<EntityRecord>, AppError> {
        self.entities.list_pending(limit).await
    }

    async fn note_breaker_success(&self) {
        if let Some(snapshot) = self.breaker.record_success().await {
            self.emit(|sink| sink.breaker_changed(&snapshot));
        }
    }

    async fn note_breaker_failure(&self) {
        if let Some(snapshot) = self.breaker.record_failure().await {
            self.emit(|sink| sink.breaker_changed(&snapshot));
        }
    }

    fn emit<F>(&self, emit_fn: F)
    where
        F: FnOnce(&dyn SyncEventSink) -> Result<(), String>,
    {
        if let Some(sink) = &self.sink {
            if let Err(err) = emit_fn(sink.as_ref()) {
                tracing::warn!(target: "sync::engine", error = %err, "failed to emit sync event");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::value_objects::TaskPriority;
    use crate::infrastructure::offline::{SqliteConflictLog, SqliteEntityStore, SqliteSyncQueue};
    use crate::shared::config::{BreakerConfig, MonitorConfig};
    use async_trait::async_trait;
    use chrono::Duration;
    use serde_json::json;
    use sqlx::SqlitePool;
    use sqlx::sqlite::SqlitePoolOptions;
    use std::collections::{BTreeMap, VecDeque};
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct ScriptedBackend {
        script: StdMutex<VecDeque<Result<PushOutcome, PushError>>>,
        pushed: StdMutex<Vec<(String, Value)>>,
    }

    impl ScriptedBackend {
        fn script(&self, result: Result<PushOutcome, PushError>) {
            self.script.lock().unwrap().push_back(result);
        }

        fn pushed(&self) -> Vec<(String, Value)> {
            self.pushed.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl RemoteBackend for ScriptedBackend {
        async fn push(&self, task: &SyncTask) -> Result<PushOutcome, PushError> {
            self.pushed
                .lock()
                .unwrap()
                .push((task.id.to_string(), task.payload.values_json()));
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(PushError::Transport("script exhausted".to_string())))
        }
    }

    async fn setup_pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();
        pool
    }

    fn build_engine(
        pool: &SqlitePool,
        backend: Arc<ScriptedBackend>,
        monitor: Arc<NetworkMonitor>,
        breaker_config: BreakerConfig,
    ) -> Arc<SyncEngine> {
        Arc::new(SyncEngine::new(
            Arc::new(SqliteSyncQueue::new(pool.clone())),
            Arc::new(SqliteEntityStore::new(pool.clone())),
            Arc::new(SqliteConflictLog::new(pool.clone())),
            backend,
            monitor,
            Arc::new(CircuitBreaker::new(breaker_config)),
            None,
            SyncConfig::default(),
        ))
    }

    async fn setup_engine() -> (Arc<SyncEngine>, Arc<ScriptedBackend>, SqlitePool) {
        let pool = setup_pool().await;
        let backend = Arc::new(ScriptedBackend::default());
        let monitor = Arc::new(NetworkMonitor::new(MonitorConfig::default(), None, None));
        let engine = build_engine(&pool, backend.clone(), monitor, BreakerConfig::default());
        (engine, backend, pool)
    }

    fn update_draft(entity_id: &str, fields: Value) -> MutationDraft {
        MutationDraft::new(
            EntityKind::Inspection,
            EntityId::parse(entity_id).unwrap(),
            TaskOperation::Update,
            TaskPayload::from_object(&fields, Utc::now()).unwrap(),
            None,
            None,
        )
    }

    #[tokio::test]
    async fn test_submit_queues_and_applies_locally() {
        let (engine, _backend, _pool) = setup_engine().await;
        let task = engine
            .submit(update_draft("insp-1", json!({"status": "passed"})))
            .await
            .unwrap();

        assert_eq!(task.status, crate::domain::value_objects::TaskStatus::Pending);
        let record = engine
            .entity(&EntityKind::Inspection, &EntityId::parse("insp-1").unwrap())
            .await
            .unwrap()
            .expect("record should exist after submit");
        assert_eq!(record.local_version, 1);
        assert_eq!(record.sync_state, EntitySyncState::Pending);
        assert_eq!(record.snapshot["status"], json!("passed"));
    }

    #[tokio::test]
    async fn test_drain_syncs_pending_task() {
        let (engine, backend, _pool) = setup_engine().await;
        backend.script(Ok(PushOutcome::Applied {
            remote_version: 4,
            server_modified_at: None,
        }));
        engine
            .submit(update_draft("insp-1", json!({"status": "passed"})))
            .await
            .unwrap();

        let report = engine.sync_now().await.unwrap();

        assert_eq!(report.synced, 1);
        assert_eq!(report.stopped, DrainStop::QueueEmpty);
        let record = engine
            .entity(&EntityKind::Inspection, &EntityId::parse("insp-1").unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.sync_state, EntitySyncState::Synced);
        assert_eq!(record.remote_version, Some(4));
        assert!(record.last_synced_at.is_some());
    }

    #[tokio::test]
    async fn test_drain_sends_create_before_later_urgent_update() {
        let (engine, backend, _pool) = setup_engine().await;
        backend.script(Ok(PushOutcome::Applied {
            remote_version: 1,
            server_modified_at: None,
        }));
        backend.script(Ok(PushOutcome::Applied {
            remote_version: 2,
            server_modified_at: None,
        }));
        let create = engine
            .submit(MutationDraft::new(
                EntityKind::Inspection,
                EntityId::parse("insp-1").unwrap(),
                TaskOperation::Create,
                TaskPayload::from_object(&json!({"status": "draft"}), Utc::now()).unwrap(),
                None,
                None,
            ))
            .await
            .unwrap();
        let update = engine
            .submit(MutationDraft::new(
                EntityKind::Inspection,
                EntityId::parse("insp-1").unwrap(),
                TaskOperation::Update,
                TaskPayload::from_object(&json!({"status": "failed"}), Utc::now()).unwrap(),
                Some(TaskPriority::Immediate),
                None,
            ))
            .await
            .unwrap();

        let report = engine.sync_now().await.unwrap();

        // The create must reach the backend before the urgent edit that
        // depends on it.
        assert_eq!(report.synced, 2);
        let pushed = backend.pushed();
        assert_eq!(pushed.len(), 2);
        assert_eq!(pushed[0].0, create.id.to_string());
        assert_eq!(pushed[1].0, update.id.to_string());
        assert_eq!(pushed[0].1["status"], json!("draft"));
        assert_eq!(pushed[1].1["status"], json!("failed"));
    }

    #[tokio::test]
    async fn test_transport_failure_requeues_with_backoff() {
        let (engine, backend, _pool) = setup_engine().await;
        backend.script(Err(PushError::Transport("connection reset".to_string())));
        let task = engine
            .submit(update_draft("insp-1", json!({"status": "passed"})))
            .await
            .unwrap();

        let report = engine.sync_now().await.unwrap();

        assert_eq!(report.requeued, 1);
        let task = engine.task(&task.id).await.unwrap().unwrap();
        assert_eq!(task.status, crate::domain::value_objects::TaskStatus::Pending);
        assert_eq!(task.retry_count, 1);
        assert!(task.not_before.expect("backoff gate") > Utc::now());
        assert_eq!(task.last_error.as_deref(), Some("connection reset"));
    }

    #[tokio::test]
    async fn test_rejected_push_fails_terminally() {
        let (engine, backend, _pool) = setup_engine().await;
        backend.script(Err(PushError::Rejected("invalid status value".to_string())));
        let task = engine
            .submit(update_draft("insp-1", json!({"status": "nope"})))
            .await
            .unwrap();

        let report = engine.sync_now().await.unwrap();

        assert_eq!(report.failed, 1);
        assert_eq!(report.requeued, 0);
        let task = engine.task(&task.id).await.unwrap().unwrap();
        assert_eq!(task.status, crate::domain::value_objects::TaskStatus::Failed);
        let record = engine
            .entity(&EntityKind::Inspection, &EntityId::parse("insp-1").unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.sync_state, EntitySyncState::Error);
    }

    #[tokio::test]
    async fn test_retries_exhaust_to_terminal_failure() {
        let (engine, backend, pool) = setup_engine().await;
        backend.script(Err(PushError::Transport("down".to_string())));
        backend.script(Err(PushError::Transport("still down".to_string())));
        let draft = MutationDraft::new(
            EntityKind::Inspection,
            EntityId::parse("insp-1").unwrap(),
            TaskOperation::Update,
            TaskPayload::from_object(&json!({"status": "passed"}), Utc::now()).unwrap(),
            None,
            Some(1),
        );
        let task = engine.submit(draft).await.unwrap();

        engine.sync_now().await.unwrap();
        // Lift the backoff gate so the retry is immediately eligible.
        sqlx::query("UPDATE sync_tasks SET not_before = NULL")
            .execute(&pool)
            .await
            .unwrap();
        let report = engine.sync_now().await.unwrap();

        assert_eq!(report.failed, 1);
        let task = engine.task(&task.id).await.unwrap().unwrap();
        assert_eq!(task.status, crate::domain::value_objects::TaskStatus::Failed);
        assert_eq!(task.retry_count, 1);
    }

    #[tokio::test]
    async fn test_conflict_remote_newer_wins_without_resend() {
        let (engine, backend, _pool) = setup_engine().await;
        let mut server_field_modified = BTreeMap::new();
        server_field_modified.insert("status".to_string(), Utc::now() + Duration::minutes(5));
        backend.script(Ok(PushOutcome::Conflict(RemoteConflict {
            server_state: json!({"status": "approved"}),
            server_field_modified,
            server_modified_at: None,
            remote_version: 9,
            existing_entity_id: None,
            local_actor_is_owner: false,
        })));
        engine
            .submit(update_draft("insp-1", json!({"status": "failed"})))
            .await
            .unwrap();

        let report = engine.sync_now().await.unwrap();

        assert_eq!(report.synced, 1);
        assert_eq!(report.requeued, 0);
        // Only the original push went out; the losing edit was not resent.
        assert_eq!(backend.pushed().len(), 1);

        let record = engine
            .entity(&EntityKind::Inspection, &EntityId::parse("insp-1").unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.snapshot["status"], json!("approved"));
        assert_eq!(record.remote_version, Some(9));

        let conflicts = engine.unresolved_conflicts(10).await.unwrap();
        // Auto-resolved without review flag, so nothing is waiting on a user.
        assert!(conflicts.is_empty());
        let all = engine
            .entity_conflicts(&EntityKind::Inspection, &EntityId::parse("insp-1").unwrap())
            .await
            .unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].resolution, Some(ConflictResolution::RemoteWins));
    }

    #[tokio::test]
    async fn test_tie_break_resolution_surfaces_for_review() {
        let (engine, backend, _pool) = setup_engine().await;
        // No remote timestamps at all, so ownership decides and the outcome
        // is flagged for review.
        backend.script(Ok(PushOutcome::Conflict(RemoteConflict {
            server_state: json!({"status": "approved"}),
            server_field_modified: BTreeMap::new(),
            server_modified_at: None,
            remote_version: 9,
            existing_entity_id: None,
            local_actor_is_owner: false,
        })));
        engine
            .submit(update_draft("insp-1", json!({"status": "failed"})))
            .await
            .unwrap();

        let report = engine.sync_now().await.unwrap();
        assert_eq!(report.synced, 1);

        // Nothing blocks syncing, but the review list keeps the record.
        assert!(engine.unresolved_conflicts(10).await.unwrap().is_empty());
        let review = engine.review_conflicts(10).await.unwrap();
        assert_eq!(review.len(), 1);
        assert_eq!(review[0].field, "status");
        assert_eq!(review[0].resolution, Some(ConflictResolution::RemoteWins));
        assert!(review[0].needs_review);
        assert!(review[0].is_resolved());
    }

    #[tokio::test]
    async fn test_conflict_local_newer_resends_surviving_fields() {
        let (engine, backend, _pool) = setup_engine().await;
        let mut server_field_modified = BTreeMap::new();
        server_field_modified.insert("status".to_string(), Utc::now() - Duration::hours(1));
        backend.script(Ok(PushOutcome::Conflict(RemoteConflict {
            server_state: json!({"status": "approved"}),
            server_field_modified,
            server_modified_at: None,
            remote_version: 9,
            existing_entity_id: None,
            local_actor_is_owner: false,
        })));
        backend.script(Ok(PushOutcome::Applied {
            remote_version: 10,
            server_modified_at: None,
        }));
        engine
            .submit(update_draft("insp-1", json!({"status": "failed"})))
            .await
            .unwrap();

        let report = engine.sync_now().await.unwrap();

        // First push conflicted and was reenqueued, second push applied.
        assert_eq!(report.drained, 2);
        assert_eq!(report.requeued, 1);
        assert_eq!(report.synced, 1);
        let pushes = backend.pushed();
        assert_eq!(pushes.len(), 2);
        assert_eq!(pushes[1].1, json!({"status": "failed"}));
    }

    #[tokio::test]
    async fn test_manual_conflict_parks_task_until_resolved() {
        let (engine, backend, _pool) = setup_engine().await;
        // Entity deleted remotely while edited locally.
        backend.script(Ok(PushOutcome::Conflict(RemoteConflict {
            server_state: Value::Null,
            server_field_modified: BTreeMap::new(),
            server_modified_at: None,
            remote_version: 3,
            existing_entity_id: None,
            local_actor_is_owner: true,
        })));
        let task = engine
            .submit(update_draft("insp-1", json!({"status": "failed"})))
            .await
            .unwrap();

        let report = engine.sync_now().await.unwrap();

        assert_eq!(report.conflicted, 1);
        let parked = engine.task(&task.id).await.unwrap().unwrap();
        assert_eq!(
            parked.status,
            crate::domain::value_objects::TaskStatus::Conflicted
        );

        let conflicts = engine.unresolved_conflicts(10).await.unwrap();
        assert_eq!(conflicts.len(), 1);
        let conflict_id = conflicts[0].id.unwrap();

        engine
            .resolve_conflict(conflict_id, ConflictChoice::Local, None)
            .await
            .unwrap();

        let revived = engine.task(&task.id).await.unwrap().unwrap();
        assert_eq!(
            revived.status,
            crate::domain::value_objects::TaskStatus::Pending
        );
        assert_eq!(revived.retry_count, 0);
        assert!(engine.unresolved_conflicts(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_breaker_opens_and_stops_drain() {
        let pool = setup_pool().await;
        let backend = Arc::new(ScriptedBackend::default());
        let monitor = Arc::new(NetworkMonitor::new(MonitorConfig::default(), None, None));
        let engine = build_engine(
            &pool,
            backend.clone(),
            monitor,
            BreakerConfig {
                failure_threshold: 2,
                cooldown_base_secs: 60,
                cooldown_cap_exponent: 6,
            },
        );
        backend.script(Err(PushError::Transport("down".to_string())));
        backend.script(Err(PushError::Transport("down".to_string())));
        for i in 0..3 {
            engine
                .submit(update_draft(
                    &format!("insp-{i}"),
                    json!({"status": "passed"}),
                ))
                .await
                .unwrap();
        }

        let report = engine.sync_now().await.unwrap();

        assert_eq!(report.drained, 2);
        assert_eq!(report.stopped, DrainStop::BreakerOpen);
        // Breaker short-circuits before the queue is touched again.
        assert_eq!(backend.pushed().len(), 2);
        let status = engine.status().await.unwrap();
        assert_eq!(
            status.breaker.state,
            crate::shared::circuit_breaker::BreakerState::Open
        );
        assert!(status.breaker.next_probe_at.is_some());
        // Both failed tasks are requeued behind their backoff gate, so they
        // count as pending alongside the task the drain never reached.
        assert_eq!(status.queue.pending, 3);
    }

    #[tokio::test]
    async fn test_offline_stops_drain_without_touching_queue() {
        let pool = setup_pool().await;
        let backend = Arc::new(ScriptedBackend::default());
        let monitor = Arc::new(NetworkMonitor::new(MonitorConfig::default(), None, None));
        let engine = build_engine(&pool, backend.clone(), monitor.clone(), BreakerConfig::default());
        engine
            .submit(update_draft("insp-1", json!({"status": "passed"})))
            .await
            .unwrap();
        monitor.report_offline().await;

        let report = engine.sync_now().await.unwrap();

        assert_eq!(report.drained, 0);
        assert_eq!(report.stopped, DrainStop::Offline);
        assert!(backend.pushed().is_empty());
        assert_eq!(engine.queue_counts().await.unwrap().pending, 1);
    }

    #[tokio::test]
    async fn test_create_collision_remaps_identity() {
        let (engine, backend, _pool) = setup_engine().await;
        backend.script(Ok(PushOutcome::Conflict(RemoteConflict {
            server_state: json!({"address": "12 Elm Street"}),
            server_field_modified: BTreeMap::new(),
            server_modified_at: Some(Utc::now()),
            remote_version: 2,
            existing_entity_id: Some(EntityId::parse("prop-srv-9").unwrap()),
            local_actor_is_owner: false,
        })));
        let draft = MutationDraft::new(
            EntityKind::Property,
            EntityId::parse("prop-local-1").unwrap(),
            TaskOperation::Create,
            TaskPayload::from_object(&json!({"address": "12 Elm St"}), Utc::now()).unwrap(),
            None,
            None,
        );
        engine.submit(draft).await.unwrap();

        let report = engine.sync_now().await.unwrap();

        assert_eq!(report.synced, 1);
        // No duplicate create went out after the collision.
        assert_eq!(backend.pushed().len(), 1);
        assert!(engine
            .entity(&EntityKind::Property, &EntityId::parse("prop-local-1").unwrap())
            .await
            .unwrap()
            .is_none());
        let moved = engine
            .entity(&EntityKind::Property, &EntityId::parse("prop-srv-9").unwrap())
            .await
            .unwrap()
            .expect("record should live under the server id");
        assert_eq!(moved.snapshot["address"], json!("12 Elm Street"));
        assert_eq!(moved.sync_state, EntitySyncState::Synced);
    }
}
