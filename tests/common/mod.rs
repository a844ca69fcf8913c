#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use fieldsync::application::ports::{PushError, PushOutcome, RemoteBackend};
use fieldsync::application::services::{NetworkMonitor, SyncEngine};
use fieldsync::domain::entities::{MutationDraft, SyncTask};
use fieldsync::domain::value_objects::{
    EntityId, EntityKind, TaskOperation, TaskPayload, TaskPriority,
};
use fieldsync::infrastructure::offline::{SqliteConflictLog, SqliteEntityStore, SqliteSyncQueue};
use fieldsync::shared::circuit_breaker::CircuitBreaker;
use fieldsync::shared::config::{BreakerConfig, MonitorConfig, SyncConfig};
use serde_json::Value;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

/// Backend double that records every push in arrival order. Scripted results
/// are consumed first; once the script is empty every push is applied with a
/// fresh remote version.
pub struct RecordingBackend {
    script: Mutex<VecDeque<Result<PushOutcome, PushError>>>,
    pushed: Mutex<Vec<(String, Value)>>,
    next_version: AtomicI64,
}

impl Default for RecordingBackend {
    fn default() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            pushed: Mutex::new(Vec::new()),
            next_version: AtomicI64::new(1),
        }
    }
}

impl RecordingBackend {
    pub fn script(&self, result: Result<PushOutcome, PushError>) {
        self.script.lock().unwrap().push_back(result);
    }

    pub fn fail_transport(&self, times: usize, reason: &str) {
        for _ in 0..times {
            self.script(Err(PushError::Transport(reason.to_string())));
        }
    }

    pub fn pushed(&self) -> Vec<(String, Value)> {
        self.pushed.lock().unwrap().clone()
    }

    pub fn pushed_entities(&self) -> Vec<String> {
        self.pushed
            .lock()
            .unwrap()
            .iter()
            .map(|(entity, _)| entity.clone())
            .collect()
    }

    pub fn push_count(&self) -> usize {
        self.pushed.lock().unwrap().len()
    }
}

#[async_trait]
impl RemoteBackend for RecordingBackend {
    async fn push(&self, task: &SyncTask) -> Result<PushOutcome, PushError> {
        self.pushed
            .lock()
            .unwrap()
            .push((task.entity_id.to_string(), task.payload.values_json()));
        if let Some(result) = self.script.lock().unwrap().pop_front() {
            return result;
        }
        Ok(PushOutcome::Applied {
            remote_version: self.next_version.fetch_add(1, Ordering::SeqCst),
            server_modified_at: None,
        })
    }
}

pub async fn memory_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    pool
}

pub fn build_engine(
    pool: &SqlitePool,
    backend: Arc<RecordingBackend>,
) -> (Arc<SyncEngine>, Arc<NetworkMonitor>) {
    let monitor = Arc::new(NetworkMonitor::new(MonitorConfig::default(), None, None));
    let engine = Arc::new(SyncEngine::new(
        Arc::new(SqliteSyncQueue::new(pool.clone())),
        Arc::new(SqliteEntityStore::new(pool.clone())),
        Arc::new(SqliteConflictLog::new(pool.clone())),
        backend,
        monitor.clone(),
        Arc::new(CircuitBreaker::new(BreakerConfig::default())),
        None,
        SyncConfig::default(),
    ));
    (engine, monitor)
}

pub fn update_draft(
    entity_id: &str,
    fields: Value,
    priority: Option<TaskPriority>,
    max_retries: Option<u32>,
) -> MutationDraft {
    MutationDraft::new(
        EntityKind::Inspection,
        EntityId::parse(entity_id).unwrap(),
        TaskOperation::Update,
        TaskPayload::from_object(&fields, Utc::now()).unwrap(),
        priority,
        max_retries,
    )
}

/// Clears retry backoff gates so requeued tasks are immediately eligible.
pub async fn lift_backoff(pool: &SqlitePool) {
    sqlx::query("UPDATE sync_tasks SET not_before = NULL")
        .execute(pool)
        .await
        .unwrap();
}
