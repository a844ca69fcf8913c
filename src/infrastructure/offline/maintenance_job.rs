use crate::application::ports::SyncQueue;
use crate::shared::config::SyncConfig;
use crate::shared::error::AppError;
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaintenanceReport {
    pub purged_synced: u64,
    pub rearmed_in_flight: u64,
    pub failed_in_flight: u64,
    pub ran_at: i64,
}

/// Periodic queue housekeeping: drops confirmed tasks past their retention
/// window and re-arms tasks stranded in flight by a crash or kill.
pub struct QueueMaintenanceJob {
    queue: Arc<dyn SyncQueue>,
    retention: Duration,
    stale_in_flight: Duration,
    gate: Mutex<()>,
}

impl QueueMaintenanceJob {
    pub fn new(queue: Arc<dyn SyncQueue>, config: &SyncConfig) -> Arc<Self> {
        Arc::new(Self {
            queue,
            retention: Duration::hours(config.synced_retention_hours as i64),
            stale_in_flight: Duration::seconds(config.stale_in_flight_secs as i64),
            gate: Mutex::new(()),
        })
    }

    /// Fire-and-forget trigger; overlapping triggers collapse into one run.
    pub fn trigger(self: &Arc<Self>) {
        let job = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(err) = job.run_once().await {
                tracing::error!(target: "sync::maintenance", error = %err, "queue maintenance failed");
            }
        });
    }

    pub async fn run_once(&self) -> Result<MaintenanceReport, AppError> {
        let _guard = self.gate.lock().await;
        let released = self.queue.release_stale_in_flight(self.stale_in_flight).await?;
        let purged = self.queue.purge_synced(Utc::now() - self.retention).await?;

        let report = MaintenanceReport {
            purged_synced: purged,
            rearmed_in_flight: released.rearmed,
            failed_in_flight: released.failed,
            ran_at: Utc::now().timestamp_millis(),
        };
        tracing::info!(
            target: "sync::maintenance",
            purged = report.purged_synced,
            rearmed = report.rearmed_in_flight,
            failed = report.failed_in_flight,
            "queue maintenance pass finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::offline::SqliteSyncQueue;
    use crate::domain::entities::MutationDraft;
    use crate::domain::value_objects::{
        EntityId, EntityKind, TaskOperation, TaskPayload, TaskStatus,
    };
    use serde_json::json;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn setup_queue() -> Arc<SqliteSyncQueue> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();
        Arc::new(SqliteSyncQueue::new(pool))
    }

    fn draft(entity_id: &str) -> MutationDraft {
        MutationDraft::new(
            EntityKind::Inspection,
            EntityId::parse(entity_id).unwrap(),
            TaskOperation::Update,
            TaskPayload::from_object(&json!({"a": 1}), Utc::now()).unwrap(),
            None,
            None,
        )
    }

    #[tokio::test]
    async fn test_run_once_purges_and_releases() {
        let queue = setup_queue().await;
        let config = SyncConfig {
            synced_retention_hours: 0,
            stale_in_flight_secs: 0,
            ..SyncConfig::default()
        };
        let job = QueueMaintenanceJob::new(queue.clone(), &config);

        let done = queue.enqueue(draft("insp-1")).await.unwrap();
        queue.dequeue_next().await.unwrap();
        queue.ack(&done.id).await.unwrap();
        let stuck = queue.enqueue(draft("insp-2")).await.unwrap();
        queue.dequeue_next().await.unwrap();

        // Retention of zero hours makes the synced task eligible right away.
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let report = job.run_once().await.unwrap();

        assert_eq!(report.purged_synced, 1);
        assert_eq!(report.rearmed_in_flight, 1);
        assert_eq!(report.failed_in_flight, 0);
        assert!(queue.get(&done.id).await.unwrap().is_none());
        assert_eq!(
            queue.get(&stuck.id).await.unwrap().unwrap().status,
            TaskStatus::Pending
        );
    }
}
