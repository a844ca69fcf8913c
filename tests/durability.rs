mod common;

use common::RecordingBackend;
use fieldsync::presentation::dto::sync::SubmitMutationRequest;
use fieldsync::shared::config::AppConfig;
use fieldsync::AppState;
use serde_json::json;
use std::sync::Arc;

fn config_for(path: &std::path::Path) -> AppConfig {
    let mut config = AppConfig::default();
    config.database.url = format!("sqlite:{}", path.display());
    config
}

fn submit_request(entity_id: &str) -> SubmitMutationRequest {
    SubmitMutationRequest {
        entity_type: "inspection".to_string(),
        entity_id: entity_id.to_string(),
        operation: "update".to_string(),
        data: json!({"status": "passed"}),
        priority: None,
        max_retries: None,
    }
}

#[tokio::test]
async fn test_pending_queue_survives_process_restart() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("fieldsync.db");

    // First process: queue two edits, never drain, shut down.
    {
        let state = AppState::new(
            config_for(&db_path),
            Arc::new(RecordingBackend::default()),
            None,
            None,
        )
        .await
        .unwrap();
        state
            .handler
            .submit_mutation(submit_request("insp-1"))
            .await
            .unwrap();
        state
            .handler
            .submit_mutation(submit_request("insp-2"))
            .await
            .unwrap();
        state.shutdown().await;
    }

    // Second process over the same file picks the queue up intact.
    let backend = Arc::new(RecordingBackend::default());
    let state = AppState::new(config_for(&db_path), backend.clone(), None, None)
        .await
        .unwrap();

    assert_eq!(state.engine.queue_counts().await.unwrap().pending, 2);

    let report = state.engine.sync_now().await.unwrap();
    assert_eq!(report.synced, 2);
    assert_eq!(backend.pushed_entities(), vec!["insp-1", "insp-2"]);

    let status = state.handler.status().await.unwrap();
    assert_eq!(status.queue.pending, 0);
    assert_eq!(status.queue.synced, 2);
    state.shutdown().await;
}

#[tokio::test]
async fn test_restart_releases_tasks_stranded_in_flight() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("fieldsync.db");
    let mut config = config_for(&db_path);
    config.sync.stale_in_flight_secs = 0;

    {
        let state = AppState::new(
            config.clone(),
            Arc::new(RecordingBackend::default()),
            None,
            None,
        )
        .await
        .unwrap();
        state
            .handler
            .submit_mutation(submit_request("insp-1"))
            .await
            .unwrap();
        // Simulate a crash mid-push: the task is taken but never settled.
        sqlx::query("UPDATE sync_tasks SET status = 'in_flight'")
            .execute(state.pool.pool())
            .await
            .unwrap();
        state.pool.close().await;
    }

    let state = AppState::new(config, Arc::new(RecordingBackend::default()), None, None)
        .await
        .unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    let report = state.maintenance.run_once().await.unwrap();

    assert_eq!(report.rearmed_in_flight, 1);
    let counts = state.engine.queue_counts().await.unwrap();
    assert_eq!(counts.pending, 1);
    assert_eq!(counts.in_flight, 0);
    state.shutdown().await;
}
