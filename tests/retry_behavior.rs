mod common;

use common::{build_engine, lift_backoff, memory_pool, update_draft, RecordingBackend};
use fieldsync::application::ports::PushError;
use fieldsync::domain::value_objects::TaskStatus;
use serde_json::json;
use std::sync::Arc;

#[tokio::test]
async fn test_retry_count_caps_at_max_retries() {
    let pool = memory_pool().await;
    let backend = Arc::new(RecordingBackend::default());
    let (engine, _monitor) = build_engine(&pool, backend.clone());
    backend.fail_transport(10, "connection reset");

    let task = engine
        .submit(update_draft("insp-1", json!({"status": "passed"}), None, Some(2)))
        .await
        .unwrap();

    // Drain until the task stops moving, lifting the backoff gate between
    // passes. The count must never pass max_retries.
    for _ in 0..6 {
        engine.sync_now().await.unwrap();
        let current = engine.task(&task.id).await.unwrap().unwrap();
        assert!(current.retry_count <= current.max_retries);
        lift_backoff(&pool).await;
    }

    let stuck = engine.task(&task.id).await.unwrap().unwrap();
    assert_eq!(stuck.status, TaskStatus::Failed);
    assert_eq!(stuck.retry_count, 2);
    // Initial attempt plus exactly two retries.
    assert_eq!(backend.push_count(), 3);
}

#[tokio::test]
async fn test_manual_retry_requeues_failed_task() {
    let pool = memory_pool().await;
    let backend = Arc::new(RecordingBackend::default());
    let (engine, _monitor) = build_engine(&pool, backend.clone());
    backend.script(Err(PushError::Rejected("schema mismatch".to_string())));

    let task = engine
        .submit(update_draft("insp-1", json!({"status": "passed"}), None, None))
        .await
        .unwrap();
    let report = engine.sync_now().await.unwrap();
    assert_eq!(report.failed, 1);

    let failed = engine.task(&task.id).await.unwrap().unwrap();
    assert_eq!(failed.status, TaskStatus::Failed);
    assert_eq!(failed.last_error.as_deref(), Some("schema mismatch"));

    let revived = engine.retry_task(&task.id).await.unwrap();
    assert_eq!(revived.status, TaskStatus::Pending);
    assert_eq!(revived.retry_count, 0);

    // The script is exhausted, so the retry is applied.
    let report = engine.sync_now().await.unwrap();
    assert_eq!(report.synced, 1);
    assert_eq!(backend.push_count(), 2);
}

#[tokio::test]
async fn test_retry_rejected_for_tasks_that_did_not_fail() {
    let pool = memory_pool().await;
    let backend = Arc::new(RecordingBackend::default());
    let (engine, _monitor) = build_engine(&pool, backend.clone());

    let task = engine
        .submit(update_draft("insp-1", json!({"status": "passed"}), None, None))
        .await
        .unwrap();

    let err = engine.retry_task(&task.id).await.unwrap_err();
    assert!(err.to_string().contains("not failed"));
}
