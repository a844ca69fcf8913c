use sqlx::FromRow;

#[derive(Debug, Clone, FromRow)]
pub struct SyncTaskRow {
    pub seq: i64,
    pub id: String,
    pub entity_type: String,
    pub entity_id: String,
    pub operation: String,
    pub payload: String,
    pub priority: i64,
    pub status: String,
    pub retry_count: i64,
    pub max_retries: i64,
    pub not_before: Option<i64>,
    pub last_error: Option<String>,
    pub created_at: i64,
    pub last_attempt_at: Option<i64>,
    pub updated_at: i64,
}

#[derive(Debug, Clone, FromRow)]
pub struct EntityRecordRow {
    pub entity_type: String,
    pub entity_id: String,
    pub local_version: i64,
    pub remote_version: Option<i64>,
    pub snapshot: String,
    pub sync_state: String,
    pub last_synced_at: Option<i64>,
    pub updated_at: i64,
}

#[derive(Debug, Clone, FromRow)]
pub struct SyncConflictRow {
    pub id: i64,
    pub task_id: String,
    pub entity_type: String,
    pub entity_id: String,
    pub field: String,
    pub local_value: Option<String>,
    pub remote_value: Option<String>,
    pub local_modified_at: Option<i64>,
    pub remote_modified_at: Option<i64>,
    pub resolution: Option<String>,
    pub needs_review: bool,
    pub detected_at: i64,
    pub resolved_at: Option<i64>,
}
