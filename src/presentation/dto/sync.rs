use crate::presentation::dto::Validate;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitMutationRequest {
    pub entity_type: String,
    pub entity_id: String,
    pub operation: String,
    pub data: Value,
    pub priority: Option<String>,
    pub max_retries: Option<u32>,
}

impl Validate for SubmitMutationRequest {
    fn validate(&self) -> Result<(), String> {
        if self.entity_type.is_empty() {
            return Err("Entity type is required".to_string());
        }
        if self.entity_id.is_empty() {
            return Err("Entity ID is required".to_string());
        }
        if self.operation.is_empty() {
            return Err("Operation is required".to_string());
        }
        if self.operation != "delete" && !self.data.is_object() {
            return Err("Data must be a JSON object".to_string());
        }
        let size = self.data.to_string().len();
        if size > 200_000 {
            return Err("Data is too large (max 200KB)".to_string());
        }
        if let Some(max_retries) = self.max_retries {
            if max_retries > 100 {
                return Err("Max retries must be at most 100".to_string());
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncTaskResponse {
    pub id: String,
    pub entity_type: String,
    pub entity_id: String,
    pub operation: String,
    pub priority: String,
    pub status: String,
    pub retry_count: u32,
    pub max_retries: u32,
    pub created_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_attempt_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub not_before: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub payload: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityRecordResponse {
    pub entity_type: String,
    pub entity_id: String,
    pub local_version: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_version: Option<i64>,
    pub sync_status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_synced_at: Option<i64>,
    pub snapshot: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncConflictResponse {
    pub id: i64,
    pub task_id: String,
    pub entity_type: String,
    pub entity_id: String,
    pub field: String,
    pub local_value: Value,
    pub remote_value: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_modified_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_modified_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution: Option<String>,
    pub needs_review: bool,
    pub detected_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveConflictRequest {
    pub conflict_id: i64,
    pub choice: String,
    pub merged_value: Option<Value>,
}

impl Validate for ResolveConflictRequest {
    fn validate(&self) -> Result<(), String> {
        if self.conflict_id <= 0 {
            return Err("Conflict ID must be positive".to_string());
        }
        if self.choice.is_empty() {
            return Err("Choice is required".to_string());
        }
        if self.choice == "merge" && self.merged_value.is_none() {
            return Err("Merge resolution requires a merged value".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListLimitRequest {
    pub limit: Option<u32>,
}

impl Validate for ListLimitRequest {
    fn validate(&self) -> Result<(), String> {
        if let Some(limit) = self.limit {
            if !(1..=1000).contains(&limit) {
                return Err("Limit must be between 1 and 1000".to_string());
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueCountsResponse {
    pub pending: u64,
    pub in_flight: u64,
    pub synced: u64,
    pub failed: u64,
    pub conflicted: u64,
    pub immediate_pending: u64,
    pub high_pending: u64,
    pub normal_pending: u64,
    pub low_pending: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakerStatusResponse {
    pub state: String,
    pub consecutive_failures: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub opened_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_probe_at: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DrainReportResponse {
    pub drained: u64,
    pub synced: u64,
    pub conflicted: u64,
    pub failed: u64,
    pub requeued: u64,
    pub stopped: String,
    pub started_at: i64,
    pub finished_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineStatusResponse {
    pub running: bool,
    pub online: bool,
    pub network_quality: String,
    pub breaker: BreakerStatusResponse,
    pub queue: QueueCountsResponse,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_drain: Option<DrainReportResponse>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_submit_request_validation() {
        let mut request = SubmitMutationRequest {
            entity_type: "inspection".to_string(),
            entity_id: "insp-1".to_string(),
            operation: "update".to_string(),
            data: json!({"status": "passed"}),
            priority: None,
            max_retries: None,
        };
        assert!(request.validate().is_ok());

        request.entity_id = String::new();
        assert!(request.validate().is_err());
        request.entity_id = "insp-1".to_string();

        request.data = json!("not an object");
        assert!(request.validate().is_err());

        // Deletes carry no field data.
        request.operation = "delete".to_string();
        request.data = Value::Null;
        assert!(request.validate().is_ok());
    }

    #[test]
    fn test_resolve_request_requires_merged_value_for_merge() {
        let mut request = ResolveConflictRequest {
            conflict_id: 1,
            choice: "merge".to_string(),
            merged_value: None,
        };
        assert!(request.validate().is_err());
        request.merged_value = Some(json!("combined"));
        assert!(request.validate().is_ok());
    }

    #[test]
    fn test_list_limit_bounds() {
        assert!(ListLimitRequest { limit: None }.validate().is_ok());
        assert!(ListLimitRequest { limit: Some(1000) }.validate().is_ok());
        assert!(ListLimitRequest { limit: Some(0) }.validate().is_err());
        assert!(ListLimitRequest { limit: Some(1001) }.validate().is_err());
    }
}
