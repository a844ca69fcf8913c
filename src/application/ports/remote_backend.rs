use crate::domain::entities::SyncTask;
use crate::domain::value_objects::{EntityId, TaskId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

/// Server state handed back when a push hits a version conflict. The engine
/// resolves against this instead of fetching again.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteConflict {
    /// Current server snapshot. Null when the entity was deleted remotely.
    pub server_state: Value,
    /// Per-field modification times, where the backend tracks them.
    pub server_field_modified: BTreeMap<String, DateTime<Utc>>,
    /// Whole-record fallback when per-field times are not available.
    pub server_modified_at: Option<DateTime<Utc>>,
    pub remote_version: i64,
    /// Set when a create collided with an entity the server already has.
    pub existing_entity_id: Option<EntityId>,
    /// Whether the pushing actor owns the record, for timestamp ties.
    pub local_actor_is_owner: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PushOutcome {
    Applied {
        remote_version: i64,
        server_modified_at: Option<DateTime<Utc>>,
    },
    Conflict(RemoteConflict),
}

#[derive(Debug, Clone, Error)]
pub enum PushError {
    /// Timeout, connection reset, 5xx. Retryable and counts against the
    /// circuit breaker.
    #[error("Transport error: {0}")]
    Transport(String),
    /// Validation or authorization failure. Retrying cannot help.
    #[error("Rejected by backend: {0}")]
    Rejected(String),
}

impl PushError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, PushError::Transport(_))
    }
}

/// Transport seam to the sync backend.
#[async_trait]
pub trait RemoteBackend: Send + Sync {
    async fn push(&self, task: &SyncTask) -> Result<PushOutcome, PushError>;

    /// Pushes several tasks in one exchange, reporting per-task outcomes. An
    /// outer error means the whole exchange failed in transit.
    #[allow(clippy::type_complexity)]
    async fn push_batch(
        &self,
        tasks: &[SyncTask],
    ) -> Result<Vec<(TaskId, Result<PushOutcome, PushError>)>, PushError> {
        let mut results = Vec::with_capacity(tasks.len());
        for task in tasks {
            results.push((task.id.clone(), self.push(task).await));
        }
        Ok(results)
    }

    fn supports_batching(&self) -> bool {
        false
    }
}
