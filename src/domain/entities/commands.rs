use crate::domain::value_objects::{EntityId, EntityKind, TaskOperation, TaskPayload, TaskPriority};
use serde::{Deserialize, Serialize};

/// Draft of a local mutation before it is queued.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MutationDraft {
    pub entity_kind: EntityKind,
    pub entity_id: EntityId,
    pub operation: TaskOperation,
    pub fields: TaskPayload,
    pub priority: Option<TaskPriority>,
    pub max_retries: Option<u32>,
}

impl MutationDraft {
    pub fn new(
        entity_kind: EntityKind,
        entity_id: EntityId,
        operation: TaskOperation,
        fields: TaskPayload,
        priority: Option<TaskPriority>,
        max_retries: Option<u32>,
    ) -> Self {
        Self {
            entity_kind,
            entity_id,
            operation,
            fields,
            priority,
            max_retries,
        }
    }
}

/// User decision for a conflict that could not be resolved automatically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictChoice {
    Local,
    Remote,
    Merge,
}

impl ConflictChoice {
    pub fn parse(value: &str) -> Result<Self, String> {
        match value {
            "local" => Ok(ConflictChoice::Local),
            "remote" => Ok(ConflictChoice::Remote),
            "merge" => Ok(ConflictChoice::Merge),
            other => Err(format!("Unknown conflict choice: {other}")),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictChoice::Local => "local",
            ConflictChoice::Remote => "remote",
            ConflictChoice::Merge => "merge",
        }
    }
}
