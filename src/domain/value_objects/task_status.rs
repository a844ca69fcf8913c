use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    Pending,
    InFlight,
    Synced,
    Failed,
    Conflicted,
    Unknown(String),
}

impl TaskStatus {
    pub fn as_str(&self) -> &str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InFlight => "in_flight",
            TaskStatus::Synced => "synced",
            TaskStatus::Failed => "failed",
            TaskStatus::Conflicted => "conflicted",
            TaskStatus::Unknown(value) => value.as_str(),
        }
    }

    /// Terminal tasks are never picked up by the drain loop again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Synced | TaskStatus::Failed | TaskStatus::Conflicted
        )
    }
}

impl From<&str> for TaskStatus {
    fn from(value: &str) -> Self {
        match value {
            "pending" => TaskStatus::Pending,
            "in_flight" => TaskStatus::InFlight,
            "synced" => TaskStatus::Synced,
            "failed" => TaskStatus::Failed,
            "conflicted" => TaskStatus::Conflicted,
            other => TaskStatus::Unknown(other.to_string()),
        }
    }
}
