use serde::{Deserialize, Serialize};

/// Per-record view of where a local entity stands against the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntitySyncState {
    Pending,
    InFlight,
    Synced,
    Conflicted,
    Error,
    Unknown(String),
}

impl EntitySyncState {
    pub fn as_str(&self) -> &str {
        match self {
            EntitySyncState::Pending => "pending",
            EntitySyncState::InFlight => "in_flight",
            EntitySyncState::Synced => "synced",
            EntitySyncState::Conflicted => "conflicted",
            EntitySyncState::Error => "error",
            EntitySyncState::Unknown(value) => value.as_str(),
        }
    }
}

impl From<&str> for EntitySyncState {
    fn from(value: &str) -> Self {
        match value {
            "pending" => EntitySyncState::Pending,
            "in_flight" => EntitySyncState::InFlight,
            "synced" => EntitySyncState::Synced,
            "conflicted" => EntitySyncState::Conflicted,
            "error" => EntitySyncState::Error,
            other => EntitySyncState::Unknown(other.to_string()),
        }
    }
}
