use serde::{Deserialize, Serialize};

/// How a recorded conflict was settled. Absent on conflicts still waiting
/// for a user decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictResolution {
    LocalWins,
    RemoteWins,
    Merged,
}

impl ConflictResolution {
    pub fn parse(value: &str) -> Result<Self, String> {
        match value {
            "local_wins" => Ok(ConflictResolution::LocalWins),
            "remote_wins" => Ok(ConflictResolution::RemoteWins),
            "merged" => Ok(ConflictResolution::Merged),
            other => Err(format!("Unknown conflict resolution: {other}")),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictResolution::LocalWins => "local_wins",
            ConflictResolution::RemoteWins => "remote_wins",
            ConflictResolution::Merged => "merged",
        }
    }
}
