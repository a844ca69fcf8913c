use serde::{Deserialize, Serialize};

/// Entity families the engine knows how to synchronize.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    Inspection,
    ChecklistItem,
    Media,
    Report,
    Property,
    Unknown(String),
}

impl EntityKind {
    /// Strict parse for input boundaries. Unknown kinds are rejected here so
    /// a typo never reaches the queue.
    pub fn parse(value: &str) -> Result<Self, String> {
        match value {
            "inspection" => Ok(EntityKind::Inspection),
            "checklist_item" => Ok(EntityKind::ChecklistItem),
            "media" => Ok(EntityKind::Media),
            "report" => Ok(EntityKind::Report),
            "property" => Ok(EntityKind::Property),
            other => Err(format!("Unknown entity kind: {other}")),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            EntityKind::Inspection => "inspection",
            EntityKind::ChecklistItem => "checklist_item",
            EntityKind::Media => "media",
            EntityKind::Report => "report",
            EntityKind::Property => "property",
            EntityKind::Unknown(value) => value.as_str(),
        }
    }
}

impl From<&str> for EntityKind {
    fn from(value: &str) -> Self {
        EntityKind::parse(value).unwrap_or_else(|_| EntityKind::Unknown(value.to_string()))
    }
}
