use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskOperation {
    Create,
    Update,
    Delete,
}

impl TaskOperation {
    pub fn parse(value: &str) -> Result<Self, String> {
        match value {
            "create" => Ok(TaskOperation::Create),
            "update" => Ok(TaskOperation::Update),
            "delete" => Ok(TaskOperation::Delete),
            other => Err(format!("Unknown task operation: {other}")),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskOperation::Create => "create",
            TaskOperation::Update => "update",
            TaskOperation::Delete => "delete",
        }
    }
}
