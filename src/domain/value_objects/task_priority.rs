use serde::{Deserialize, Serialize};

/// Dequeue ordering band. Lower rank drains first, FIFO within a band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TaskPriority {
    Immediate,
    High,
    Normal,
    Low,
}

impl TaskPriority {
    pub fn parse(value: &str) -> Result<Self, String> {
        match value {
            "immediate" => Ok(TaskPriority::Immediate),
            "high" => Ok(TaskPriority::High),
            "normal" => Ok(TaskPriority::Normal),
            "low" => Ok(TaskPriority::Low),
            other => Err(format!("Unknown task priority: {other}")),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskPriority::Immediate => "immediate",
            TaskPriority::High => "high",
            TaskPriority::Normal => "normal",
            TaskPriority::Low => "low",
        }
    }

    /// Storage encoding used by the dequeue index.
    pub fn rank(&self) -> i64 {
        match self {
            TaskPriority::Immediate => 0,
            TaskPriority::High => 1,
            TaskPriority::Normal => 2,
            TaskPriority::Low => 3,
        }
    }

    pub fn from_rank(rank: i64) -> Result<Self, String> {
        match rank {
            0 => Ok(TaskPriority::Immediate),
            1 => Ok(TaskPriority::High),
            2 => Ok(TaskPriority::Normal),
            3 => Ok(TaskPriority::Low),
            other => Err(format!("Unknown priority rank: {other}")),
        }
    }
}

impl Default for TaskPriority {
    fn default() -> Self {
        TaskPriority::Normal
    }
}
