use crate::domain::value_objects::NetworkQuality;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PriorityCounts {
    pub immediate: u64,
    pub high: u64,
    pub normal: u64,
    pub low: u64,
}

/// Queue population broken down by status, with pending further broken down
/// by priority band.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueueCounts {
    pub pending: u64,
    pub in_flight: u64,
    pub synced: u64,
    pub failed: u64,
    pub conflicted: u64,
    pub pending_by_priority: PriorityCounts,
}

impl QueueCounts {
    pub fn backlog(&self) -> u64 {
        self.pending + self.in_flight
    }
}

/// Result of re-arming tasks stranded in flight by a crash or kill.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StaleRelease {
    pub rearmed: u64,
    pub failed: u64,
}

/// Why a drain pass stopped pulling tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DrainStop {
    QueueEmpty,
    BreakerOpen,
    Offline,
    Stopped,
}

/// Outcome tally of one drain pass over the queue.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DrainReport {
    pub drained: u64,
    pub synced: u64,
    pub conflicted: u64,
    pub failed: u64,
    pub requeued: u64,
    pub stopped: DrainStop,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Point-in-time connectivity as seen by the monitor.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConnectivitySnapshot {
    pub online: bool,
    pub quality: NetworkQuality,
    pub last_change: DateTime<Utc>,
}

impl ConnectivitySnapshot {
    pub fn is_usable(&self) -> bool {
        self.online && self.quality.is_usable()
    }
}
