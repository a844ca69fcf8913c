use crate::domain::entities::{ConnectivitySnapshot, DrainReport, SyncConflict, SyncTask};
use crate::domain::value_objects::TaskId;
use crate::shared::circuit_breaker::BreakerSnapshot;

/// Outbound notifications for a UI layer. Implementations must not block;
/// failures are logged and never fail the sync path.
pub trait SyncEventSink: Send + Sync {
    fn connectivity_changed(&self, snapshot: &ConnectivitySnapshot) -> Result<(), String>;
    fn breaker_changed(&self, snapshot: &BreakerSnapshot) -> Result<(), String>;
    fn task_synced(&self, task: &SyncTask) -> Result<(), String>;
    fn task_failed(&self, task_id: &TaskId, error: &str, terminal: bool) -> Result<(), String>;
    fn conflict_detected(&self, conflict: &SyncConflict) -> Result<(), String>;
    fn drain_finished(&self, report: &DrainReport) -> Result<(), String>;
}
