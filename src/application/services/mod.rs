pub mod conflict_resolver;
pub mod network_monitor;
pub mod retry;
pub mod sync_engine;

pub use conflict_resolver::ConflictResolver;
pub use network_monitor::NetworkMonitor;
pub use retry::RetryPolicy;
pub use sync_engine::{EngineStatus, SyncEngine};
