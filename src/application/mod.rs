pub mod ports;
pub mod services;

pub use services::{ConflictResolver, NetworkMonitor, RetryPolicy, SyncEngine};
