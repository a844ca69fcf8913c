use async_trait::async_trait;
use std::time::Duration;

/// Active reachability check against the backend, used when the platform
/// gives no connectivity signal of its own.
#[async_trait]
pub trait ConnectivityProbe: Send + Sync {
    /// Returns the observed round-trip time, or an error when unreachable.
    async fn check(&self) -> Result<Duration, String>;
}
