use crate::domain::value_objects::TaskPriority;
use crate::shared::config::RetryBackoffConfig;
use chrono::Duration;

/// Central backoff schedule for transient failures. Each priority band has
/// its own base delay so urgent work comes back sooner.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryBackoffConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryBackoffConfig) -> Self {
        Self { config }
    }

    pub fn base_secs(&self, priority: TaskPriority) -> u64 {
        match priority {
            TaskPriority::Immediate => self.config.immediate_secs,
            TaskPriority::High => self.config.high_secs,
            TaskPriority::Normal => self.config.normal_secs,
            TaskPriority::Low => self.config.low_secs,
        }
    }

    /// Delay to apply after the attempt numbered `retry_count` (zero-based)
    /// has failed.
    pub fn delay_for(&self, priority: TaskPriority, retry_count: u32) -> Duration {
        let exponent = retry_count.min(self.config.max_exponent).min(62);
        let secs = self
            .base_secs(priority)
            .saturating_mul(1u64 << exponent);
        Duration::seconds(secs as i64)
    }
}
