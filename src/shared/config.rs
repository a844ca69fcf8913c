use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub sync: SyncConfig,
    pub breaker: BreakerConfig,
    pub monitor: MonitorConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub connection_timeout: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    pub auto_drain: bool,
    pub drain_interval_secs: u64,
    pub drain_jitter_secs: u64,
    pub batch_size: u32,
    pub default_max_retries: u32,
    pub call_timeout_secs: u64,
    pub backoff: RetryBackoffConfig,
    /// Coalescing keeps the original enqueue time unless this is set.
    #[serde(default)]
    pub refresh_created_at_on_coalesce: bool,
    pub synced_retention_hours: u64,
    pub stale_in_flight_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryBackoffConfig {
    pub immediate_secs: u64,
    pub high_secs: u64,
    pub normal_secs: u64,
    pub low_secs: u64,
    pub max_exponent: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerConfig {
    pub failure_threshold: u32,
    pub cooldown_base_secs: u64,
    pub cooldown_cap_exponent: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    pub probe_base_secs: u64,
    pub probe_max_secs: u64,
    pub sample_interval_secs: u64,
    pub good_latency_ms: u64,
    pub fair_latency_ms: u64,
    pub poor_latency_ms: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite:data/fieldsync.db".to_string(),
                max_connections: 5,
                connection_timeout: 30,
            },
            sync: SyncConfig::default(),
            breaker: BreakerConfig::default(),
            monitor: MonitorConfig::default(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            auto_drain: true,
            drain_interval_secs: 300, // 5 minutes
            drain_jitter_secs: 30,
            batch_size: 1,
            default_max_retries: 5,
            call_timeout_secs: 30,
            backoff: RetryBackoffConfig::default(),
            refresh_created_at_on_coalesce: false,
            synced_retention_hours: 48,
            stale_in_flight_secs: 600, // 10 minutes
        }
    }
}

impl Default for RetryBackoffConfig {
    fn default() -> Self {
        Self {
            immediate_secs: 1,
            high_secs: 5,
            normal_secs: 10,
            low_secs: 30,
            max_exponent: 8,
        }
    }
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown_base_secs: 5,
            cooldown_cap_exponent: 6,
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            probe_base_secs: 5,
            probe_max_secs: 300, // 5 minutes
            sample_interval_secs: 60,
            good_latency_ms: 200,
            fair_latency_ms: 600,
            poor_latency_ms: 1500,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(v) = std::env::var("FIELDSYNC_DATABASE_URL") {
            if !v.trim().is_empty() {
                cfg.database.url = v;
            }
        }

        if let Ok(v) = std::env::var("FIELDSYNC_AUTO_DRAIN") {
            cfg.sync.auto_drain = parse_bool(&v, cfg.sync.auto_drain);
        }
        if let Ok(v) = std::env::var("FIELDSYNC_DRAIN_INTERVAL_SECS") {
            if let Some(value) = parse_u64(&v) {
                cfg.sync.drain_interval_secs = value.max(1);
            }
        }
        if let Ok(v) = std::env::var("FIELDSYNC_BATCH_SIZE") {
            if let Some(value) = parse_u32(&v) {
                cfg.sync.batch_size = value.max(1);
            }
        }
        if let Ok(v) = std::env::var("FIELDSYNC_MAX_RETRIES") {
            if let Some(value) = parse_u32(&v) {
                cfg.sync.default_max_retries = value;
            }
        }
        if let Ok(v) = std::env::var("FIELDSYNC_CALL_TIMEOUT_SECS") {
            if let Some(value) = parse_u64(&v) {
                cfg.sync.call_timeout_secs = value.max(1);
            }
        }
        if let Ok(v) = std::env::var("FIELDSYNC_COALESCE_REFRESH_CREATED_AT") {
            cfg.sync.refresh_created_at_on_coalesce =
                parse_bool(&v, cfg.sync.refresh_created_at_on_coalesce);
        }

        if let Ok(v) = std::env::var("FIELDSYNC_BREAKER_THRESHOLD") {
            if let Some(value) = parse_u32(&v) {
                cfg.breaker.failure_threshold = value.max(1);
            }
        }
        if let Ok(v) = std::env::var("FIELDSYNC_BREAKER_COOLDOWN_SECS") {
            if let Some(value) = parse_u64(&v) {
                cfg.breaker.cooldown_base_secs = value.max(1);
            }
        }

        if let Ok(v) = std::env::var("FIELDSYNC_PROBE_BASE_SECS") {
            if let Some(value) = parse_u64(&v) {
                cfg.monitor.probe_base_secs = value.max(1);
            }
        }
        if let Ok(v) = std::env::var("FIELDSYNC_PROBE_MAX_SECS") {
            if let Some(value) = parse_u64(&v) {
                cfg.monitor.probe_max_secs = value.max(1);
            }
        }

        cfg
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.database.max_connections == 0 {
            return Err("Database max_connections must be greater than 0".to_string());
        }
        if self.sync.batch_size == 0 {
            return Err("Sync batch_size must be greater than 0".to_string());
        }
        if self.sync.call_timeout_secs == 0 {
            return Err("Sync call_timeout_secs must be greater than 0".to_string());
        }
        if self.breaker.failure_threshold == 0 {
            return Err("Breaker failure_threshold must be greater than 0".to_string());
        }
        if self.breaker.cooldown_base_secs == 0 {
            return Err("Breaker cooldown_base_secs must be greater than 0".to_string());
        }
        if self.monitor.probe_base_secs == 0 {
            return Err("Monitor probe_base_secs must be greater than 0".to_string());
        }
        if self.monitor.probe_max_secs < self.monitor.probe_base_secs {
            return Err("Monitor probe_max_secs must not be less than probe_base_secs".to_string());
        }
        if self.monitor.good_latency_ms >= self.monitor.fair_latency_ms
            || self.monitor.fair_latency_ms >= self.monitor.poor_latency_ms
        {
            return Err("Monitor latency thresholds must be strictly increasing".to_string());
        }
        Ok(())
    }
}

fn parse_bool(s: &str, default: bool) -> bool {
    match s.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => default,
    }
}

fn parse_u64(value: &str) -> Option<u64> {
    value.trim().parse::<u64>().ok()
}

fn parse_u32(value: &str) -> Option<u32> {
    value.trim().parse::<u32>().ok()
}
