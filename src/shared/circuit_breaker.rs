use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tokio::sync::Mutex;

use crate::shared::config::BreakerConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl BreakerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            BreakerState::Closed => "closed",
            BreakerState::Open => "open",
            BreakerState::HalfOpen => "half_open",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BreakerSnapshot {
    pub state: BreakerState,
    pub consecutive_failures: u32,
    pub opened_at: Option<DateTime<Utc>>,
    pub next_probe_at: Option<DateTime<Utc>>,
}

/// Outcome of asking the breaker whether a backend call may go out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallPermit {
    Allowed,
    /// Exactly one trial call is allowed while half-open.
    Probe,
    Rejected {
        next_probe_at: Option<DateTime<Utc>>,
    },
}

#[derive(Debug)]
struct BreakerInner {
    state: BreakerState,
    consecutive_failures: u32,
    opened_at: Option<DateTime<Utc>>,
    next_probe_at: Option<DateTime<Utc>>,
    probe_in_flight: bool,
}

/// Trips after a run of consecutive transport failures and short-circuits
/// further backend calls until a cooldown elapses. The cooldown grows
/// exponentially with each failed probe.
pub struct CircuitBreaker {
    inner: Mutex<BreakerInner>,
    config: BreakerConfig,
}

impl CircuitBreaker {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            inner: Mutex::new(BreakerInner {
                state: BreakerState::Closed,
                consecutive_failures: 0,
                opened_at: None,
                next_probe_at: None,
                probe_in_flight: false,
            }),
            config,
        }
    }

    pub async fn check(&self) -> CallPermit {
        self.check_at(Utc::now()).await
    }

    async fn check_at(&self, now: DateTime<Utc>) -> CallPermit {
        let mut inner = self.inner.lock().await;
        match inner.state {
            BreakerState::Closed => CallPermit::Allowed,
            BreakerState::Open => match inner.next_probe_at {
                Some(at) if now >= at => {
                    inner.state = BreakerState::HalfOpen;
                    inner.probe_in_flight = true;
                    tracing::info!(target: "sync::breaker", "cooldown elapsed, probing backend");
                    CallPermit::Probe
                }
                _ => CallPermit::Rejected {
                    next_probe_at: inner.next_probe_at,
                },
            },
            BreakerState::HalfOpen => {
                if inner.probe_in_flight {
                    CallPermit::Rejected {
                        next_probe_at: inner.next_probe_at,
                    }
                } else {
                    inner.probe_in_flight = true;
                    CallPermit::Probe
                }
            }
        }
    }

    /// Returns a snapshot when the call closed the breaker.
    pub async fn record_success(&self) -> Option<BreakerSnapshot> {
        let mut inner = self.inner.lock().await;
        inner.probe_in_flight = false;
        inner.consecutive_failures = 0;
        if inner.state == BreakerState::Closed {
            return None;
        }
        inner.state = BreakerState::Closed;
        inner.opened_at = None;
        inner.next_probe_at = None;
        tracing::info!(target: "sync::breaker", "probe succeeded, breaker closed");
        Some(snapshot_of(&inner))
    }

    /// Returns a snapshot when the failure opened (or re-opened) the breaker.
    pub async fn record_failure(&self) -> Option<BreakerSnapshot> {
        self.record_failure_at(Utc::now()).await
    }

    async fn record_failure_at(&self, now: DateTime<Utc>) -> Option<BreakerSnapshot> {
        let mut inner = self.inner.lock().await;
        inner.probe_in_flight = false;
        inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);
        match inner.state {
            BreakerState::Closed => {
                if inner.consecutive_failures < self.config.failure_threshold {
                    return None;
                }
                let cooldown = self.cooldown(inner.consecutive_failures);
                inner.state = BreakerState::Open;
                inner.opened_at = Some(now);
                inner.next_probe_at = Some(now + cooldown);
                tracing::warn!(
                    target: "sync::breaker",
                    failures = inner.consecutive_failures,
                    cooldown_secs = cooldown.num_seconds(),
                    "failure threshold reached, breaker opened"
                );
                Some(snapshot_of(&inner))
            }
            BreakerState::HalfOpen => {
                let cooldown = self.cooldown(inner.consecutive_failures);
                inner.state = BreakerState::Open;
                inner.next_probe_at = Some(now + cooldown);
                tracing::warn!(
                    target: "sync::breaker",
                    failures = inner.consecutive_failures,
                    cooldown_secs = cooldown.num_seconds(),
                    "probe failed, breaker re-opened"
                );
                Some(snapshot_of(&inner))
            }
            // Late completion of a call that was already in flight when the
            // breaker opened. The scheduled probe stays as it is.
            BreakerState::Open => None,
        }
    }

    pub async fn snapshot(&self) -> BreakerSnapshot {
        let inner = self.inner.lock().await;
        snapshot_of(&inner)
    }

    fn cooldown(&self, failures: u32) -> Duration {
        let exponent = failures
            .saturating_sub(self.config.failure_threshold)
            .min(self.config.cooldown_cap_exponent)
            .min(62);
        let secs = self
            .config
            .cooldown_base_secs
            .saturating_mul(1u64 << exponent);
        Duration::seconds(secs as i64)
    }
}

fn snapshot_of(inner: &BreakerInner) -> BreakerSnapshot {
    BreakerSnapshot {
        state: inner.state,
        consecutive_failures: inner.consecutive_failures,
        opened_at: inner.opened_at,
        next_probe_at: inner.next_probe_at,
    }
}
