use crate::application::ports::{ConnectivityProbe, SyncEventSink};
use crate::domain::entities::ConnectivitySnapshot;
use crate::domain::value_objects::NetworkQuality;
use crate::shared::config::MonitorConfig;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;

struct MonitorState {
    snapshot: ConnectivitySnapshot,
    miss_streak: u32,
}

/// Single source of truth for connectivity. Platform signals arrive through
/// `report_online`/`report_offline`; where no platform signal exists, an
/// optional probe samples the backend, backing off while the link is down.
pub struct NetworkMonitor {
    probe: Option<Arc<dyn ConnectivityProbe>>,
    sink: Option<Arc<dyn SyncEventSink>>,
    state: RwLock<MonitorState>,
    config: MonitorConfig,
    probe_loop: Mutex<Option<JoinHandle<()>>>,
}

impl NetworkMonitor {
    pub fn new(
        config: MonitorConfig,
        probe: Option<Arc<dyn ConnectivityProbe>>,
        sink: Option<Arc<dyn SyncEventSink>>,
    ) -> Self {
        // Optimistic until the first signal says otherwise, so a fresh start
        // never blocks an immediate sync attempt.
        Self {
            probe,
            sink,
            state: RwLock::new(MonitorState {
                snapshot: ConnectivitySnapshot {
                    online: true,
                    quality: NetworkQuality::Good,
                    last_change: Utc::now(),
                },
                miss_streak: 0,
            }),
            config,
            probe_loop: Mutex::new(None),
        }
    }

    pub async fn snapshot(&self) -> ConnectivitySnapshot {
        self.state.read().await.snapshot
    }

    pub async fn is_online(&self) -> bool {
        self.state.read().await.snapshot.online
    }

    pub async fn is_usable(&self) -> bool {
        self.state.read().await.snapshot.is_usable()
    }

    pub async fn quality(&self) -> NetworkQuality {
        self.state.read().await.snapshot.quality
    }

    /// Feeds a positive connectivity signal in, classifying quality from the
    /// observed latency when one is supplied. Returns true on a transition.
    pub async fn report_online(&self, latency_ms: Option<u64>) -> bool {
        let quality = match latency_ms {
            Some(ms) => NetworkQuality::from_latency(
                ms,
                self.config.good_latency_ms,
                self.config.fair_latency_ms,
                self.config.poor_latency_ms,
            ),
            None => NetworkQuality::Good,
        };
        self.apply(true, quality, 0).await
    }

    pub async fn report_offline(&self) -> bool {
        let miss_streak = {
            let state = self.state.read().await;
            state.miss_streak.saturating_add(1)
        };
        self.apply(false, NetworkQuality::Unusable, miss_streak)
            .await
    }

    /// Runs one probe round if a probe is configured. Returns the resulting
    /// online flag.
    pub async fn sample_once(&self) -> bool {
        let Some(probe) = self.probe.clone() else {
            return self.is_online().await;
        };
        match probe.check().await {
            Ok(latency) => {
                self.report_online(Some(latency.as_millis() as u64)).await;
                true
            }
            Err(err) => {
                tracing::debug!(target: "sync::monitor", error = %err, "connectivity probe missed");
                self.report_offline().await;
                false
            }
        }
    }

    /// Spawns the periodic probe loop. No-op without a probe or when the
    /// loop is already running.
    pub async fn start(self: &Arc<Self>) {
        if self.probe.is_none() {
            return;
        }
        let mut slot = self.probe_loop.lock().await;
        if slot.is_some() {
            return;
        }
        let monitor = Arc::clone(self);
        *slot = Some(tokio::spawn(async move {
            loop {
                let delay = monitor.next_probe_delay().await;
                tokio::time::sleep(delay).await;
                monitor.sample_once().await;
            }
        }));
        tracing::info!(target: "sync::monitor", "connectivity probe loop started");
    }

    pub async fn stop(&self) {
        if let Some(handle) = self.probe_loop.lock().await.take() {
            handle.abort();
            tracing::info!(target: "sync::monitor", "connectivity probe loop stopped");
        }
    }

    /// While online, samples at the regular cadence. While offline, the gap
    /// doubles per consecutive miss up to the configured ceiling.
    async fn next_probe_delay(&self) -> Duration {
        let state = self.state.read().await;
        if state.snapshot.online {
            return Duration::from_secs(self.config.sample_interval_secs);
        }
        let exponent = state.miss_streak.saturating_sub(1).min(32);
        let secs = self
            .config
            .probe_base_secs
            .saturating_mul(1u64 << exponent)
            .min(self.config.probe_max_secs);
        Duration::from_secs(secs)
    }

    async fn apply(&self, online: bool, quality: NetworkQuality, miss_streak: u32) -> bool {
        let changed_snapshot = {
            let mut state = self.state.write().await;
            state.miss_streak = miss_streak;
            let changed =
                state.snapshot.online != online || state.snapshot.quality != quality;
            if changed {
                state.snapshot = ConnectivitySnapshot {
                    online,
                    quality,
                    last_change: Utc::now(),
                };
                Some(state.snapshot)
            } else {
                None
            }
        };
        match changed_snapshot {
            Some(snapshot) => {
                tracing::info!(
                    target: "sync::monitor",
                    online = snapshot.online,
                    quality = snapshot.quality.as_str(),
                    "connectivity changed"
                );
                self.emit_change(&snapshot);
                true
            }
            None => false,
        }
    }

    fn emit_change(&self, snapshot: &ConnectivitySnapshot) {
        if let Some(sink) = &self.sink {
            if let Err(err) = sink.connectivity_changed(snapshot) {
                tracing::warn!(
                    target: "sync::monitor",
                    error = %err,
                    "failed to emit connectivity change event"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{DrainReport, SyncConflict, SyncTask};
    use crate::domain::value_objects::TaskId;
    use crate::shared::circuit_breaker::BreakerSnapshot;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex as StdMutex;

    struct ScriptedProbe {
        results: StdMutex<VecDeque<Result<Duration, String>>>,
    }

    impl ScriptedProbe {
        fn new(results: Vec<Result<Duration, String>>) -> Arc<Self> {
            Arc::new(Self {
                results: StdMutex::new(results.into()),
            })
        }
    }

    #[async_trait]
    impl ConnectivityProbe for ScriptedProbe {
        async fn check(&self) -> Result<Duration, String> {
            self.results
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err("probe script exhausted".to_string()))
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        connectivity: StdMutex<Vec<bool>>,
    }

    impl SyncEventSink for RecordingSink {
        fn connectivity_changed(&self, snapshot: &ConnectivitySnapshot) -> Result<(), String> {
            self.connectivity.lock().unwrap().push(snapshot.online);
            Ok(())
        }
        fn breaker_changed(&self, _snapshot: &BreakerSnapshot) -> Result<(), String> {
            Ok(())
        }
        fn task_synced(&self, _task: &SyncTask) -> Result<(), String> {
            Ok(())
        }
        fn task_failed(&self, _task_id: &TaskId, _error: &str, _terminal: bool) -> Result<(), String> {
            Ok(())
        }
        fn conflict_detected(&self, _conflict: &SyncConflict) -> Result<(), String> {
            Ok(())
        }
        fn drain_finished(&self, _report: &DrainReport) -> Result<(), String> {
            Ok(())
        }
    }

    fn monitor_with(
        probe: Option<Arc<dyn ConnectivityProbe>>,
        sink: Option<Arc<dyn SyncEventSink>>,
    ) -> NetworkMonitor {
        NetworkMonitor::new(MonitorConfig::default(), probe, sink)
    }

    #[tokio::test]
    async fn test_starts_online_and_usable() {
        let monitor = monitor_with(None, None);
        assert!(monitor.is_online().await);
        assert!(monitor.is_usable().await);
        assert_eq!(monitor.quality().await, NetworkQuality::Good);
    }

    #[tokio::test]
    async fn test_report_offline_transitions_and_emits() {
        let sink = Arc::new(RecordingSink::default());
        let monitor = monitor_with(None, Some(sink.clone()));

        assert!(monitor.report_offline().await);
        assert!(!monitor.is_online().await);
        assert!(!monitor.is_usable().await);

        // Repeating the same signal is not a transition.
        assert!(!monitor.report_offline().await);
        assert_eq!(*sink.connectivity.lock().unwrap(), vec![false]);

        assert!(monitor.report_online(None).await);
        assert_eq!(*sink.connectivity.lock().unwrap(), vec![false, true]);
    }

    #[tokio::test]
    async fn test_latency_reports_classify_quality() {
        let monitor = monitor_with(None, None);
        monitor.report_online(Some(800)).await;
        assert_eq!(monitor.quality().await, NetworkQuality::Poor);
        assert!(monitor.is_usable().await);

        monitor.report_online(Some(3_000)).await;
        assert_eq!(monitor.quality().await, NetworkQuality::Unusable);
        assert!(monitor.is_online().await);
        assert!(!monitor.is_usable().await);
    }

    #[tokio::test]
    async fn test_sample_once_follows_probe_results() {
        let probe = ScriptedProbe::new(vec![
            Err("connection refused".to_string()),
            Ok(Duration::from_millis(120)),
        ]);
        let monitor = monitor_with(Some(probe), None);

        assert!(!monitor.sample_once().await);
        assert!(!monitor.is_online().await);

        assert!(monitor.sample_once().await);
        assert!(monitor.is_online().await);
        assert_eq!(monitor.quality().await, NetworkQuality::Good);
    }

    #[tokio::test]
    async fn test_probe_delay_backs_off_while_offline() {
        let probe = ScriptedProbe::new(vec![
            Err("down".to_string()),
            Err("down".to_string()),
            Err("down".to_string()),
        ]);
        let monitor = monitor_with(Some(probe), None);

        monitor.sample_once().await;
        assert_eq!(monitor.next_probe_delay().await, Duration::from_secs(5));
        monitor.sample_once().await;
        assert_eq!(monitor.next_probe_delay().await, Duration::from_secs(10));
        monitor.sample_once().await;
        assert_eq!(monitor.next_probe_delay().await, Duration::from_secs(20));
    }

    #[tokio::test]
    async fn test_probe_delay_caps_at_max() {
        let config = MonitorConfig {
            probe_base_secs: 5,
            probe_max_secs: 15,
            ..MonitorConfig::default()
        };
        let monitor = NetworkMonitor::new(config, None, None);
        for _ in 0..6 {
            monitor.report_offline().await;
        }
        assert_eq!(monitor.next_probe_delay().await, Duration::from_secs(15));
    }

    #[tokio::test]
    async fn test_recovery_resets_backoff() {
        let monitor = monitor_with(None, None);
        for _ in 0..4 {
            monitor.report_offline().await;
        }
        monitor.report_online(Some(100)).await;
        monitor.report_offline().await;
        assert_eq!(monitor.next_probe_delay().await, Duration::from_secs(5));
    }
}
