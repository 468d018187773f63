use crate::config::MonitoringThresholds;
use crate::counter;
use crate::metrics_defs::{FETCH_FAILURE, FETCH_SUCCESS};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::Instant;
use tracing::warn;

/// Bounded fetch history; oldest events are dropped on overflow.
const MAX_HISTORY: usize = 1000;
/// Rolling window the health report is computed over.
const REPORT_WINDOW: usize = 100;

/// One fetch outcome. Immutable once recorded.
#[derive(Clone, Debug)]
pub struct FetchEvent {
    pub at: Instant,
    pub success: bool,
    pub response_time_ms: u64,
    pub cache_hit: bool,
    pub version: Option<u64>,
    pub error: Option<String>,
}

impl FetchEvent {
    pub fn fetch_success(response_time_ms: u64, version: u64) -> Self {
        FetchEvent {
            at: Instant::now(),
            success: true,
            response_time_ms,
            cache_hit: false,
            version: Some(version),
            error: None,
        }
    }

    pub fn fetch_failure(response_time_ms: u64, error: String) -> Self {
        FetchEvent {
            at: Instant::now(),
            success: false,
            response_time_ms,
            cache_hit: false,
            version: None,
            error: Some(error),
        }
    }

    pub fn cache_hit(version: u64) -> Self {
        FetchEvent {
            at: Instant::now(),
            success: true,
            response_time_ms: 0,
            cache_hit: true,
            version: Some(version),
            error: None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Unhealthy => "unhealthy",
        }
    }
}

/// Derived on demand, never stored.
#[derive(Clone, Debug, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub success_rate: f64,
    pub avg_latency_ms: f64,
    pub p50_latency_ms: u64,
    pub p95_latency_ms: u64,
    pub p99_latency_ms: u64,
    pub cache_hit_rate: f64,
    pub consecutive_failures: u32,
    /// None means no fetch has ever succeeded.
    pub seconds_since_last_success: Option<u64>,
    pub issues: Vec<String>,
}

type StatusObserver = Arc<dyn Fn(HealthStatus, HealthStatus) + Send + Sync>;

struct MonitorState {
    history: VecDeque<FetchEvent>,
    // Tracked outside the bounded history so failure streaks survive
    // eviction.
    consecutive_failures: u32,
    last_success_at: Option<Instant>,
    last_status: HealthStatus,
}

/// Records fetch outcomes and derives rolling health from them.
pub struct FetchMonitor {
    thresholds: MonitoringThresholds,
    state: RwLock<MonitorState>,
    observers: Mutex<Vec<StatusObserver>>,
}

impl FetchMonitor {
    pub fn new(thresholds: MonitoringThresholds) -> Self {
        FetchMonitor {
            thresholds,
            state: RwLock::new(MonitorState {
                history: VecDeque::with_capacity(MAX_HISTORY),
                consecutive_failures: 0,
                last_success_at: None,
                last_status: HealthStatus::Healthy,
            }),
            observers: Mutex::new(Vec::new()),
        }
    }

    /// Registers a status-change observer. Observers fire only on
    /// transitions, never on repeated reports of the same status.
    pub fn on_status_change(
        &self,
        observer: impl Fn(HealthStatus, HealthStatus) + Send + Sync + 'static,
    ) {
        self.observers.lock().push(Arc::new(observer));
    }

    pub fn record_fetch(&self, event: FetchEvent) {
        if !event.cache_hit {
            if event.success {
                counter!(FETCH_SUCCESS).increment(1);
            } else {
                counter!(FETCH_FAILURE).increment(1);
            }
        }

        let transition = {
            let mut state = self.state.write();
            if state.history.len() == MAX_HISTORY {
                state.history.pop_front();
            }

            if !event.cache_hit {
                if event.success {
                    state.consecutive_failures = 0;
                    state.last_success_at = Some(event.at);
                } else {
                    state.consecutive_failures += 1;
                }
            }
            state.history.push_back(event);

            let status = report_from(&state, &self.thresholds).status;
            if status != state.last_status {
                let previous = state.last_status;
                state.last_status = status;
                Some((previous, status))
            } else {
                None
            }
        };

        // Notify outside both locks; observers may call back into us, so
        // the list is snapshotted before any callback runs.
        if let Some((previous, current)) = transition {
            warn!(
                previous = previous.as_str(),
                current = current.as_str(),
                "snapshot health status changed"
            );
            let observers: Vec<StatusObserver> = self.observers.lock().clone();
            for observer in &observers {
                observer(previous, current);
            }
        }
    }

    pub fn health_report(&self) -> HealthReport {
        report_from(&self.state.read(), &self.thresholds)
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.state.read().consecutive_failures
    }

    /// Flat key/value view for text-based scraping.
    pub fn metrics(&self) -> BTreeMap<String, String> {
        let report = self.health_report();
        let events = self.state.read().history.len();

        let mut out = BTreeMap::new();
        out.insert(
            "snapshot_health_status".into(),
            report.status.as_str().into(),
        );
        out.insert(
            "snapshot_fetch_success_rate".into(),
            format!("{:.4}", report.success_rate),
        );
        out.insert(
            "snapshot_fetch_latency_avg_ms".into(),
            format!("{:.1}", report.avg_latency_ms),
        );
        out.insert(
            "snapshot_fetch_latency_p50_ms".into(),
            report.p50_latency_ms.to_string(),
        );
        out.insert(
            "snapshot_fetch_latency_p95_ms".into(),
            report.p95_latency_ms.to_string(),
        );
        out.insert(
            "snapshot_fetch_latency_p99_ms".into(),
            report.p99_latency_ms.to_string(),
        );
        out.insert(
            "snapshot_cache_hit_rate".into(),
            format!("{:.4}", report.cache_hit_rate),
        );
        out.insert(
            "snapshot_consecutive_failures".into(),
            report.consecutive_failures.to_string(),
        );
        out.insert(
            "snapshot_seconds_since_last_success".into(),
            report
                .seconds_since_last_success
                .map(|s| s.to_string())
                .unwrap_or_else(|| "never".into()),
        );
        out.insert("snapshot_events_recorded".into(), events.to_string());
        out
    }

    pub fn reset(&self) {
        let mut state = self.state.write();
        state.history.clear();
        state.consecutive_failures = 0;
        state.last_success_at = None;
        state.last_status = HealthStatus::Healthy;
    }
}

/// Nearest-rank percentile: the `ceil(p/100 * n) - 1`th element of the
/// ascending-sorted list, clamped to index 0.
fn percentile(sorted: &[u64], p: f64) -> u64 {
    if sorted.is_empty() {
        return 0;
    }
    let rank = ((p / 100.0) * sorted.len() as f64).ceil() as usize;
    sorted[rank.saturating_sub(1).min(sorted.len() - 1)]
}

fn report_from(state: &MonitorState, thresholds: &MonitoringThresholds) -> HealthReport {
    let window: Vec<&FetchEvent> = state
        .history
        .iter()
        .rev()
        .take(REPORT_WINDOW)
        .collect();

    let fetches: Vec<&&FetchEvent> = window.iter().filter(|e| !e.cache_hit).collect();
    let fetch_total = fetches.len();
    let fetch_successes = fetches.iter().filter(|e| e.success).count();
    let success_rate = if fetch_total == 0 {
        1.0
    } else {
        fetch_successes as f64 / fetch_total as f64
    };

    let mut latencies: Vec<u64> = fetches.iter().map(|e| e.response_time_ms).collect();
    latencies.sort_unstable();
    let avg_latency_ms = if latencies.is_empty() {
        0.0
    } else {
        latencies.iter().sum::<u64>() as f64 / latencies.len() as f64
    };
    let p50 = percentile(&latencies, 50.0);
    let p95 = percentile(&latencies, 95.0);
    let p99 = percentile(&latencies, 99.0);

    let hits = window.iter().filter(|e| e.cache_hit).count();
    let cache_hit_rate = if window.is_empty() {
        0.0
    } else {
        hits as f64 / window.len() as f64
    };

    let seconds_since_last_success = state.last_success_at.map(|t| t.elapsed().as_secs());

    let mut issues = Vec::new();
    if fetch_total > 0 && success_rate < thresholds.min_success_rate {
        issues.push(format!(
            "fetch success rate {success_rate:.2} is below the {:.2} threshold",
            thresholds.min_success_rate
        ));
    }
    if p50 > thresholds.max_latency_p50_ms {
        issues.push(format!(
            "p50 fetch latency {p50}ms exceeds {}ms",
            thresholds.max_latency_p50_ms
        ));
    }
    if p95 > thresholds.max_latency_p95_ms {
        issues.push(format!(
            "p95 fetch latency {p95}ms exceeds {}ms",
            thresholds.max_latency_p95_ms
        ));
    }
    if p99 > thresholds.max_latency_p99_ms {
        issues.push(format!(
            "p99 fetch latency {p99}ms exceeds {}ms",
            thresholds.max_latency_p99_ms
        ));
    }
    if !window.is_empty() && cache_hit_rate < thresholds.min_cache_hit_rate {
        issues.push(format!(
            "cache hit rate {cache_hit_rate:.2} is below the {:.2} threshold",
            thresholds.min_cache_hit_rate
        ));
    }
    match seconds_since_last_success {
        Some(age) if age > thresholds.max_snapshot_age_secs => {
            issues.push(format!(
                "last successful fetch was {age}s ago, older than {}s",
                thresholds.max_snapshot_age_secs
            ));
        }
        None if fetch_total > 0 => {
            issues.push("no fetch has ever succeeded".into());
        }
        _ => {}
    }

    let unhealthy = state.consecutive_failures >= thresholds.max_consecutive_failures
        || (fetch_total > 0 && success_rate < 0.5 * thresholds.min_success_rate);
    if state.consecutive_failures >= thresholds.max_consecutive_failures {
        issues.push(format!(
            "{} consecutive fetch failures (limit {})",
            state.consecutive_failures, thresholds.max_consecutive_failures
        ));
    }

    let status = if unhealthy {
        HealthStatus::Unhealthy
    } else if issues.is_empty() {
        HealthStatus::Healthy
    } else {
        HealthStatus::Degraded
    };

    HealthReport {
        status,
        success_rate,
        avg_latency_ms,
        p50_latency_ms: p50,
        p95_latency_ms: p95,
        p99_latency_ms: p99,
        cache_hit_rate,
        consecutive_failures: state.consecutive_failures,
        seconds_since_last_success,
        issues,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn monitor() -> FetchMonitor {
        FetchMonitor::new(MonitoringThresholds::default())
    }

    #[test]
    fn empty_monitor_is_healthy() {
        let report = monitor().health_report();
        assert_eq!(report.status, HealthStatus::Healthy);
        assert_eq!(report.success_rate, 1.0);
        assert_eq!(report.consecutive_failures, 0);
        assert_eq!(report.seconds_since_last_success, None);
        assert!(report.issues.is_empty());
    }

    #[test]
    fn percentile_uses_nearest_rank() {
        let m = monitor();
        for latency in [10, 20, 30, 40, 50] {
            m.record_fetch(FetchEvent::fetch_success(latency, 1));
        }
        let report = m.health_report();
        // ceil(0.95 * 5) - 1 = 4 and ceil(0.5 * 5) - 1 = 2, clamped math
        // per the nearest-rank definition over the ascending list.
        assert_eq!(report.p95_latency_ms, 50);
        assert_eq!(report.p50_latency_ms, 30);
        assert_eq!(report.p99_latency_ms, 50);
        assert_eq!(report.avg_latency_ms, 30.0);
    }

    #[test]
    fn percentile_of_singleton_and_empty() {
        assert_eq!(percentile(&[], 95.0), 0);
        assert_eq!(percentile(&[7], 50.0), 7);
        assert_eq!(percentile(&[7], 99.0), 7);
    }

    #[test]
    fn consecutive_failures_reset_on_success() {
        let m = monitor();
        m.record_fetch(FetchEvent::fetch_failure(10, "timeout".into()));
        m.record_fetch(FetchEvent::fetch_failure(10, "timeout".into()));
        assert_eq!(m.consecutive_failures(), 2);

        m.record_fetch(FetchEvent::fetch_success(10, 3));
        assert_eq!(m.consecutive_failures(), 0);
    }

    #[test]
    fn cache_hits_do_not_touch_failure_streaks() {
        let m = monitor();
        m.record_fetch(FetchEvent::fetch_failure(10, "timeout".into()));
        m.record_fetch(FetchEvent::cache_hit(1));
        assert_eq!(m.consecutive_failures(), 1);
    }

    #[test]
    fn history_is_bounded_fifo() {
        let m = monitor();
        for i in 0..(MAX_HISTORY + 50) {
            m.record_fetch(FetchEvent::fetch_success(1, i as u64));
        }
        let state = m.state.read();
        assert_eq!(state.history.len(), MAX_HISTORY);
        // The 50 oldest events were evicted.
        assert_eq!(state.history.front().unwrap().version, Some(50));
    }

    #[test]
    fn failure_streak_survives_history_eviction() {
        let m = monitor();
        for _ in 0..(MAX_HISTORY + 10) {
            m.record_fetch(FetchEvent::fetch_failure(1, "down".into()));
        }
        assert_eq!(m.consecutive_failures(), (MAX_HISTORY + 10) as u32);
    }

    #[test]
    fn unhealthy_on_consecutive_failures() {
        let m = monitor();
        // Seed successes so the success rate alone does not trip rule 1.
        for _ in 0..95 {
            m.record_fetch(FetchEvent::fetch_success(10, 1));
        }
        for _ in 0..5 {
            m.record_fetch(FetchEvent::fetch_failure(10, "down".into()));
        }
        let report = m.health_report();
        assert_eq!(report.status, HealthStatus::Unhealthy);
        assert!(report.issues.iter().any(|i| i.contains("consecutive")));
    }

    #[test]
    fn degraded_on_threshold_violation() {
        let thresholds = MonitoringThresholds {
            max_latency_p95_ms: 100,
            ..MonitoringThresholds::default()
        };
        let m = FetchMonitor::new(thresholds);
        for _ in 0..10 {
            m.record_fetch(FetchEvent::fetch_success(500, 1));
        }
        let report = m.health_report();
        assert_eq!(report.status, HealthStatus::Degraded);
        assert!(report.issues.iter().any(|i| i.contains("p95")));
    }

    #[test]
    fn status_change_is_edge_triggered() {
        let m = monitor();
        let notifications = Arc::new(AtomicUsize::new(0));
        let seen = notifications.clone();
        m.on_status_change(move |_, _| {
            seen.fetch_add(1, Ordering::SeqCst);
        });

        // First failure already drops the windowed success rate to zero,
        // flipping healthy -> unhealthy. Nine more "still failing" events
        // must not notify again.
        for _ in 0..10 {
            m.record_fetch(FetchEvent::fetch_failure(10, "down".into()));
        }
        assert_eq!(notifications.load(Ordering::SeqCst), 1);

        // Recovery walks back through degraded (windowed success rate
        // recovers gradually) and then healthy: two more edges, no matter
        // how many success events are recorded.
        for _ in 0..100 {
            m.record_fetch(FetchEvent::fetch_success(10, 2));
        }
        assert_eq!(m.health_report().status, HealthStatus::Healthy);
        assert_eq!(notifications.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn observers_may_register_observers_from_a_callback() {
        // Registration from inside a notification must not deadlock, and
        // the newly added observer sees later transitions.
        let m = Arc::new(monitor());
        let late_notifications = Arc::new(AtomicUsize::new(0));

        let registrar = m.clone();
        let seen = late_notifications.clone();
        m.on_status_change(move |_, _| {
            let seen = seen.clone();
            registrar.on_status_change(move |_, _| {
                seen.fetch_add(1, Ordering::SeqCst);
            });
        });

        // healthy -> unhealthy: the outer observer registers a new one.
        m.record_fetch(FetchEvent::fetch_failure(10, "down".into()));
        assert_eq!(late_notifications.load(Ordering::SeqCst), 0);

        // unhealthy -> degraded -> healthy reaches the late registrant.
        for _ in 0..100 {
            m.record_fetch(FetchEvent::fetch_success(10, 1));
        }
        assert_eq!(m.health_report().status, HealthStatus::Healthy);
        assert!(late_notifications.load(Ordering::SeqCst) >= 2);
    }

    #[test]
    fn metrics_map_is_flat_and_complete() {
        let m = monitor();
        m.record_fetch(FetchEvent::fetch_success(25, 3));
        m.record_fetch(FetchEvent::cache_hit(3));

        let metrics = m.metrics();
        assert_eq!(metrics["snapshot_health_status"], "healthy");
        assert_eq!(metrics["snapshot_fetch_success_rate"], "1.0000");
        assert_eq!(metrics["snapshot_cache_hit_rate"], "0.5000");
        assert_eq!(metrics["snapshot_events_recorded"], "2");
        assert_eq!(metrics["snapshot_consecutive_failures"], "0");
    }

    #[test]
    fn reset_clears_everything() {
        let m = monitor();
        m.record_fetch(FetchEvent::fetch_failure(10, "down".into()));
        m.reset();
        assert_eq!(m.consecutive_failures(), 0);
        assert_eq!(m.health_report().status, HealthStatus::Healthy);
        assert_eq!(m.metrics()["snapshot_events_recorded"], "0");
    }
}
