use crate::cache::SnapshotCache;
use crate::fetcher::SnapshotFetcher;
use crate::metrics_defs::{FETCH_DURATION, REFRESH_TICK_DROPPED};
use crate::monitoring::{FetchEvent, FetchMonitor};
use crate::{counter, histogram};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

struct RefreshWorker {
    fetcher: Arc<SnapshotFetcher>,
    cache: Arc<SnapshotCache>,
    monitor: Arc<FetchMonitor>,
    ttl: Duration,
    refreshing: AtomicBool,
}

// Clears the in-flight flag however the refresh settles, so a fetch that
// panics cannot wedge the refresher into "always busy".
struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl RefreshWorker {
    /// Performs one refresh attempt. Returns false when a refresh was
    /// already in flight; the tick is dropped, never queued.
    async fn run_once(&self) -> bool {
        if self
            .refreshing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("refresh already in flight, dropping tick");
            counter!(REFRESH_TICK_DROPPED).increment(1);
            return false;
        }
        let _guard = InFlightGuard(&self.refreshing);

        let started = Instant::now();
        match self.fetcher.fetch().await {
            Ok(data) => {
                let elapsed_ms = started.elapsed().as_millis() as u64;
                let version = data.version;
                self.cache.set(data, self.ttl);
                histogram!(FETCH_DURATION).record(elapsed_ms as f64);
                self.monitor
                    .record_fetch(FetchEvent::fetch_success(elapsed_ms, version));
                debug!(version, elapsed_ms, "snapshot refreshed");
            }
            Err(err) => {
                // The last-known-good entry stays authoritative until its
                // own TTL expires; refresh failures surface only through
                // monitoring.
                let elapsed_ms = started.elapsed().as_millis() as u64;
                warn!(%err, elapsed_ms, "snapshot refresh failed");
                self.monitor
                    .record_fetch(FetchEvent::fetch_failure(elapsed_ms, err.to_string()));
            }
        }
        true
    }
}

/// Owns the recurring refresh timer. At most one refresh is ever in
/// flight; overlapping ticks are dropped.
pub struct RefreshManager {
    worker: Arc<RefreshWorker>,
    stop_tx: Mutex<Option<watch::Sender<bool>>>,
}

impl RefreshManager {
    pub fn new(
        fetcher: Arc<SnapshotFetcher>,
        cache: Arc<SnapshotCache>,
        monitor: Arc<FetchMonitor>,
        ttl: Duration,
    ) -> Self {
        RefreshManager {
            worker: Arc::new(RefreshWorker {
                fetcher,
                cache,
                monitor,
                ttl,
                refreshing: AtomicBool::new(false),
            }),
            stop_tx: Mutex::new(None),
        }
    }

    /// Spawns the background refresh loop. The task holds only a stop
    /// receiver, so dropping the manager or calling `stop` never blocks
    /// process shutdown on an in-flight fetch.
    pub fn start(&self, interval: Duration) {
        let mut stop_guard = self.stop_tx.lock();
        if stop_guard.is_some() {
            return;
        }
        let (tx, mut rx) = watch::channel(false);
        *stop_guard = Some(tx);

        let worker = self.worker.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately; the bootstrap fetch
            // already populated the cache, so skip it.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        worker.run_once().await;
                    }
                    _ = rx.changed() => {
                        debug!("refresh loop stopping");
                        break;
                    }
                }
            }
        });
    }

    /// Idempotent.
    pub fn stop(&self) {
        if let Some(tx) = self.stop_tx.lock().take() {
            let _ = tx.send(true);
        }
    }

    pub fn is_refreshing(&self) -> bool {
        self.worker.refreshing.load(Ordering::Acquire)
    }

    /// Triggers a refresh outside the normal interval.
    pub async fn run_once(&self) -> bool {
        self.worker.run_once().await
    }
}

impl Drop for RefreshManager {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MonitoringThresholds;
    use serde_json::json;
    use std::collections::HashMap;
    use crate::types::SnapshotData;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn ok_body(version: u64) -> serde_json::Value {
        json!({
            "success": true,
            "data": {"version": version, "projects": {}, "services": {}, "rateLimits": {}}
        })
    }

    fn snapshot(version: u64) -> SnapshotData {
        SnapshotData {
            version,
            projects: HashMap::new(),
            services: HashMap::new(),
            rate_limits: HashMap::new(),
        }
    }

    async fn manager_for(server: &MockServer, ttl: Duration) -> RefreshManager {
        let fetcher =
            Arc::new(SnapshotFetcher::new(server.uri(), Duration::from_secs(5)).unwrap());
        RefreshManager::new(
            fetcher,
            Arc::new(SnapshotCache::new()),
            Arc::new(FetchMonitor::new(MonitoringThresholds::default())),
            ttl,
        )
    }

    #[tokio::test]
    async fn successful_refresh_updates_cache_and_monitoring() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(ok_body(5)))
            .mount(&server)
            .await;

        let manager = manager_for(&server, Duration::from_secs(30)).await;
        assert!(manager.run_once().await);

        assert_eq!(manager.worker.cache.get().unwrap().version, 5);
        let report = manager.worker.monitor.health_report();
        assert_eq!(report.success_rate, 1.0);
        assert!(!manager.is_refreshing());
    }

    #[tokio::test]
    async fn failed_refresh_preserves_cached_snapshot() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let manager = manager_for(&server, Duration::from_secs(30)).await;
        manager.worker.cache.set(snapshot(3), Duration::from_secs(30));

        assert!(manager.run_once().await);

        // Version 3 survives, unexpired.
        let stats = manager.worker.cache.stats();
        assert_eq!(manager.worker.cache.get().unwrap().version, 3);
        assert!(!stats.is_expired);
        assert_eq!(manager.worker.monitor.consecutive_failures(), 1);
        assert!(!manager.is_refreshing());
    }

    #[tokio::test]
    async fn overlapping_ticks_run_exactly_one_fetch() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(ok_body(1))
                    .set_delay(Duration::from_millis(150)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let manager = manager_for(&server, Duration::from_secs(30)).await;
        let (first, second) = tokio::join!(manager.run_once(), manager.run_once());

        // Exactly one of the two ran; the other was dropped, not queued.
        assert!(first ^ second);
        assert_eq!(
            manager.worker.monitor.metrics()["snapshot_events_recorded"],
            "1"
        );
    }

    #[tokio::test]
    async fn in_flight_flag_clears_after_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let manager = manager_for(&server, Duration::from_secs(30)).await;
        assert!(manager.run_once().await);
        // A failed fetch must not leave the refresher wedged as busy.
        assert!(!manager.is_refreshing());
        assert!(manager.run_once().await);
    }

    #[tokio::test]
    async fn background_loop_refreshes_until_stopped() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(ok_body(8)))
            .mount(&server)
            .await;

        let manager = manager_for(&server, Duration::from_secs(30)).await;
        manager.start(Duration::from_millis(20));
        tokio::time::sleep(Duration::from_millis(80)).await;

        assert_eq!(manager.worker.cache.get().unwrap().version, 8);

        manager.stop();
        manager.stop(); // idempotent
        let before = server.received_requests().await.unwrap().len();
        tokio::time::sleep(Duration::from_millis(80)).await;
        let after = server.received_requests().await.unwrap().len();
        assert_eq!(before, after);
    }
}
