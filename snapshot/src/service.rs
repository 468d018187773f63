use crate::bootstrap::BootstrapClient;
use crate::cache::{CacheStats, SnapshotCache, StaleRead};
use crate::config::{ConfigError, SnapshotConfig};
use crate::counter;
use crate::fetcher::{FetchError, SnapshotFetcher};
use crate::metrics_defs::{CACHE_HIT, CACHE_UNAVAILABLE};
use crate::monitoring::{FetchEvent, FetchMonitor, HealthReport, HealthStatus};
use crate::refresh::RefreshManager;
use crate::types::{ProjectConfig, RateLimitConfig, ServiceConfig, SnapshotData};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

#[derive(thiserror::Error, Debug)]
pub enum SnapshotError {
    /// The fail-closed signal: no unexpired snapshot exists. Consumers
    /// must map this to a retryable 503-class outcome, never to "allow".
    #[error("no valid configuration snapshot is available")]
    Unavailable,

    #[error("initial snapshot load failed: {0}")]
    InitializeFailed(#[from] FetchError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Façade over fetcher, cache, refresh and monitoring. Construct one
/// instance explicitly and share it; the cache and fetch history are owned
/// here and mutated only by the refresh path.
pub struct SnapshotService {
    config: SnapshotConfig,
    fetcher: Arc<SnapshotFetcher>,
    cache: Arc<SnapshotCache>,
    monitor: Arc<FetchMonitor>,
    refresh: RefreshManager,
}

impl SnapshotService {
    pub fn new(config: SnapshotConfig) -> Result<Self, SnapshotError> {
        config.validate()?;

        let fetcher = Arc::new(
            SnapshotFetcher::new(config.url.clone(), config.request_timeout())
                .map_err(|e| ConfigError::HttpClient(e.to_string()))?,
        );
        let cache = Arc::new(SnapshotCache::new());
        let monitor = Arc::new(FetchMonitor::new(config.thresholds.clone()));
        let refresh = RefreshManager::new(
            fetcher.clone(),
            cache.clone(),
            monitor.clone(),
            config.cache_ttl(),
        );

        Ok(SnapshotService {
            config,
            fetcher,
            cache,
            monitor,
            refresh,
        })
    }

    /// Performs the blocking bootstrap fetch and schedules the background
    /// refresh. A failure here is fatal to the caller: the gateway must not
    /// serve traffic without at least one valid snapshot.
    pub async fn initialize(&self) -> Result<(), SnapshotError> {
        let bootstrap = BootstrapClient::new(
            self.config.bootstrap_retries,
            self.config.bootstrap_retry_delay(),
        );

        let started = Instant::now();
        let data = bootstrap.fetch(&self.fetcher).await?;
        let elapsed_ms = started.elapsed().as_millis() as u64;
        let version = data.version;

        self.cache.set(data, self.config.cache_ttl());
        self.monitor
            .record_fetch(FetchEvent::fetch_success(elapsed_ms, version));
        self.refresh.start(self.config.refresh_interval());

        info!(
            version,
            ttl_secs = self.config.cache_ttl_secs,
            refresh_interval_secs = self.config.refresh_interval_secs,
            "snapshot service initialized"
        );
        Ok(())
    }

    /// The single fail-closed chokepoint: every policy lookup routes
    /// through here.
    pub fn get_snapshot(&self) -> Result<Arc<SnapshotData>, SnapshotError> {
        match self.cache.get() {
            Some(data) => {
                counter!(CACHE_HIT).increment(1);
                self.monitor.record_fetch(FetchEvent::cache_hit(data.version));
                Ok(data)
            }
            None => {
                counter!(CACHE_UNAVAILABLE).increment(1);
                Err(SnapshotError::Unavailable)
            }
        }
    }

    /// `Ok(None)` means the project key is absent from a valid snapshot;
    /// `Err(Unavailable)` means nothing can currently be determined. The
    /// two must never be conflated.
    pub fn get_project(&self, id: &str) -> Result<Option<ProjectConfig>, SnapshotError> {
        Ok(self.get_snapshot()?.projects.get(id).cloned())
    }

    pub fn get_service(&self, name: &str) -> Result<Option<ServiceConfig>, SnapshotError> {
        Ok(self.get_snapshot()?.services.get(name).cloned())
    }

    pub fn get_rate_limit(
        &self,
        project_id: &str,
    ) -> Result<Option<RateLimitConfig>, SnapshotError> {
        Ok(self.get_snapshot()?.rate_limits.get(project_id).cloned())
    }

    /// Never errors: false for a missing project and for any non-ACTIVE
    /// status.
    pub fn is_project_active(&self, id: &str) -> bool {
        matches!(self.get_project(id), Ok(Some(p)) if p.status.is_active())
    }

    /// Fails closed to `false` even when the snapshot itself is
    /// unavailable, unlike `get_project` which raises. Call sites consult
    /// this where "cannot determine" must degrade to "disabled" instead of
    /// erroring; the asymmetry is deliberate.
    pub fn is_service_enabled(&self, project_id: &str, service: &str) -> bool {
        match self.get_project(project_id) {
            Ok(Some(p)) => p.enabled_services.contains(service),
            Ok(None) | Err(_) => false,
        }
    }

    /// Stale-tolerant secondary read used by graceful-degradation policies.
    pub fn get_snapshot_with_max_stale(&self, max_stale: Duration) -> StaleRead {
        self.cache.get_with_max_stale(max_stale)
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Age of the cached snapshot regardless of expiry, for fallback
    /// decisions and diagnostics.
    pub fn snapshot_age(&self) -> Option<Duration> {
        self.cache.age()
    }

    pub fn health_report(&self) -> HealthReport {
        self.monitor.health_report()
    }

    pub fn health_status(&self) -> HealthStatus {
        self.monitor.health_report().status
    }

    pub fn on_status_change(
        &self,
        observer: impl Fn(HealthStatus, HealthStatus) + Send + Sync + 'static,
    ) {
        self.monitor.on_status_change(observer);
    }

    /// Flat key/value metrics, cache stats included, one pair per line
    /// when rendered for scraping.
    pub fn metrics(&self) -> BTreeMap<String, String> {
        let mut out = self.monitor.metrics();
        let stats = self.cache.stats();
        out.insert(
            "snapshot_cache_has_data".into(),
            stats.has_data.to_string(),
        );
        out.insert(
            "snapshot_cache_is_expired".into(),
            stats.is_expired.to_string(),
        );
        out.insert(
            "snapshot_cache_version".into(),
            stats
                .version
                .map(|v| v.to_string())
                .unwrap_or_else(|| "none".into()),
        );
        out
    }

    pub fn is_refreshing(&self) -> bool {
        self.refresh.is_refreshing()
    }

    /// Halts the background refresh. Idempotent.
    pub fn stop(&self) {
        self.refresh.stop();
    }

    #[cfg(test)]
    pub(crate) fn cache(&self) -> &SnapshotCache {
        &self.cache
    }

    #[cfg(test)]
    pub(crate) async fn refresh_once(&self) -> bool {
        self.refresh.run_once().await
    }
}
