use serde::Deserialize;
use std::time::Duration;
use url::Url;

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("invalid snapshot URL: {0}")]
    InvalidUrl(String),

    #[error("request timeout must be greater than zero")]
    InvalidTimeout,

    #[error("cache TTL must be greater than zero")]
    InvalidTtl,

    // An interval at or above the TTL leaves a window where the cache can
    // expire before the next scheduled refresh completes.
    #[error("refresh interval ({refresh_interval_secs}s) must be strictly less than the cache TTL ({cache_ttl_secs}s)")]
    RefreshIntervalTooLong {
        refresh_interval_secs: u64,
        cache_ttl_secs: u64,
    },

    #[error("could not build HTTP client: {0}")]
    HttpClient(String),
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct SnapshotConfig {
    /// Control plane snapshot endpoint.
    pub url: String,
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    #[serde(default = "default_refresh_interval_secs")]
    pub refresh_interval_secs: u64,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_bootstrap_retries")]
    pub bootstrap_retries: u32,
    #[serde(default = "default_bootstrap_retry_delay_ms")]
    pub bootstrap_retry_delay_ms: u64,
    #[serde(default)]
    pub thresholds: MonitoringThresholds,
}

fn default_cache_ttl_secs() -> u64 {
    30
}
fn default_refresh_interval_secs() -> u64 {
    25
}
fn default_request_timeout_ms() -> u64 {
    5000
}
fn default_bootstrap_retries() -> u32 {
    3
}
fn default_bootstrap_retry_delay_ms() -> u64 {
    1000
}

impl SnapshotConfig {
    pub fn new(url: impl Into<String>) -> Self {
        SnapshotConfig {
            url: url.into(),
            cache_ttl_secs: default_cache_ttl_secs(),
            refresh_interval_secs: default_refresh_interval_secs(),
            request_timeout_ms: default_request_timeout_ms(),
            bootstrap_retries: default_bootstrap_retries(),
            bootstrap_retry_delay_ms: default_bootstrap_retry_delay_ms(),
            thresholds: MonitoringThresholds::default(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        Url::parse(&self.url).map_err(|e| ConfigError::InvalidUrl(e.to_string()))?;

        if self.request_timeout_ms == 0 {
            return Err(ConfigError::InvalidTimeout);
        }
        if self.cache_ttl_secs == 0 {
            return Err(ConfigError::InvalidTtl);
        }
        if self.refresh_interval_secs >= self.cache_ttl_secs {
            return Err(ConfigError::RefreshIntervalTooLong {
                refresh_interval_secs: self.refresh_interval_secs,
                cache_ttl_secs: self.cache_ttl_secs,
            });
        }
        Ok(())
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn bootstrap_retry_delay(&self) -> Duration {
        Duration::from_millis(self.bootstrap_retry_delay_ms)
    }
}

/// Thresholds used to derive the rolling health status.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct MonitoringThresholds {
    #[serde(default = "default_max_latency_p50_ms")]
    pub max_latency_p50_ms: u64,
    #[serde(default = "default_max_latency_p95_ms")]
    pub max_latency_p95_ms: u64,
    #[serde(default = "default_max_latency_p99_ms")]
    pub max_latency_p99_ms: u64,
    #[serde(default = "default_min_success_rate")]
    pub min_success_rate: f64,
    /// 0.0 disables the cache-hit-rate check; refresh-only deployments
    /// record few read events and would otherwise always look degraded.
    #[serde(default)]
    pub min_cache_hit_rate: f64,
    #[serde(default = "default_max_consecutive_failures")]
    pub max_consecutive_failures: u32,
    #[serde(default = "default_max_snapshot_age_secs")]
    pub max_snapshot_age_secs: u64,
}

fn default_max_latency_p50_ms() -> u64 {
    1000
}
fn default_max_latency_p95_ms() -> u64 {
    3000
}
fn default_max_latency_p99_ms() -> u64 {
    5000
}
fn default_min_success_rate() -> f64 {
    0.95
}
fn default_max_consecutive_failures() -> u32 {
    5
}
fn default_max_snapshot_age_secs() -> u64 {
    120
}

impl Default for MonitoringThresholds {
    fn default() -> Self {
        MonitoringThresholds {
            max_latency_p50_ms: default_max_latency_p50_ms(),
            max_latency_p95_ms: default_max_latency_p95_ms(),
            max_latency_p99_ms: default_max_latency_p99_ms(),
            min_success_rate: default_min_success_rate(),
            min_cache_hit_rate: 0.0,
            max_consecutive_failures: default_max_consecutive_failures(),
            max_snapshot_age_secs: default_max_snapshot_age_secs(),
        }
    }
}
