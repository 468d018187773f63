//! Snapshot cache and refresh engine.
//!
//! Pulls a versioned configuration snapshot (projects, services, rate
//! limits) from the control plane, caches it in memory with a TTL, and
//! refreshes it on a background interval. Policy lookups read only the
//! in-memory cache and fail closed when no unexpired snapshot exists.

pub mod bootstrap;
pub mod cache;
pub mod config;
pub mod fallback;
pub mod fetcher;
pub mod metrics_defs;
pub mod monitoring;
pub mod refresh;
pub mod service;
pub mod types;

pub use cache::{CacheStats, SnapshotCache, StaleRead};
pub use config::{ConfigError, MonitoringThresholds, SnapshotConfig};
pub use fallback::{FallbackDecision, FallbackManager, FallbackStrategy};
pub use fetcher::FetchError;
pub use monitoring::{FetchEvent, FetchMonitor, HealthReport, HealthStatus};
pub use service::{SnapshotError, SnapshotService};
pub use types::{ProjectConfig, ProjectStatus, RateLimitConfig, ServiceConfig, SnapshotData};
