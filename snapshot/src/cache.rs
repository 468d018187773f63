use crate::types::SnapshotData;
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

struct CacheEntry {
    data: Arc<SnapshotData>,
    version: u64,
    fetched_at: Instant,
    fetched_at_wall: SystemTime,
    expires_at: Instant,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Diagnostic view of the cache. Reports the last known entry even when it
/// has expired, so operators can see what the gateway last held.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CacheStats {
    pub has_data: bool,
    pub version: Option<u64>,
    pub fetched_at_epoch_secs: Option<u64>,
    pub expires_at_epoch_secs: Option<u64>,
    pub is_expired: bool,
}

/// Result of a stale-tolerant read.
pub enum StaleRead {
    Fresh(Arc<SnapshotData>),
    Stale { data: Arc<SnapshotData>, age: Duration },
    TooStale,
}

/// Holds at most one snapshot entry. Replaced wholesale by `set`, never
/// merged, so readers can never observe a mix of old and new sub-fields.
pub struct SnapshotCache {
    entry: RwLock<Option<CacheEntry>>,
}

impl SnapshotCache {
    pub fn new() -> Self {
        SnapshotCache {
            entry: RwLock::new(None),
        }
    }

    /// Returns the cached snapshot only while it is unexpired. Expired
    /// entries are kept for diagnostics but behave as absent here.
    pub fn get(&self) -> Option<Arc<SnapshotData>> {
        let guard = self.entry.read();
        let entry = guard.as_ref()?;
        if entry.is_expired(Instant::now()) {
            return None;
        }
        Some(entry.data.clone())
    }

    /// Returns data past the nominal TTL as long as it was fetched no
    /// longer than `max_stale` ago, distinguishing fresh, stale-but-usable
    /// and too-stale instead of collapsing them into a boolean.
    pub fn get_with_max_stale(&self, max_stale: Duration) -> StaleRead {
        let guard = self.entry.read();
        let Some(entry) = guard.as_ref() else {
            return StaleRead::TooStale;
        };

        let now = Instant::now();
        if !entry.is_expired(now) {
            return StaleRead::Fresh(entry.data.clone());
        }

        let age = now.duration_since(entry.fetched_at);
        if age <= max_stale {
            StaleRead::Stale {
                data: entry.data.clone(),
                age,
            }
        } else {
            StaleRead::TooStale
        }
    }

    /// Wholesale-replaces the entry. Only the component performing a fetch
    /// may call this.
    pub fn set(&self, data: SnapshotData, ttl: Duration) {
        let now = Instant::now();
        let entry = CacheEntry {
            version: data.version,
            data: Arc::new(data),
            fetched_at: now,
            fetched_at_wall: SystemTime::now(),
            expires_at: now + ttl,
        };
        *self.entry.write() = Some(entry);
    }

    pub fn clear(&self) {
        *self.entry.write() = None;
    }

    /// Time since the entry was fetched, regardless of expiry.
    pub fn age(&self) -> Option<Duration> {
        self.entry
            .read()
            .as_ref()
            .map(|e| e.fetched_at.elapsed())
    }

    pub fn stats(&self) -> CacheStats {
        let guard = self.entry.read();
        match guard.as_ref() {
            None => CacheStats {
                has_data: false,
                version: None,
                fetched_at_epoch_secs: None,
                expires_at_epoch_secs: None,
                is_expired: false,
            },
            Some(entry) => {
                let now = Instant::now();
                let fetched_epoch = entry
                    .fetched_at_wall
                    .duration_since(UNIX_EPOCH)
                    .map(|d| d.as_secs())
                    .ok();
                let ttl = entry.expires_at.duration_since(entry.fetched_at);
                CacheStats {
                    has_data: true,
                    version: Some(entry.version),
                    fetched_at_epoch_secs: fetched_epoch,
                    expires_at_epoch_secs: fetched_epoch.map(|s| s + ttl.as_secs()),
                    is_expired: entry.is_expired(now),
                }
            }
        }
    }
}

impl Default for SnapshotCache {
    fn default() -> Self {
        SnapshotCache::new()
    }
}
