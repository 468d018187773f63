use crate::fetcher::{FetchError, SnapshotFetcher};
use crate::types::SnapshotData;
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

/// Retrying wrapper around the fetcher, used only for the initial load.
/// Retries transport errors and retryable statuses with linear backoff
/// (attempt number times the base delay); gives up immediately on
/// non-retryable failures such as 4xx or malformed payloads.
pub struct BootstrapClient {
    max_attempts: u32,
    base_delay: Duration,
}

impl BootstrapClient {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        BootstrapClient {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    pub async fn fetch(&self, fetcher: &SnapshotFetcher) -> Result<SnapshotData, FetchError> {
        let mut attempt = 1u32;

        loop {
            match fetcher.fetch().await {
                Ok(data) => return Ok(data),
                Err(err) if err.is_retryable() && attempt < self.max_attempts => {
                    let backoff = self.base_delay * attempt;
                    warn!(%err, attempt, backoff_ms = backoff.as_millis() as u64, "bootstrap fetch failed, retrying");
                    sleep(backoff).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
