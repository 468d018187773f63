use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};
use tracing::debug;

pub const DEFAULT_DB_FALLBACK_CONCURRENCY: usize = 5;

/// What to do when the primary cache lookup reports stale or absent data.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum FallbackStrategy {
    /// Deny unconditionally. Safest default.
    FailClosed,
    /// Serve stale data with a warning; explicit graceful-degradation
    /// opt-in.
    UseCached,
    /// Allow a direct-database lookup while the concurrency budget lasts.
    FallbackDatabase,
    /// Allow with a warning; the caller is expected to pair this with a
    /// read-only or rate-limited mode.
    EmergencyMode,
}

#[derive(Debug)]
pub struct FallbackDecision {
    pub allow: bool,
    pub strategy: FallbackStrategy,
    pub warning: Option<String>,
    pub error: Option<String>,
    // Held for the lifetime of the decision so the budget is released when
    // the fallback query finishes.
    _db_permit: Option<OwnedSemaphorePermit>,
}

impl FallbackDecision {
    fn allow(strategy: FallbackStrategy, warning: Option<String>) -> Self {
        FallbackDecision {
            allow: true,
            strategy,
            warning,
            error: None,
            _db_permit: None,
        }
    }

    fn deny(strategy: FallbackStrategy, error: String) -> Self {
        FallbackDecision {
            allow: false,
            strategy,
            warning: None,
            error: Some(error),
            _db_permit: None,
        }
    }
}

/// Decides the final admit/deny outcome when the snapshot cache cannot
/// serve a lookup.
pub struct FallbackManager {
    strategy: FallbackStrategy,
    db_budget: Arc<Semaphore>,
}

impl FallbackManager {
    pub fn new(strategy: FallbackStrategy) -> Self {
        Self::with_db_concurrency(strategy, DEFAULT_DB_FALLBACK_CONCURRENCY)
    }

    pub fn with_db_concurrency(strategy: FallbackStrategy, max_concurrent: usize) -> Self {
        FallbackManager {
            strategy,
            db_budget: Arc::new(Semaphore::new(max_concurrent)),
        }
    }

    pub fn strategy(&self) -> FallbackStrategy {
        self.strategy
    }

    pub fn evaluate(
        &self,
        snapshot_available: bool,
        snapshot_age: Option<Duration>,
    ) -> FallbackDecision {
        if snapshot_available {
            return FallbackDecision::allow(self.strategy, None);
        }

        let age_note = match snapshot_age {
            Some(age) => format!("last snapshot is {}s old", age.as_secs()),
            None => "no snapshot has ever been loaded".to_string(),
        };

        match self.strategy {
            FallbackStrategy::FailClosed => FallbackDecision::deny(
                self.strategy,
                format!("configuration snapshot unavailable ({age_note})"),
            ),
            FallbackStrategy::UseCached => FallbackDecision::allow(
                self.strategy,
                Some(format!("serving stale configuration data ({age_note})")),
            ),
            FallbackStrategy::FallbackDatabase => {
                match self.db_budget.clone().try_acquire_owned() {
                    Ok(permit) => {
                        debug!(remaining = self.db_budget.available_permits(), "admitting database fallback query");
                        FallbackDecision {
                            allow: true,
                            strategy: self.strategy,
                            warning: Some(format!(
                                "resolving policy from the database ({age_note})"
                            )),
                            error: None,
                            _db_permit: Some(permit),
                        }
                    }
                    Err(TryAcquireError::NoPermits) | Err(TryAcquireError::Closed) => {
                        FallbackDecision::deny(
                            self.strategy,
                            "database fallback budget exhausted".to_string(),
                        )
                    }
                }
            }
            FallbackStrategy::EmergencyMode => FallbackDecision::allow(
                self.strategy,
                Some(format!(
                    "emergency mode: configuration snapshot unavailable ({age_note})"
                )),
            ),
        }
    }
}
