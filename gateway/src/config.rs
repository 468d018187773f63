use serde::Deserialize;
use snapshot::FallbackStrategy;
use snapshot::fallback::DEFAULT_DB_FALLBACK_CONCURRENCY;

#[derive(thiserror::Error, Debug)]
pub enum ValidationError {
    #[error("Port cannot be 0")]
    InvalidPort,

    #[error("Database fallback concurrency cannot be 0")]
    InvalidDbConcurrency,
}

/// Network listener configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Listener {
    pub host: String,
    pub port: u16,
}

impl Default for Listener {
    fn default() -> Self {
        Listener {
            host: "127.0.0.1".into(),
            port: 3000,
        }
    }
}

impl Listener {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.port == 0 {
            return Err(ValidationError::InvalidPort);
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct FallbackConfig {
    #[serde(default = "default_strategy")]
    pub strategy: FallbackStrategy,
    #[serde(default = "default_db_concurrency")]
    pub max_db_concurrency: usize,
    /// How far past the TTL stale data may still be served under a
    /// graceful-degradation strategy.
    #[serde(default = "default_max_stale_age_secs")]
    pub max_stale_age_secs: u64,
}

fn default_strategy() -> FallbackStrategy {
    FallbackStrategy::FailClosed
}

fn default_db_concurrency() -> usize {
    DEFAULT_DB_FALLBACK_CONCURRENCY
}

fn default_max_stale_age_secs() -> u64 {
    60
}

impl Default for FallbackConfig {
    fn default() -> Self {
        FallbackConfig {
            strategy: default_strategy(),
            max_db_concurrency: default_db_concurrency(),
            max_stale_age_secs: default_max_stale_age_secs(),
        }
    }
}

/// Gateway configuration
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub listener: Listener,
    #[serde(default)]
    pub fallback: FallbackConfig,
}

impl Config {
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.listener.validate()?;
        if self.fallback.strategy == FallbackStrategy::FallbackDatabase
            && self.fallback.max_db_concurrency == 0
        {
            return Err(ValidationError::InvalidDbConcurrency);
        }
        Ok(())
    }
}
