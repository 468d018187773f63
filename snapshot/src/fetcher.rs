use crate::types::{ShapeError, SnapshotData};
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde::Deserialize;
use std::time::Duration;

const USER_AGENT: &str = concat!("palisade/", env!("CARGO_PKG_VERSION"));

#[derive(Deserialize)]
struct SnapshotEnvelope {
    success: bool,
    #[serde(default)]
    data: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(thiserror::Error, Debug)]
pub enum FetchError {
    #[error("could not reach control plane: {0}")]
    Transport(String),

    #[error("control plane returned status {0}")]
    Status(StatusCode),

    #[error("malformed snapshot: {0}")]
    Malformed(String),
}

impl FetchError {
    /// Transport failures and 5xx/429 are worth retrying during bootstrap;
    /// other 4xx and malformed payloads are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Transport(_) => true,
            FetchError::Status(status) => {
                status.is_server_error() || *status == StatusCode::TOO_MANY_REQUESTS
            }
            FetchError::Malformed(_) => false,
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        FetchError::Transport(err.to_string())
    }
}

impl From<ShapeError> for FetchError {
    fn from(err: ShapeError) -> Self {
        FetchError::Malformed(err.to_string())
    }
}

/// One HTTP round trip to the control plane snapshot endpoint. Never
/// retries; retry and backoff are the caller's responsibility.
pub struct SnapshotFetcher {
    client: reqwest::Client,
    url: String,
}

impl SnapshotFetcher {
    pub fn new(url: String, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;

        Ok(SnapshotFetcher { client, url })
    }

    pub async fn fetch(&self) -> Result<SnapshotData, FetchError> {
        let response = self
            .client
            .get(&self.url)
            .header(ACCEPT, "application/json")
            .header(CONTENT_TYPE, "application/json")
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(FetchError::Status(status));
        }

        let body = response.bytes().await?;
        if body.is_empty() {
            return Err(FetchError::Malformed("empty response body".into()));
        }

        let envelope: SnapshotEnvelope = serde_json::from_slice(&body)
            .map_err(|e| FetchError::Malformed(format!("invalid envelope: {e}")))?;

        if !envelope.success {
            return Err(FetchError::Malformed(format!(
                "control plane reported failure: {}",
                envelope.error.as_deref().unwrap_or("no error given")
            )));
        }

        let data = envelope
            .data
            .ok_or_else(|| FetchError::Malformed("missing `data` field".into()))?;

        Ok(SnapshotData::from_value(data)?)
    }
}
