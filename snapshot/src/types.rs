use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};

/// Project lifecycle status. Closed set; the control plane never sends
/// anything else, and deserialization rejects unknown values.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProjectStatus {
    Active,
    Suspended,
    Archived,
    Deleted,
}

impl ProjectStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, ProjectStatus::Active)
    }
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProjectConfig {
    pub id: String,
    pub name: String,
    pub status: ProjectStatus,
    pub tenant_id: String,
    #[serde(default)]
    pub allowed_origins: Vec<String>,
    #[serde(default)]
    pub rate_limit: Option<u32>,
    #[serde(default)]
    pub enabled_services: HashSet<String>,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServiceConfig {
    pub name: String,
    pub enabled: bool,
    #[serde(default)]
    pub endpoint: Option<String>,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitConfig {
    pub requests_per_minute: u32,
    #[serde(default)]
    pub burst: Option<u32>,
}

/// One point-in-time configuration bundle from the control plane.
/// Immutable once fetched; replaced wholesale on every refresh.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotData {
    pub version: u64,
    pub projects: HashMap<String, ProjectConfig>,
    pub services: HashMap<String, ServiceConfig>,
    pub rate_limits: HashMap<String, RateLimitConfig>,
}

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum ShapeError {
    #[error("missing field `{0}`")]
    MissingField(&'static str),
    #[error("`version` must be a non-negative integer")]
    InvalidVersion,
    #[error("`{0}` must be an object")]
    NotAnObject(&'static str),
    #[error("could not decode snapshot: {0}")]
    Decode(String),
}

impl SnapshotData {
    /// Structural validation of a raw control plane payload. The checks run
    /// in a fixed order independent of the rest of the payload, so a given
    /// malformation is always rejected with the same error.
    pub fn from_value(value: Value) -> Result<SnapshotData, ShapeError> {
        match value.get("version") {
            None => return Err(ShapeError::MissingField("version")),
            Some(v) if v.as_u64().is_none() => return Err(ShapeError::InvalidVersion),
            Some(_) => {}
        }

        for field in ["projects", "services", "rateLimits"] {
            match value.get(field) {
                None => return Err(ShapeError::MissingField(field)),
                Some(v) if !v.is_object() => return Err(ShapeError::NotAnObject(field)),
                Some(_) => {}
            }
        }

        serde_json::from_value(value).map_err(|e| ShapeError::Decode(e.to_string()))
    }
}
