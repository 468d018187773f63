use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use snapshot::SnapshotError;

/// Public-facing errors. Clients see a machine-readable code and a generic
/// message; internal causes, upstream error text and control-plane
/// topology never leave the process.
#[derive(thiserror::Error, Clone, Debug, PartialEq, Eq)]
pub enum ApiError {
    #[error("configuration snapshot unavailable")]
    SnapshotUnavailable,

    #[error("project not found")]
    ProjectNotFound,

    #[error("project suspended")]
    ProjectSuspended,

    #[error("project archived")]
    ProjectArchived,

    #[error("project deleted")]
    ProjectDeleted,

    #[error("service disabled for project")]
    ServiceDisabled,
}

impl ApiError {
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::SnapshotUnavailable => "snapshot_unavailable",
            ApiError::ProjectNotFound => "project_not_found",
            ApiError::ProjectSuspended => "project_suspended",
            ApiError::ProjectArchived => "project_archived",
            ApiError::ProjectDeleted => "project_deleted",
            ApiError::ServiceDisabled => "service_disabled",
        }
    }

    /// Deliberately uniform across the project-status family so responses
    /// cannot be used to probe which project IDs exist.
    pub fn public_message(&self) -> &'static str {
        match self {
            ApiError::SnapshotUnavailable => "Service temporarily unavailable. Please retry.",
            ApiError::ProjectNotFound
            | ApiError::ProjectSuspended
            | ApiError::ProjectArchived
            | ApiError::ProjectDeleted => "Project is not available.",
            ApiError::ServiceDisabled => "This service is not available for the project.",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::SnapshotUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::ProjectNotFound => StatusCode::NOT_FOUND,
            ApiError::ProjectSuspended
            | ApiError::ProjectArchived
            | ApiError::ProjectDeleted
            | ApiError::ServiceDisabled => StatusCode::FORBIDDEN,
        }
    }

    pub fn retryable(&self) -> bool {
        matches!(self, ApiError::SnapshotUnavailable)
    }
}

impl From<SnapshotError> for ApiError {
    // Any core failure maps to the fail-closed 503, never to "allow".
    fn from(_: SnapshotError) -> Self {
        ApiError::SnapshotUnavailable
    }
}

#[derive(Serialize)]
struct ErrorBody {
    code: &'static str,
    message: &'static str,
    retryable: bool,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            code: self.code(),
            message: self.public_message(),
            retryable: self.retryable(),
        };
        (self.status(), Json(body)).into_response()
    }
}
