use crate::AppState;
use crate::context::RequestContext;
use crate::errors::ApiError;
use axum::Json;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::http::header::CONTENT_TYPE;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use snapshot::HealthReport;

/// Cheap health check over cache stats.
pub async fn health(State(state): State<AppState>) -> Response {
    let stats = state.snapshots.cache_stats();
    let status = if stats.has_data && !stats.is_expired {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(stats)).into_response()
}

pub async fn ready(State(state): State<AppState>) -> Response {
    let stats = state.snapshots.cache_stats();
    if stats.has_data && !stats.is_expired {
        (StatusCode::OK, "ok\n").into_response()
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not ready\n").into_response()
    }
}

pub async fn health_report(State(state): State<AppState>) -> Json<HealthReport> {
    Json(state.snapshots.health_report())
}

/// Flat key/value pairs, one per line, for text-based scraping.
pub async fn metrics(State(state): State<AppState>) -> Response {
    let mut body = String::new();
    for (key, value) in state.snapshots.metrics() {
        body.push_str(&key);
        body.push(' ');
        body.push_str(&value);
        body.push('\n');
    }
    (
        StatusCode::OK,
        [(CONTENT_TYPE, "text/plain; charset=utf-8")],
        body,
    )
        .into_response()
}

#[derive(Deserialize, Debug)]
pub struct PolicyCheckParams {
    pub project_id: String,
    pub service: Option<String>,
}

#[derive(Serialize, Debug)]
pub struct PolicyCheckResponse {
    pub allow: bool,
    pub project_id: String,
    pub tenant_id: String,
}

/// Debug surface for the enforcement contract: runs the same project and
/// service checks request handling performs.
pub async fn policy_check(
    State(state): State<AppState>,
    Query(params): Query<PolicyCheckParams>,
) -> Result<Json<PolicyCheckResponse>, ApiError> {
    let mut ctx = RequestContext::new(&params.project_id);
    if let Some(service) = params.service {
        ctx = ctx.with_service(service);
    }

    let project = state.enforcer.check_project(&ctx)?;
    if ctx.service.is_some() {
        state.enforcer.require_service_enabled(&ctx)?;
    }

    Ok(Json(PolicyCheckResponse {
        allow: true,
        project_id: project.id,
        tenant_id: project.tenant_id,
    }))
}
