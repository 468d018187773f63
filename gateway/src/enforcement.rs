use crate::context::RequestContext;
use crate::errors::ApiError;
use snapshot::{
    FallbackManager, ProjectConfig, ProjectStatus, RateLimitConfig, SnapshotError,
    SnapshotService, StaleRead,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// The enforcement boundary consumed by request handling: project-status
/// validation, service enablement and rate-limit lookup, all reading the
/// snapshot cache and failing closed through the fallback policy.
pub struct PolicyEnforcer {
    snapshots: Arc<SnapshotService>,
    fallback: Arc<FallbackManager>,
    max_stale_age: Duration,
}

impl PolicyEnforcer {
    pub fn new(
        snapshots: Arc<SnapshotService>,
        fallback: Arc<FallbackManager>,
        max_stale_age: Duration,
    ) -> Self {
        PolicyEnforcer {
            snapshots,
            fallback,
            max_stale_age,
        }
    }

    /// Admits the request only for an ACTIVE project. A missing project
    /// and an unreadable snapshot are distinct outcomes: the former is a
    /// 404-class denial, the latter is the fail-closed 503 unless the
    /// fallback strategy admits the request on stale data.
    pub fn check_project(&self, ctx: &RequestContext) -> Result<ProjectConfig, ApiError> {
        match self.snapshots.get_project(&ctx.project_id) {
            Ok(Some(project)) => admit(project),
            Ok(None) => Err(ApiError::ProjectNotFound),
            Err(SnapshotError::Unavailable) => self.degraded_lookup(ctx),
            Err(_) => Err(ApiError::SnapshotUnavailable),
        }
    }

    fn degraded_lookup(&self, ctx: &RequestContext) -> Result<ProjectConfig, ApiError> {
        let decision = self
            .fallback
            .evaluate(false, self.snapshots.snapshot_age());
        if !decision.allow {
            return Err(ApiError::SnapshotUnavailable);
        }
        if let Some(warning) = &decision.warning {
            warn!(
                project_id = %ctx.project_id,
                strategy = ?decision.strategy,
                warning,
                "admitting request in degraded mode"
            );
        }

        match self.snapshots.get_snapshot_with_max_stale(self.max_stale_age) {
            StaleRead::Fresh(data) | StaleRead::Stale { data, .. } => {
                match data.projects.get(&ctx.project_id) {
                    Some(project) => admit(project.clone()),
                    None => Err(ApiError::ProjectNotFound),
                }
            }
            StaleRead::TooStale => Err(ApiError::SnapshotUnavailable),
        }
    }

    pub fn require_service_enabled(&self, ctx: &RequestContext) -> Result<(), ApiError> {
        let service = ctx.service.as_deref().ok_or(ApiError::ServiceDisabled)?;
        if self.snapshots.is_service_enabled(&ctx.project_id, service) {
            Ok(())
        } else {
            Err(ApiError::ServiceDisabled)
        }
    }

    /// Rate-limit configuration for the project; enforcement itself is the
    /// caller's concern. Falls back to the project's own numeric limit when
    /// the rate-limits map has no entry.
    pub fn rate_limit_for(
        &self,
        ctx: &RequestContext,
    ) -> Result<Option<RateLimitConfig>, ApiError> {
        if let Some(limit) = self.snapshots.get_rate_limit(&ctx.project_id)? {
            return Ok(Some(limit));
        }
        let fallback = self
            .snapshots
            .get_project(&ctx.project_id)?
            .and_then(|p| p.rate_limit)
            .map(|requests_per_minute| RateLimitConfig {
                requests_per_minute,
                burst: None,
            });
        Ok(fallback)
    }
}

fn admit(project: ProjectConfig) -> Result<ProjectConfig, ApiError> {
    match project.status {
        ProjectStatus::Active => Ok(project),
        ProjectStatus::Suspended => Err(ApiError::ProjectSuspended),
        ProjectStatus::Archived => Err(ApiError::ProjectArchived),
        ProjectStatus::Deleted => Err(ApiError::ProjectDeleted),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use snapshot::{FallbackStrategy, SnapshotConfig};
    use serde_json::json;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn body(ttl_marker: u64) -> serde_json::Value {
        json!({
            "success": true,
            "data": {
                "version": ttl_marker,
                "projects": {
                    "proj-active": {
                        "id": "proj-active",
                        "name": "Active",
                        "status": "ACTIVE",
                        "tenantId": "tenant-1",
                        "enabledServices": ["svc-y"]
                    },
                    "proj-suspended": {
                        "id": "proj-suspended",
                        "name": "Suspended",
                        "status": "SUSPENDED",
                        "tenantId": "tenant-1",
                        "rateLimit": 60
                    },
                    "proj-archived": {
                        "id": "proj-archived",
                        "name": "Archived",
                        "status": "ARCHIVED",
                        "tenantId": "tenant-2"
                    },
                    "proj-deleted": {
                        "id": "proj-deleted",
                        "name": "Deleted",
                        "status": "DELETED",
                        "tenantId": "tenant-2"
                    }
                },
                "services": {},
                "rateLimits": {
                    "proj-active": {"requestsPerMinute": 300}
                }
            }
        })
    }

    async fn service_for(server: &MockServer) -> Arc<SnapshotService> {
        let mut config = SnapshotConfig::new(server.uri());
        config.bootstrap_retries = 1;
        let service = Arc::new(SnapshotService::new(config).unwrap());
        service.initialize().await.unwrap();
        service.stop();
        service
    }

    fn enforcer(service: Arc<SnapshotService>, strategy: FallbackStrategy) -> PolicyEnforcer {
        PolicyEnforcer::new(
            service,
            Arc::new(FallbackManager::new(strategy)),
            Duration::from_secs(60),
        )
    }

    #[tokio::test]
    async fn active_project_is_admitted() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body(1)))
            .mount(&server)
            .await;

        let e = enforcer(service_for(&server).await, FallbackStrategy::FailClosed);
        let ctx = RequestContext::new("proj-active");
        let project = e.check_project(&ctx).unwrap();
        assert_eq!(project.tenant_id, "tenant-1");
        assert_eq!(
            e.rate_limit_for(&ctx).unwrap().unwrap().requests_per_minute,
            300
        );
    }

    #[tokio::test]
    async fn rate_limit_falls_back_to_project_level_limit() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body(1)))
            .mount(&server)
            .await;

        let e = enforcer(service_for(&server).await, FallbackStrategy::FailClosed);

        // No rate-limits entry, but the project carries its own limit.
        let limit = e
            .rate_limit_for(&RequestContext::new("proj-suspended"))
            .unwrap()
            .unwrap();
        assert_eq!(limit.requests_per_minute, 60);
        assert_eq!(limit.burst, None);

        // Neither source configured.
        assert!(
            e.rate_limit_for(&RequestContext::new("proj-archived"))
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn each_inactive_status_maps_to_its_own_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body(1)))
            .mount(&server)
            .await;

        let e = enforcer(service_for(&server).await, FallbackStrategy::FailClosed);
        assert_eq!(
            e.check_project(&RequestContext::new("proj-suspended")),
            Err(ApiError::ProjectSuspended)
        );
        assert_eq!(
            e.check_project(&RequestContext::new("proj-archived")),
            Err(ApiError::ProjectArchived)
        );
        assert_eq!(
            e.check_project(&RequestContext::new("proj-deleted")),
            Err(ApiError::ProjectDeleted)
        );
        assert_eq!(
            e.check_project(&RequestContext::new("no-such-project")),
            Err(ApiError::ProjectNotFound)
        );
    }

    #[tokio::test]
    async fn service_enablement_is_fail_closed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body(1)))
            .mount(&server)
            .await;

        let e = enforcer(service_for(&server).await, FallbackStrategy::FailClosed);
        assert!(
            e.require_service_enabled(
                &RequestContext::new("proj-active").with_service("svc-y")
            )
            .is_ok()
        );
        assert_eq!(
            e.require_service_enabled(
                &RequestContext::new("proj-active").with_service("svc-x")
            ),
            Err(ApiError::ServiceDisabled)
        );
        // No service in the context means nothing can be granted.
        assert_eq!(
            e.require_service_enabled(&RequestContext::new("proj-active")),
            Err(ApiError::ServiceDisabled)
        );
    }

    #[tokio::test]
    async fn cold_service_fails_closed_under_fail_closed_strategy() {
        // Bootstrap never happened; the cache is empty.
        let config = SnapshotConfig::new("http://127.0.0.1:9/snapshot");
        let service = Arc::new(SnapshotService::new(config).unwrap());
        let e = enforcer(service, FallbackStrategy::FailClosed);

        assert_eq!(
            e.check_project(&RequestContext::new("proj-active")),
            Err(ApiError::SnapshotUnavailable)
        );
    }

    #[tokio::test]
    async fn use_cached_strategy_serves_stale_data() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body(1)))
            .mount(&server)
            .await;

        // Smallest legal TTL/interval pair so the entry expires quickly
        // while staying within the 60s max stale age.
        let mut config = SnapshotConfig::new(server.uri());
        config.bootstrap_retries = 1;
        config.cache_ttl_secs = 2;
        config.refresh_interval_secs = 1;
        let service = Arc::new(SnapshotService::new(config).unwrap());
        service.initialize().await.unwrap();
        service.stop();

        tokio::time::sleep(Duration::from_millis(2100)).await;
        assert!(matches!(
            service.get_snapshot(),
            Err(SnapshotError::Unavailable)
        ));

        let e = enforcer(service.clone(), FallbackStrategy::UseCached);
        let project = e.check_project(&RequestContext::new("proj-active")).unwrap();
        assert_eq!(project.id, "proj-active");

        // The status family still applies on stale data.
        assert_eq!(
            e.check_project(&RequestContext::new("proj-suspended")),
            Err(ApiError::ProjectSuspended)
        );
    }
}
