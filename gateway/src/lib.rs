//! Downstream gateway surface: policy enforcement consumed by request
//! handling, the public error envelope, and the admin HTTP API.

pub mod admin;
pub mod config;
pub mod context;
pub mod enforcement;
pub mod errors;

use axum::Router;
use axum::routing::get;
use enforcement::PolicyEnforcer;
use snapshot::SnapshotService;
use std::sync::Arc;
use tokio::net::TcpListener;

#[derive(Clone)]
pub struct AppState {
    pub snapshots: Arc<SnapshotService>,
    pub enforcer: Arc<PolicyEnforcer>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(admin::health))
        .route("/ready", get(admin::ready))
        .route("/health/report", get(admin::health_report))
        .route("/metrics", get(admin::metrics))
        .route("/policy/check", get(admin::policy_check))
        .with_state(state)
}

pub async fn serve(
    listener: &config::Listener,
    state: AppState,
) -> Result<(), std::io::Error> {
    let app = router(state);
    let addr = format!("{}:{}", listener.host, listener.port);
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
