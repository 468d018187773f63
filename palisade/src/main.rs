use clap::Parser;
use gateway::AppState;
use gateway::enforcement::PolicyEnforcer;
use snapshot::{FallbackManager, SnapshotService};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

mod config;
mod telemetry;

#[derive(Parser)]
#[command(about = "API gateway with snapshot-backed policy enforcement")]
struct Cli {
    /// Path to the YAML config file.
    #[arg(short, long)]
    config: PathBuf,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match config::Config::from_file(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("invalid config {}: {e}", cli.config.display());
            std::process::exit(2);
        }
    };
    let _telemetry = telemetry::init(&config.common);

    let snapshots = match SnapshotService::new(config.snapshot) {
        Ok(service) => Arc::new(service),
        Err(e) => {
            error!("could not construct snapshot service: {e}");
            std::process::exit(2);
        }
    };

    // No valid snapshot means no basis for policy decisions, so startup
    // is fail-closed: bootstrap must succeed before we accept traffic.
    if let Err(e) = snapshots.initialize().await {
        error!("snapshot bootstrap failed, refusing to start: {e}");
        std::process::exit(1);
    }

    snapshots.on_status_change(|from, to| {
        warn!(from = from.as_str(), to = to.as_str(), "snapshot health changed");
    });

    let fallback = Arc::new(FallbackManager::with_db_concurrency(
        config.gateway.fallback.strategy,
        config.gateway.fallback.max_db_concurrency,
    ));
    let enforcer = Arc::new(PolicyEnforcer::new(
        snapshots.clone(),
        fallback,
        Duration::from_secs(config.gateway.fallback.max_stale_age_secs),
    ));

    let state = AppState {
        snapshots: snapshots.clone(),
        enforcer,
    };

    info!(
        host = %config.gateway.listener.host,
        port = config.gateway.listener.port,
        "starting gateway"
    );
    tokio::select! {
        result = gateway::serve(&config.gateway.listener, state) => {
            if let Err(e) = result {
                error!("server error: {e}");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
        }
    }

    snapshots.stop();
}
