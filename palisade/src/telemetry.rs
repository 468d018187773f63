use crate::config::CommonConfig;
use metrics_exporter_statsd::StatsdBuilder;
use tracing::warn;
use tracing_subscriber::EnvFilter;

/// Keeps the sentry client alive for the lifetime of the process.
pub struct TelemetryGuard {
    _sentry: Option<sentry::ClientInitGuard>,
}

/// Installs tracing, the statsd metrics recorder and sentry, in that
/// order. Metrics and sentry are optional; missing config means the
/// process runs with logging only.
pub fn init(config: &CommonConfig) -> TelemetryGuard {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Some(metrics_config) = &config.metrics {
        match StatsdBuilder::from(&metrics_config.statsd_host, metrics_config.statsd_port)
            .build(Some("palisade"))
        {
            Ok(recorder) => {
                if let Err(e) = metrics::set_global_recorder(recorder) {
                    warn!("could not install metrics recorder: {e}");
                }
            }
            Err(e) => warn!("could not build statsd recorder: {e}"),
        }
    }

    let sentry_guard = config
        .logging
        .as_ref()
        .and_then(|logging| logging.sentry_dsn.as_deref())
        .map(|dsn| {
            sentry::init((
                dsn,
                sentry::ClientOptions {
                    release: sentry::release_name!(),
                    ..Default::default()
                },
            ))
        });

    TelemetryGuard {
        _sentry: sentry_guard,
    }
}
