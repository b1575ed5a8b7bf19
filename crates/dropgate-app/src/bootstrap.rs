use std::future::Future;
use std::sync::Arc;

use dropgate_config::ServiceConfig;
use dropgate_delivery::DeliveryClient;
use dropgate_pipeline::PollCycle;
use dropgate_sftp::{Connector, SessionOptions, SessionPool, Ssh2Connector};
use dropgate_telemetry::{LogFormat, LoggingConfig, Metrics, MetricsSnapshot};
use tracing::info;

use crate::error::{AppError, AppResult};
use crate::orchestrator::TenantScheduler;

/// Environment variable selecting `json` or `pretty` log output.
pub const LOG_FORMAT_ENV: &str = "DROPGATE_LOG_FORMAT";

/// Entry point for the drop-folder service boot sequence.
///
/// Loads configuration from the environment, installs logging, and polls every
/// tenant until Ctrl-C.
///
/// # Errors
///
/// Returns an error if configuration, logging, or delivery setup fails, or if
/// the shutdown signal cannot be observed.
pub async fn run_app() -> AppResult<()> {
    let config =
        ServiceConfig::from_env().map_err(|err| AppError::config("service_config.from_env", err))?;

    let format = LogFormat::from_name(std::env::var(LOG_FORMAT_ENV).ok().as_deref());
    let logging = LoggingConfig {
        format,
        ..LoggingConfig::default()
    };
    dropgate_telemetry::init_logging(&logging)
        .map_err(|err| AppError::telemetry("telemetry.init", err))?;

    let mut signal = None;
    run_app_with(config, Arc::new(Ssh2Connector), async {
        signal = Some(tokio::signal::ctrl_c().await);
    })
    .await?;

    match signal {
        Some(Err(source)) => Err(AppError::Io {
            operation: "signal.ctrl_c",
            source,
        }),
        _ => Ok(()),
    }
}

/// Boot sequence over injected configuration and connector; runs until `shutdown` resolves.
///
/// Returns the final metrics snapshot.
///
/// # Errors
///
/// Returns an error if the metrics registry or the delivery client cannot be built.
pub async fn run_app_with<S>(
    config: ServiceConfig,
    connector: Arc<dyn Connector>,
    shutdown: S,
) -> AppResult<MetricsSnapshot>
where
    S: Future<Output = ()>,
{
    let metrics = Metrics::new().map_err(|err| AppError::telemetry("telemetry.metrics", err))?;
    let delivery = DeliveryClient::new(&config.pipeline, metrics.clone())
        .map_err(|err| AppError::delivery("delivery_client.new", err))?;

    let pool = Arc::new(SessionPool::new(
        connector,
        SessionOptions {
            keepalive_interval: config.keepalive_interval,
            ..SessionOptions::default()
        },
        metrics.clone(),
    ));
    let cycle = Arc::new(PollCycle::new(
        Arc::clone(&pool),
        Arc::new(delivery),
        config.pipeline,
        metrics.clone(),
    ));

    info!(
        tenants = config.tenants.len(),
        build_sha = dropgate_telemetry::build_sha(),
        "dropgate starting"
    );
    let scheduler = TenantScheduler::start(cycle, pool, config.tenants, config.poll_interval);

    shutdown.await;
    info!("shutdown requested; waiting for in-flight cycles");
    let cycles = scheduler.shutdown().await;

    let snapshot = metrics.snapshot();
    info!(cycles, metrics = ?snapshot, "dropgate stopped");
    Ok(snapshot)
}
