//! RoboDigest headless ingestion
//!
//! Runs the cron schedule without the HTTP edge. With `--once <kind>`
//! it performs a single pass of that kind and exits.

use metrics_exporter_prometheus::PrometheusBuilder;
use robodigest_common::{config::AppConfig, metrics, store, SourceKind, VERSION};
use robodigest_ingestion::{telemetry, Aggregator};
use std::net::SocketAddr;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = AppConfig::load().map_err(|e| {
        eprintln!("Failed to load configuration: {e}");
        e
    })?;
    config.validate()?;

    telemetry::init_tracing(&config.observability);
    info!("Starting RoboDigest ingestion v{}", VERSION);

    let once = parse_once(std::env::args().skip(1))?;

    if once.is_none() && config.observability.metrics_port != 0 {
        let addr = SocketAddr::from(([0, 0, 0, 0], config.observability.metrics_port));
        PrometheusBuilder::new().with_http_listener(addr).install()?;
        info!(%addr, "Metrics exporter listening");
    }
    metrics::register_metrics();

    let store = store::connect(&config.database).await?;
    let aggregator = Aggregator::new(&config, store)?;

    if let Some(kind) = once {
        let response = aggregator.trigger_fetch(kind)?;
        if !response.accepted {
            warn!(%kind, "Pass rejected");
            return Ok(());
        }
        // Joins any chained enrichment too; it runs on the same task
        aggregator.scheduler().join(kind).await;
        let snapshot = aggregator.get_progress();
        match snapshot.kind_statuses.get(&kind) {
            Some(status) => info!(%kind, status = ?status.status, message = %status.message, "Pass finished"),
            None => warn!(%kind, "Pass finished without a status"),
        }
        aggregator.shutdown(config.shutdown_grace()).await;
        return Ok(());
    }

    aggregator.start(&config).await?;
    info!("Scheduler running, press Ctrl+C to stop");

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
    }
    info!("Shutting down");
    aggregator.shutdown(config.shutdown_grace()).await;
    info!("Ingestion stopped");
    Ok(())
}

fn parse_once(mut args: impl Iterator<Item = String>) -> anyhow::Result<Option<SourceKind>> {
    match args.next().as_deref() {
        None => Ok(None),
        Some("--once") => {
            let kind = args
                .next()
                .ok_or_else(|| anyhow::anyhow!("--once needs a kind"))?;
            Ok(Some(kind.parse()?))
        }
        Some(other) => anyhow::bail!("unknown argument '{other}'"),
    }
}
