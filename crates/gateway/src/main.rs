//! RoboDigest API Gateway
//!
//! Thin HTTP edge over the ingestion core:
//! - Manual fetch triggers, cancellation and shared progress
//! - Paged listings of papers, news, jobs, channels and videos
//! - Observability (request tracing, Prometheus metrics)

mod handlers;
mod middleware;

use axum::{
    middleware::from_fn,
    routing::{delete, get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusBuilder;
use robodigest_common::{config::AppConfig, metrics, store, VERSION};
use robodigest_ingestion::{telemetry, Aggregator};
use std::net::SocketAddr;
use tokio::signal;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::{error, info};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub aggregator: Aggregator,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = AppConfig::load().map_err(|e| {
        eprintln!("Failed to load configuration: {e}");
        e
    })?;
    config.validate()?;

    telemetry::init_tracing(&config.observability);
    info!("Starting RoboDigest gateway v{}", VERSION);

    let metrics_addr = SocketAddr::from(([0, 0, 0, 0], config.observability.metrics_port));
    PrometheusBuilder::new().with_http_listener(metrics_addr).install()?;
    metrics::register_metrics();
    info!(addr = %metrics_addr, "Metrics exporter listening");

    info!("Connecting to store...");
    let store = store::connect(&config.database).await?;
    let aggregator = Aggregator::new(&config, store)?;
    aggregator.start(&config).await?;

    let app = create_router(AppState {
        aggregator: aggregator.clone(),
    });

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!("Listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("HTTP server stopped, draining fetch runs");
    aggregator.shutdown(config.shutdown_grace()).await;
    info!("Shutdown complete");
    Ok(())
}

/// Create the main application router
fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let request_id = SetRequestIdLayer::x_request_id(MakeRequestUuid);
    let propagate_id = PropagateRequestIdLayer::x_request_id();

    let api_routes = Router::new()
        .route("/health", get(handlers::health::health))
        .route("/ready", get(handlers::health::ready))
        // Fetch control
        .route(
            "/fetch/{kind}",
            post(handlers::fetch::trigger).delete(handlers::fetch::cancel),
        )
        .route("/progress", get(handlers::fetch::progress))
        // Listings
        .route("/papers", get(handlers::listings::papers))
        .route("/news", get(handlers::listings::news))
        .route("/jobs", get(handlers::listings::jobs))
        .route("/channels", get(handlers::listings::channels))
        .route("/videos", get(handlers::listings::videos))
        .route("/videos/{bvid}", delete(handlers::listings::hide_video))
        .route_layer(from_fn(middleware::metrics::track_requests));

    Router::new()
        .nest("/v1", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(request_id)
        .layer(propagate_id)
        .with_state(state)
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, starting shutdown..."),
        _ = terminate => info!("Received SIGTERM, starting shutdown..."),
    }
}
