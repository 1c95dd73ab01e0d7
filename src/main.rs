// src/main.rs
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::signal;
use tower::Layer;
use tracing::{info, warn};

use service_monitoring::{
    auth::AuthGate,
    config,
    metrics::RequestMetricsLayer,
    server::{MonitoringService, ServerBuilder},
};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("service_monitoring=debug".parse()?)
                .add_directive("hyper=info".parse()?),
        )
        .init();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.yaml".to_string());

    info!("Loading configuration from: {}", config_path);
    let config = config::load_config(&config_path).await?;

    let registry = Arc::new(config.metrics_registry()?);
    info!(backend = %registry.collector().backend(), "Metrics registry initialised");

    let aggregator = Arc::new(config.readiness_aggregator()?);
    info!(dependencies = aggregator.len(), "Readiness aggregator initialised");

    let credentials = config.credentials()?;
    if !credentials.is_enabled() {
        warn!("No username configured, readiness and metrics endpoints are unauthenticated");
    }

    let service = MonitoringService::new(AuthGate::new(credentials), aggregator, registry.clone())
        .with_paths(config.endpoint_paths());
    let handler = RequestMetricsLayer::new(registry.collector()).layer(service);

    ServerBuilder::new(config.listen)
        .with_handler(handler)
        .serve_with_shutdown(shutdown_signal())
        .await
        .context("Monitoring server failed")?;

    info!("Monitoring server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(%e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(%e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
