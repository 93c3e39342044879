//! gcs-exporter - Google Cloud Storage bucket metrics for Prometheus
//!
//! Lists every configured bucket on its own interval and serves the
//! aggregates on `/metrics`.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use gcs_exporter::logging;
use gcs_exporter::server::{bind_metrics_listener, start_metrics_server};
use gcs_exporter::{Args, Settings};
use gcs_exporter_collector::names::DESCRIPTORS;
use gcs_exporter_collector::{BucketCollector, Scheduler};
use gcs_exporter_common::{BucketName, Config};
use gcs_exporter_metrics::MetricsRegistry;
use gcs_exporter_storage::{GcsLister, GcsOptions};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Configuration errors are fatal before anything is started
    let config = Config::load(&args.config)?;
    let settings = Settings::resolve(&args, config)?;

    logging::init(&settings.log_level, settings.log_format);

    info!("Starting gcs-exporter");
    info!("Config file: {}", args.config.display());
    info!(
        "Scan timeout: {:?}, listing strategy: {}",
        settings.scan.timeout, settings.scan.strategy
    );

    // A bind failure is fatal
    let listener = bind_metrics_listener(settings.metrics_listen).await?;

    let buckets: Vec<BucketName> = settings.targets.iter().map(|t| t.bucket.clone()).collect();
    let lister = GcsLister::connect(
        &buckets,
        &GcsOptions {
            credentials: settings.credentials.clone(),
            endpoint: settings.endpoint.clone(),
        },
    )
    .context("Failed to create storage client")?;

    let registry = Arc::new(MetricsRegistry::with_descriptors(&DESCRIPTORS));
    let token = CancellationToken::new();

    let server_token = token.clone();
    let server_registry = Arc::clone(&registry);
    let server = tokio::spawn(async move {
        let result = start_metrics_server(listener, server_registry, server_token.clone()).await;
        if let Err(e) = &result {
            error!("Metrics server error: {e}");
            server_token.cancel();
        }
        result
    });

    let collector = Arc::new(BucketCollector::new(
        Arc::new(lister),
        registry,
        settings.scan,
    ));
    let mut scheduler = Scheduler::new(collector, token.clone());
    for target in settings.targets {
        scheduler.spawn(target);
    }
    info!("Collecting {} buckets", scheduler.len());

    let signal_token = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutting down...");
        }
        signal_token.cancel();
    });

    let cycles = scheduler.wait().await;
    token.cancel();
    server.await.context("Metrics server task failed")??;

    info!("gcs-exporter stopped after {cycles} cycles");
    Ok(())
}
