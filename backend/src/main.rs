//! Series worker entry-point: consumes newline-delimited job payloads from
//! stdin and runs each through the ingestion handler.
#![cfg_attr(not(any(test, doctest)), deny(clippy::unwrap_used))]
#![cfg_attr(not(any(test, doctest)), deny(clippy::expect_used))]

use std::sync::Arc;

use color_eyre::eyre::{Context, Result, eyre};
use mockable::DefaultClock;
use ortho_config::OrthoConfig;
use tokio::io::BufReader;
use tokio::runtime::Builder;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt};

use price_series::config::IngestSettings;
use price_series::domain::ports::IngestionJobMetrics;
use price_series::domain::{SeriesIngestionHandler, SeriesIngestionPorts};
use price_series::inbound::queue::JobDispatcher;
use price_series::outbound::persistence::{
    DbPool, DieselSeriesStore, PoolConfig, run_pending_migrations,
};
use price_series::outbound::price_source::HttpPriceSource;

fn main() -> Result<()> {
    color_eyre::install()?;
    if let Err(e) = fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .try_init()
    {
        warn!(error = %e, "tracing init failed");
    }

    let settings = IngestSettings::load().map_err(|error| eyre!("load settings: {error}"))?;
    let runtime = Builder::new_multi_thread()
        .enable_all()
        .build()
        .wrap_err("failed to build worker runtime")?;
    runtime.block_on(run(settings))
}

async fn run(settings: IngestSettings) -> Result<()> {
    let database_url = settings.database_url()?.to_owned();
    if settings.run_migrations() {
        let applied = run_pending_migrations(&database_url)
            .await
            .wrap_err("failed to apply migrations")?;
        info!(applied, "migrations applied");
    }

    let pool = DbPool::new(
        PoolConfig::new(database_url).with_max_size(pool_size(settings.max_concurrent_jobs())),
    )
    .await
    .wrap_err("failed to create database pool")?;
    let source = HttpPriceSource::new(settings.price_source_url()?, settings.request_timeout())
        .wrap_err("failed to build price source client")?;
    let metrics = build_metrics()?;

    let handler = SeriesIngestionHandler::new(
        SeriesIngestionPorts::new(
            Arc::new(source),
            Arc::new(DieselSeriesStore::new(pool)),
            metrics,
        ),
        Arc::new(DefaultClock),
        settings.commit_config(),
    );
    let dispatcher = JobDispatcher::new(Arc::new(handler));

    info!(
        max_concurrent_jobs = settings.max_concurrent_jobs(),
        "series worker consuming stdin"
    );
    let summary = dispatcher
        .dispatch_lines(
            BufReader::new(tokio::io::stdin()),
            settings.max_concurrent_jobs(),
        )
        .await
        .wrap_err("failed to read job stream")?;
    info!(
        completed = summary.completed,
        retryable = summary.retryable,
        dead_lettered = summary.dead_lettered,
        "job stream drained"
    );
    Ok(())
}

/// One connection per in-flight job plus one for watermark reads.
fn pool_size(max_concurrent_jobs: usize) -> u32 {
    u32::try_from(max_concurrent_jobs)
        .unwrap_or(u32::MAX)
        .saturating_add(1)
}

#[cfg(feature = "metrics")]
fn build_metrics() -> Result<Arc<dyn IngestionJobMetrics>> {
    use price_series::outbound::metrics::PrometheusIngestionJobMetrics;

    let metrics = PrometheusIngestionJobMetrics::new(prometheus::default_registry())
        .wrap_err("failed to register ingestion metrics")?;
    Ok(Arc::new(metrics))
}

#[cfg(not(feature = "metrics"))]
fn build_metrics() -> Result<Arc<dyn IngestionJobMetrics>> {
    Ok(Arc::new(price_series::domain::ports::NoOpIngestionJobMetrics))
}
