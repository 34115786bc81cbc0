//! Ingestion handler orchestrating one job invocation.
//!
//! A job moves through fetching, resolving, validating, and committing. Only
//! the commit step writes; every earlier exit leaves the store untouched.
//! Validation here is advisory: the commit engine re-resolves the watermark
//! inside its transaction and is authoritative.

use std::sync::Arc;

use mockable::Clock;
use thiserror::Error;
use tracing::{Instrument, info, info_span, warn};

use crate::domain::batch_validation::{BatchValidation, RejectionReason, validate_batch};
use crate::domain::ports::{
    IngestionJobMetrics, IngestionJobOutcome, IngestionJobStatus, PriceSource, PriceSourceError,
    PriceSourceRequest, SeriesStore, SeriesStoreError,
};
use crate::domain::series_commit::{
    CommitResult, SeriesCommitConfig, SeriesCommitEngine, SeriesCommitRuntime,
};
use crate::domain::watermark::WatermarkResolver;
use crate::domain::{FetchedBatch, IngestionJob, SeriesKey};

mod mapping;

/// Port bundle required by the ingestion handler.
pub struct SeriesIngestionPorts {
    /// Outbound price source adapter.
    pub source: Arc<dyn PriceSource>,
    /// Series store shared by the resolver and the commit engine.
    pub store: Arc<dyn SeriesStore>,
    /// Job outcome metrics adapter.
    pub metrics: Arc<dyn IngestionJobMetrics>,
}

impl SeriesIngestionPorts {
    /// Build a strongly-typed handler port bundle.
    pub fn new(
        source: Arc<dyn PriceSource>,
        store: Arc<dyn SeriesStore>,
        metrics: Arc<dyn IngestionJobMetrics>,
    ) -> Self {
        Self {
            source,
            store,
            metrics,
        }
    }
}

/// Terminal success states of one job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestionOutcome {
    /// The commit engine ran; counts may be zero when a concurrent job won.
    Written(CommitResult),
    /// The batch did not extend the series; nothing was written.
    Rejected(RejectionReason),
    /// The price source returned no points; nothing was written.
    Empty,
}

/// Job failures surfaced to the queue.
#[derive(Debug, Error)]
pub enum IngestionError {
    /// The price source call failed in a way a later attempt may clear.
    #[error("price fetch for {key} failed: {source}")]
    TransientFetchFailure {
        /// Series being ingested.
        key: SeriesKey,
        /// Underlying source failure.
        #[source]
        source: PriceSourceError,
    },
    /// The price source rejected the request or answered with an unreadable
    /// payload; redelivery repeats the same failure.
    #[error("price source rejected fetch for {key}: {source}")]
    RejectedFetch {
        /// Series being ingested.
        key: SeriesKey,
        /// Underlying source failure.
        #[source]
        source: PriceSourceError,
    },
    /// The store failed or conflicts outlasted the retry budget.
    #[error("series store unavailable for {key} after {attempts} attempts: {source}")]
    StoreUnavailable {
        /// Series being ingested.
        key: SeriesKey,
        /// Store attempts made.
        attempts: u32,
        /// Last store failure.
        #[source]
        source: SeriesStoreError,
    },
}

impl IngestionError {
    /// Whether redelivering the job may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::TransientFetchFailure { .. } | Self::StoreUnavailable { .. } => true,
            Self::RejectedFetch { .. } => false,
        }
    }
}

/// Domain-owned ingestion handler.
pub struct SeriesIngestionHandler {
    source: Arc<dyn PriceSource>,
    resolver: WatermarkResolver,
    engine: SeriesCommitEngine,
    metrics: Arc<dyn IngestionJobMetrics>,
}

impl SeriesIngestionHandler {
    /// Build a handler using default commit runtime helpers.
    /// ```rust,ignore
    /// let handler = SeriesIngestionHandler::new(ports, clock, SeriesCommitConfig::default());
    /// ```
    pub fn new(
        ports: SeriesIngestionPorts,
        clock: Arc<dyn Clock>,
        config: SeriesCommitConfig,
    ) -> Self {
        Self::with_runtime(ports, clock, SeriesCommitRuntime::default(), config)
    }

    /// Build a handler with injected commit runtime abstractions.
    pub fn with_runtime(
        ports: SeriesIngestionPorts,
        clock: Arc<dyn Clock>,
        runtime: SeriesCommitRuntime,
        config: SeriesCommitConfig,
    ) -> Self {
        let SeriesIngestionPorts {
            source,
            store,
            metrics,
        } = ports;
        Self {
            source,
            resolver: WatermarkResolver::new(store.clone()),
            engine: SeriesCommitEngine::with_runtime(store, clock, runtime, config),
            metrics,
        }
    }

    /// Execute one ingestion job.
    /// ```rust,ignore
    /// match handler.handle(&job).await? {
    ///     IngestionOutcome::Written(result) => assert!(result.attempts >= 1),
    ///     IngestionOutcome::Rejected(_) | IngestionOutcome::Empty => {}
    /// }
    /// ```
    pub async fn handle(&self, job: &IngestionJob) -> Result<IngestionOutcome, IngestionError> {
        let span = info_span!(
            "series_ingestion",
            key = %job.key,
            force_refresh = job.force_refresh,
            requested_start = %job.requested_start,
        );
        let result = self.run(job).instrument(span).await;
        self.record_metric(mapping::outcome_metric(&result)).await;
        result
    }

    async fn run(&self, job: &IngestionJob) -> Result<IngestionOutcome, IngestionError> {
        let request = PriceSourceRequest::daily(job.key.clone(), job.requested_start);
        let points = self.source.fetch_prices(&request).await.map_err(|source| {
            warn!(error = %source, retryable = source.is_retryable(), "price fetch failed");
            mapping::map_fetch_error(&job.key, source)
        })?;

        let batch = FetchedBatch::from_points(points);
        if batch.is_empty() {
            info!("price source returned no points");
            return Ok(IngestionOutcome::Empty);
        }

        if !job.force_refresh {
            let watermark = self
                .resolver
                .resolve(&job.key)
                .await
                .map_err(|source| mapping::map_store_error(&job.key, source))?;
            if let BatchValidation::Rejected(reason) = validate_batch(watermark, &batch) {
                info!(
                    reason = reason.as_label(),
                    watermark = ?watermark.latest(),
                    first_date = ?batch.first_date(),
                    "batch rejected"
                );
                return Ok(IngestionOutcome::Rejected(reason));
            }
        }

        match self.engine.commit(&job.key, job.force_refresh, &batch).await {
            Ok(result) => {
                info!(
                    inserted = result.inserted,
                    deleted = result.deleted,
                    attempts = result.attempts,
                    "batch committed"
                );
                Ok(IngestionOutcome::Written(result))
            }
            Err(error) => mapping::map_commit_error(&job.key, error),
        }
    }

    async fn record_metric(&self, outcome: IngestionJobOutcome) {
        // Metrics exporter errors are non-fatal.
        let _ = self.metrics.record_outcome(&outcome).await;
    }
}

impl IngestionOutcome {
    /// Metric status label for this outcome.
    pub fn status(&self) -> IngestionJobStatus {
        match self {
            Self::Written(_) => IngestionJobStatus::Written,
            Self::Rejected(_) => IngestionJobStatus::Rejected,
            Self::Empty => IngestionJobStatus::Empty,
        }
    }
}

#[cfg(test)]
mod tests;
