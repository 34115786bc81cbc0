//! Domain port surface for ingestion job outcome counters.
//!
//! Keeps observability at the domain boundary so adapters can emit Prometheus
//! counters without leaking exporter details into the handler.

use async_trait::async_trait;

use super::define_port_error;

define_port_error! {
    /// Errors exposed when recording ingestion metrics.
    pub enum IngestionJobMetricsError {
        /// Metric exporter rejected the write.
        Export { message: String } =>
            "ingestion metrics exporter failed: {message}",
    }
}

/// Outcome label for one ingestion job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum IngestionJobStatus {
    /// The commit engine wrote the batch (possibly zero rows).
    Written,
    /// The batch did not extend the stored series.
    Rejected,
    /// The price source returned no points.
    Empty,
    /// The price source call failed.
    FetchFailed,
    /// The store was unreachable or retries were exhausted.
    StoreUnavailable,
}

impl IngestionJobStatus {
    /// Stable label used by metric exporters.
    pub fn as_label(self) -> &'static str {
        match self {
            Self::Written => "written",
            Self::Rejected => "rejected",
            Self::Empty => "empty",
            Self::FetchFailed => "fetch_failed",
            Self::StoreUnavailable => "store_unavailable",
        }
    }

    /// Whether the status counts as a successful job run.
    pub fn is_success(self) -> bool {
        matches!(self, Self::Written | Self::Rejected | Self::Empty)
    }
}

/// Metric payload for one job execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestionJobOutcome {
    /// Terminal status of the job.
    pub status: IngestionJobStatus,
    /// Rows inserted by the commit.
    pub inserted: u64,
    /// Rows deleted by a refresh.
    pub deleted: u64,
}

impl IngestionJobOutcome {
    /// Outcome carrying no row counts.
    pub fn without_writes(status: IngestionJobStatus) -> Self {
        Self {
            status,
            inserted: 0,
            deleted: 0,
        }
    }
}

/// Metrics recording port for ingestion job counters.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IngestionJobMetrics: Send + Sync {
    /// Record the terminal outcome of one job.
    ///
    /// ```rust,ignore
    /// use price_series::domain::ports::{
    ///     IngestionJobMetrics, IngestionJobOutcome, IngestionJobStatus,
    ///     NoOpIngestionJobMetrics,
    /// };
    ///
    /// # async fn demo() {
    /// let metrics = NoOpIngestionJobMetrics;
    /// let outcome = IngestionJobOutcome::without_writes(IngestionJobStatus::Rejected);
    /// assert!(metrics.record_outcome(&outcome).await.is_ok());
    /// # }
    /// ```
    async fn record_outcome(
        &self,
        outcome: &IngestionJobOutcome,
    ) -> Result<(), IngestionJobMetricsError>;
}

/// No-op implementation used when metrics are disabled or in tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpIngestionJobMetrics;

#[async_trait]
impl IngestionJobMetrics for NoOpIngestionJobMetrics {
    async fn record_outcome(
        &self,
        _outcome: &IngestionJobOutcome,
    ) -> Result<(), IngestionJobMetricsError> {
        Ok(())
    }
}
