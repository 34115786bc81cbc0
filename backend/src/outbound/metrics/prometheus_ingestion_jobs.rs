//! Prometheus adapter for series ingestion job counters.
//!
//! This adapter writes two counter families so dashboards can query either a
//! shared multi-job metric (`jobs_total`) or an ingestion-focused metric
//! (`series_ingestion_jobs_total`) without domain coupling. Row counts land in
//! `series_ingestion_rows_total`.

use async_trait::async_trait;
use prometheus::{CounterVec, Opts, Registry};

use crate::domain::ports::{IngestionJobMetrics, IngestionJobMetricsError, IngestionJobOutcome};

const INGESTION_TYPE_LABEL: &str = "SeriesIngestion";

/// Prometheus-backed recorder for ingestion job outcomes.
pub struct PrometheusIngestionJobMetrics {
    jobs_total: CounterVec,
    ingestion_jobs_total: CounterVec,
    rows_total: CounterVec,
}

impl PrometheusIngestionJobMetrics {
    /// Create and register counters with the provided registry.
    ///
    /// # Errors
    ///
    /// Returns an error when Prometheus rejects metric registration.
    pub fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        let jobs_total = CounterVec::new(
            Opts::new("jobs_total", "Total jobs by type and status"),
            &["type", "status"],
        )?;
        let ingestion_jobs_total = CounterVec::new(
            Opts::new(
                "series_ingestion_jobs_total",
                "Total series ingestion jobs by status",
            ),
            &["status"],
        )?;
        let rows_total = CounterVec::new(
            Opts::new(
                "series_ingestion_rows_total",
                "Series rows written by ingestion jobs",
            ),
            &["operation"],
        )?;
        registry.register(Box::new(jobs_total.clone()))?;
        registry.register(Box::new(ingestion_jobs_total.clone()))?;
        registry.register(Box::new(rows_total.clone()))?;
        Ok(Self {
            jobs_total,
            ingestion_jobs_total,
            rows_total,
        })
    }

    fn record(&self, outcome: &IngestionJobOutcome) {
        let status = outcome.status.as_label();
        self.jobs_total
            .with_label_values(&[INGESTION_TYPE_LABEL, status])
            .inc();
        self.ingestion_jobs_total
            .with_label_values(&[status])
            .inc();
        if outcome.inserted > 0 {
            self.rows_total
                .with_label_values(&["inserted"])
                .inc_by(outcome.inserted as f64);
        }
        if outcome.deleted > 0 {
            self.rows_total
                .with_label_values(&["deleted"])
                .inc_by(outcome.deleted as f64);
        }
    }
}

#[async_trait]
impl IngestionJobMetrics for PrometheusIngestionJobMetrics {
    async fn record_outcome(
        &self,
        outcome: &IngestionJobOutcome,
    ) -> Result<(), IngestionJobMetricsError> {
        self.record(outcome);
        Ok(())
    }
}
