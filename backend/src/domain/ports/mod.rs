//! Domain ports and supporting types for the hexagonal boundary.

mod macros;
pub(crate) use macros::define_port_error;

mod ingestion_job_metrics;
mod price_source;
mod series_store;

#[cfg(test)]
pub use ingestion_job_metrics::MockIngestionJobMetrics;
pub use ingestion_job_metrics::{
    IngestionJobMetrics, IngestionJobMetricsError, IngestionJobOutcome, IngestionJobStatus,
    NoOpIngestionJobMetrics,
};
#[cfg(test)]
pub use price_source::MockPriceSource;
pub use price_source::{Granularity, PriceSource, PriceSourceError, PriceSourceRequest};
pub use series_store::{
    SeriesCommitReport, SeriesStore, SeriesStoreError, SeriesTransaction, SeriesTransactionWork,
};
