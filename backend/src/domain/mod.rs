//! Domain primitives, services, and ports.
//!
//! Purpose: model daily price series and the ingestion protocol that keeps
//! them gap-free under concurrent, duplicate job delivery. Adapters live in
//! `inbound` and `outbound`; the domain only sees the ports below.
//!
//! Public surface:
//! - `Error`: transport-agnostic failure payload.
//! - `SeriesIngestionHandler`: per-job orchestration.
//! - `SeriesCommitEngine`: retrying transactional commit of one batch.

pub mod batch_validation;
pub mod error;
pub mod ports;
pub mod series;
pub mod series_commit;
pub mod series_ingestion;
pub mod watermark;

pub use self::batch_validation::{
    BatchRelation, BatchValidation, RejectionReason, contiguous_prefix, validate_batch,
};
pub use self::error::{Error, ErrorCode, ErrorValidationError};
pub use self::series::{
    FetchedBatch, IngestionJob, PricePoint, SeriesKey, SeriesKeyValidationError, SeriesPoint,
    Watermark, next_day,
};
pub use self::series_commit::{
    AttemptJitter, BackoffJitter, CommitError, CommitResult, CommitSleeper, SeriesCommitConfig,
    SeriesCommitEngine, SeriesCommitRuntime, TokioSleeper,
};
pub use self::series_ingestion::{
    IngestionError, IngestionOutcome, SeriesIngestionHandler, SeriesIngestionPorts,
};
pub use self::watermark::WatermarkResolver;
