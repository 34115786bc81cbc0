//! Unit tests for ingestion handler orchestration.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone, Utc};
use rstest::{fixture, rstest};
use rust_decimal::Decimal;
use tokio::sync::Barrier;

use super::{IngestionError, IngestionOutcome, SeriesIngestionHandler, SeriesIngestionPorts};
use crate::domain::batch_validation::{BatchRelation, RejectionReason};
use crate::domain::ports::{
    IngestionJobMetrics, IngestionJobStatus, MockIngestionJobMetrics, NoOpIngestionJobMetrics,
    PriceSource, PriceSourceError, SeriesCommitReport, SeriesStore, SeriesStoreError,
    SeriesTransactionWork,
};
use crate::domain::series_commit::{SeriesCommitConfig, SeriesCommitRuntime};
use crate::domain::{Error, ErrorCode, IngestionJob, PricePoint, SeriesKey, SeriesPoint};
use crate::test_support::{
    ImmediateSleeper, InMemorySeriesStore, MutableClock, NoJitter, ScriptedPriceSource, StoreFault,
};

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2023, 6, d).expect("valid date")
}

fn points(days: &[u32]) -> Vec<PricePoint> {
    days.iter()
        .map(|d| PricePoint::new(day(*d), Decimal::new(i64::from(*d) * 100, 2)))
        .collect()
}

#[fixture]
fn key() -> SeriesKey {
    SeriesKey::new("0xabc").expect("valid key")
}

fn job(key: &SeriesKey, force_refresh: bool, requested_start: u32) -> IngestionJob {
    IngestionJob {
        key: key.clone(),
        force_refresh,
        requested_start: day(requested_start),
    }
}

fn handler(
    source: Arc<dyn PriceSource>,
    store: Arc<dyn SeriesStore>,
    metrics: Arc<dyn IngestionJobMetrics>,
) -> SeriesIngestionHandler {
    let clock = Arc::new(MutableClock::new(
        Utc.with_ymd_and_hms(2023, 6, 25, 0, 0, 0)
            .single()
            .expect("valid time"),
    ));
    SeriesIngestionHandler::with_runtime(
        SeriesIngestionPorts::new(source, store, metrics),
        clock,
        SeriesCommitRuntime {
            sleeper: Arc::new(ImmediateSleeper),
            jitter: Arc::new(NoJitter),
        },
        SeriesCommitConfig::default(),
    )
}

fn handler_over(source: Arc<ScriptedPriceSource>, store: Arc<InMemorySeriesStore>) -> SeriesIngestionHandler {
    handler(source, store, Arc::new(NoOpIngestionJobMetrics))
}

/// Store wrapper holding every transaction until `callers` are waiting, so
/// concurrent jobs resolve their watermarks before either commits.
struct GatedStore {
    inner: Arc<InMemorySeriesStore>,
    gate: Barrier,
}

#[async_trait]
impl SeriesStore for GatedStore {
    async fn latest_date(&self, key: &SeriesKey) -> Result<Option<NaiveDate>, SeriesStoreError> {
        self.inner.latest_date(key).await
    }

    async fn load_range(
        &self,
        key: &SeriesKey,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<SeriesPoint>, SeriesStoreError> {
        self.inner.load_range(key, from, to).await
    }

    async fn transaction(
        &self,
        work: &dyn SeriesTransactionWork,
    ) -> Result<SeriesCommitReport, SeriesStoreError> {
        self.gate.wait().await;
        self.inner.transaction(work).await
    }
}

#[rstest]
#[tokio::test]
async fn appends_the_next_days_after_the_watermark(key: SeriesKey) {
    let store = Arc::new(InMemorySeriesStore::default());
    store.seed(&key, points(&[20, 21]));
    let source = Arc::new(ScriptedPriceSource::repeating(points(&[22, 23, 24])));
    let handler = handler_over(source.clone(), store.clone());

    let outcome = handler.handle(&job(&key, false, 22)).await.expect("handle");

    let IngestionOutcome::Written(result) = outcome else {
        panic!("expected written outcome, got {outcome:?}");
    };
    assert_eq!((result.inserted, result.deleted), (3, 0));
    assert_eq!(
        store.dates(&key),
        vec![day(20), day(21), day(22), day(23), day(24)]
    );
    let requests = source.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].start, day(22));
}

#[rstest]
#[tokio::test]
async fn concurrent_identical_jobs_write_each_date_once(key: SeriesKey) {
    let inner = Arc::new(InMemorySeriesStore::default());
    inner.seed(&key, points(&[21]));
    let store = Arc::new(GatedStore {
        inner: inner.clone(),
        gate: Barrier::new(2),
    });
    let source = Arc::new(ScriptedPriceSource::repeating(points(&[22, 23, 24])));
    let handler = handler(source, store, Arc::new(NoOpIngestionJobMetrics));
    let first = job(&key, false, 22);
    let second = job(&key, false, 22);

    let (left, right) = tokio::join!(handler.handle(&first), handler.handle(&second));

    let mut counts = [left, right].map(|result| match result.expect("handle") {
        IngestionOutcome::Written(commit) => (commit.inserted, commit.deleted),
        other => panic!("expected written outcome, got {other:?}"),
    });
    counts.sort_unstable();
    assert_eq!(counts, [(0, 0), (3, 0)]);
    assert_eq!(inner.dates(&key), vec![day(21), day(22), day(23), day(24)]);
}

#[rstest]
#[tokio::test]
async fn sequential_duplicate_job_is_rejected_as_overlap(key: SeriesKey) {
    let store = Arc::new(InMemorySeriesStore::default());
    store.seed(&key, points(&[21]));
    let source = Arc::new(ScriptedPriceSource::repeating(points(&[22, 23, 24])));
    let handler = handler_over(source, store.clone());

    handler.handle(&job(&key, false, 22)).await.expect("first");
    let outcome = handler.handle(&job(&key, false, 22)).await.expect("second");

    assert!(matches!(
        outcome,
        IngestionOutcome::Rejected(RejectionReason::GapOrOverlap {
            relation: BatchRelation::Overlap,
            ..
        })
    ));
    assert_eq!(store.transaction_count(), 1);
}

#[rstest]
#[tokio::test]
async fn gap_after_watermark_is_rejected_without_writes(key: SeriesKey) {
    let store = Arc::new(InMemorySeriesStore::default());
    store.seed(&key, points(&[21]));
    let source = Arc::new(ScriptedPriceSource::repeating(points(&[23, 24])));
    let handler = handler_over(source, store.clone());

    let outcome = handler.handle(&job(&key, false, 22)).await.expect("handle");

    assert_eq!(
        outcome,
        IngestionOutcome::Rejected(RejectionReason::GapOrOverlap {
            watermark: day(21),
            first_date: day(23),
            relation: BatchRelation::Gap,
        })
    );
    assert_eq!(store.transaction_count(), 0);
    assert_eq!(store.dates(&key), vec![day(21)]);
}

#[rstest]
#[tokio::test]
async fn new_key_is_loaded_from_any_start(key: SeriesKey) {
    let store = Arc::new(InMemorySeriesStore::default());
    let source = Arc::new(ScriptedPriceSource::repeating(points(&[5, 6, 7])));
    let handler = handler_over(source, store.clone());

    let outcome = handler.handle(&job(&key, false, 1)).await.expect("handle");

    assert!(matches!(outcome, IngestionOutcome::Written(result) if result.inserted == 3));
    assert_eq!(store.dates(&key), vec![day(5), day(6), day(7)]);
}

#[rstest]
#[tokio::test]
async fn empty_fetch_is_a_no_op(key: SeriesKey) {
    let store = Arc::new(InMemorySeriesStore::default());
    store.seed(&key, points(&[21]));
    let source = Arc::new(ScriptedPriceSource::repeating(Vec::new()));
    let handler = handler_over(source, store.clone());

    let outcome = handler.handle(&job(&key, true, 22)).await.expect("handle");

    assert_eq!(outcome, IngestionOutcome::Empty);
    assert_eq!(store.transaction_count(), 0);
    assert_eq!(store.dates(&key), vec![day(21)]);
}

#[rstest]
#[case::transport(PriceSourceError::transport("reset"), true)]
#[case::rate_limited(PriceSourceError::rate_limited("slow down"), true)]
#[case::timeout(PriceSourceError::timeout("slow"), true)]
#[case::decode(PriceSourceError::decode("bad body"), false)]
#[case::invalid(PriceSourceError::invalid_request("unknown key"), false)]
#[tokio::test]
async fn fetch_failures_end_the_job_without_writes(
    key: SeriesKey,
    #[case] failure: PriceSourceError,
    #[case] retryable: bool,
) {
    let store = Arc::new(InMemorySeriesStore::default());
    let source = Arc::new(ScriptedPriceSource::scripted(vec![Err(failure)]));
    let handler = handler_over(source.clone(), store.clone());

    let error = handler
        .handle(&job(&key, false, 22))
        .await
        .expect_err("fetch failure");

    if retryable {
        assert!(matches!(error, IngestionError::TransientFetchFailure { .. }));
    } else {
        assert!(matches!(error, IngestionError::RejectedFetch { .. }));
    }
    assert_eq!(error.is_retryable(), retryable);
    assert_eq!(source.calls(), 1);
    assert_eq!(store.transaction_count(), 0);
}

#[rstest]
#[tokio::test]
async fn refresh_skips_outer_validation_and_replaces_rows(key: SeriesKey) {
    let store = Arc::new(InMemorySeriesStore::default());
    store.seed(&key, points(&[18, 19, 20, 21]));
    let source = Arc::new(ScriptedPriceSource::repeating(points(&[1, 2, 3])));
    let handler = handler_over(source, store.clone());

    let outcome = handler.handle(&job(&key, true, 1)).await.expect("handle");

    let IngestionOutcome::Written(result) = outcome else {
        panic!("expected written outcome, got {outcome:?}");
    };
    assert_eq!((result.inserted, result.deleted), (3, 4));
    assert_eq!(store.dates(&key), vec![day(1), day(2), day(3)]);
}

#[rstest]
#[tokio::test]
async fn failed_refresh_surfaces_store_unavailable_and_keeps_rows(key: SeriesKey) {
    let store = Arc::new(InMemorySeriesStore::default());
    let before = points(&[18, 19, 20, 21]);
    store.seed(&key, before.clone());
    store.inject(StoreFault::FailInsert(SeriesStoreError::connection("dropped")));
    let source = Arc::new(ScriptedPriceSource::repeating(points(&[1, 2, 3])));
    let handler = handler_over(source, store.clone());

    let error = handler
        .handle(&job(&key, true, 1))
        .await
        .expect_err("store failure");

    assert!(matches!(error, IngestionError::StoreUnavailable { attempts: 1, .. }));
    assert!(error.is_retryable());
    assert_eq!(store.points(&key), before);
}

#[rstest]
#[tokio::test]
async fn written_outcome_is_reported_to_metrics(key: SeriesKey) {
    let store = Arc::new(InMemorySeriesStore::default());
    let source = Arc::new(ScriptedPriceSource::repeating(points(&[22, 23])));
    let mut metrics = MockIngestionJobMetrics::new();
    metrics
        .expect_record_outcome()
        .withf(|outcome| {
            outcome.status == IngestionJobStatus::Written
                && outcome.inserted == 2
                && outcome.deleted == 0
        })
        .times(1)
        .returning(|_| Ok(()));
    let handler = handler(source, store, Arc::new(metrics));

    handler.handle(&job(&key, false, 22)).await.expect("handle");
}

#[rstest]
#[tokio::test]
async fn metrics_failures_do_not_fail_the_job(key: SeriesKey) {
    let store = Arc::new(InMemorySeriesStore::default());
    let source = Arc::new(ScriptedPriceSource::scripted(vec![Err(
        PriceSourceError::timeout("slow"),
    )]));
    let mut metrics = MockIngestionJobMetrics::new();
    metrics
        .expect_record_outcome()
        .withf(|outcome| outcome.status == IngestionJobStatus::FetchFailed)
        .times(1)
        .returning(|_| {
            Err(crate::domain::ports::IngestionJobMetricsError::export(
                "exporter offline",
            ))
        });
    let handler = handler(source, store, Arc::new(metrics));

    let error = handler
        .handle(&job(&key, false, 22))
        .await
        .expect_err("fetch failure is still surfaced");

    assert!(matches!(error, IngestionError::TransientFetchFailure { .. }));
}

#[rstest]
fn store_failures_map_to_service_unavailable(key: SeriesKey) {
    let error = Error::from(IngestionError::StoreUnavailable {
        key,
        attempts: 5,
        source: SeriesStoreError::conflict("40001"),
    });

    assert_eq!(error.code(), ErrorCode::ServiceUnavailable);
    assert_eq!(
        error.details(),
        Some(&serde_json::json!({ "key": "0xabc", "attempts": 5 }))
    );
}

#[rstest]
fn transient_fetch_failures_map_to_service_unavailable(key: SeriesKey) {
    let error = Error::from(IngestionError::TransientFetchFailure {
        key,
        source: PriceSourceError::timeout("slow"),
    });

    assert_eq!(error.code(), ErrorCode::ServiceUnavailable);
    assert_eq!(error.details(), Some(&serde_json::json!({ "key": "0xabc" })));
}

#[rstest]
fn rejected_fetches_map_to_invalid_request(key: SeriesKey) {
    let error = Error::from(IngestionError::RejectedFetch {
        key,
        source: PriceSourceError::decode("bad body"),
    });

    assert_eq!(error.code(), ErrorCode::InvalidRequest);
    assert_eq!(error.details(), Some(&serde_json::json!({ "key": "0xabc" })));
}

#[rstest]
#[tokio::test]
async fn rejected_fetch_is_reported_as_fetch_failed(key: SeriesKey) {
    let store = Arc::new(InMemorySeriesStore::default());
    let source = Arc::new(ScriptedPriceSource::scripted(vec![Err(
        PriceSourceError::decode("truncated body"),
    )]));
    let mut metrics = MockIngestionJobMetrics::new();
    metrics
        .expect_record_outcome()
        .withf(|outcome| outcome.status == IngestionJobStatus::FetchFailed)
        .times(1)
        .returning(|_| Ok(()));
    let handler = handler(source, store, Arc::new(metrics));

    let error = handler
        .handle(&job(&key, false, 22))
        .await
        .expect_err("decode failure");

    assert!(matches!(error, IngestionError::RejectedFetch { .. }));
    assert!(!error.is_retryable());
}
