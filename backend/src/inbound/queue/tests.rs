//! Dispatcher coverage against in-memory ports.

use std::sync::Arc;

use chrono::{NaiveDate, TimeZone, Utc};
use rstest::{fixture, rstest};
use rust_decimal::Decimal;

use super::{DispatchSummary, JobDisposition, JobDispatcher};
use crate::domain::ports::{NoOpIngestionJobMetrics, PriceSourceError, SeriesStoreError};
use crate::domain::{
    ErrorCode, IngestionOutcome, PricePoint, SeriesCommitConfig, SeriesCommitRuntime,
    SeriesIngestionHandler, SeriesIngestionPorts, SeriesKey,
};
use crate::test_support::{
    ImmediateSleeper, InMemorySeriesStore, MutableClock, NoJitter, ScriptedPriceSource, StoreFault,
};

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2023, 6, d).expect("valid date")
}

fn points(days: &[u32]) -> Vec<PricePoint> {
    days.iter()
        .map(|d| PricePoint::new(day(*d), Decimal::new(i64::from(*d), 0)))
        .collect()
}

struct Harness {
    store: Arc<InMemorySeriesStore>,
    dispatcher: JobDispatcher,
}

fn harness(source: ScriptedPriceSource) -> Harness {
    let store = Arc::new(InMemorySeriesStore::default());
    let clock = Arc::new(MutableClock::new(
        Utc.with_ymd_and_hms(2023, 6, 25, 0, 0, 0)
            .single()
            .expect("valid time"),
    ));
    let handler = SeriesIngestionHandler::with_runtime(
        SeriesIngestionPorts::new(
            Arc::new(source),
            store.clone(),
            Arc::new(NoOpIngestionJobMetrics),
        ),
        clock,
        SeriesCommitRuntime {
            sleeper: Arc::new(ImmediateSleeper),
            jitter: Arc::new(NoJitter),
        },
        SeriesCommitConfig::default(),
    );
    Harness {
        store,
        dispatcher: JobDispatcher::new(Arc::new(handler)),
    }
}

#[fixture]
fn key() -> SeriesKey {
    SeriesKey::new("0xabc").expect("valid key")
}

const JOB: &str = r#"{"key":"0xabc","requestedStart":"2023-06-22"}"#;

#[rstest]
#[tokio::test]
async fn valid_payload_completes_with_written_outcome(key: SeriesKey) {
    let harness = harness(ScriptedPriceSource::repeating(points(&[22, 23, 24])));
    harness.store.seed(&key, points(&[21]));

    let disposition = harness.dispatcher.dispatch(JOB.as_bytes()).await;

    let JobDisposition::Completed(IngestionOutcome::Written(result)) = disposition else {
        panic!("expected written outcome, got {disposition:?}");
    };
    assert_eq!((result.inserted, result.deleted), (3, 0));
    assert!(!JobDisposition::Completed(IngestionOutcome::Empty).should_redeliver());
}

#[rstest]
#[tokio::test]
async fn malformed_payload_is_dead_lettered_without_touching_the_store() {
    let harness = harness(ScriptedPriceSource::repeating(points(&[22])));

    let disposition = harness
        .dispatcher
        .dispatch(br#"{"key":"0xabc","requestedStart":"yesterday"}"#)
        .await;

    let JobDisposition::Failed(ref error) = disposition else {
        panic!("expected failure, got {disposition:?}");
    };
    assert_eq!(error.code(), ErrorCode::InvalidRequest);
    assert!(!disposition.should_redeliver());
    assert_eq!(harness.store.transaction_count(), 0);
}

#[rstest]
#[tokio::test]
async fn transient_fetch_failure_is_redelivered() {
    let harness = harness(ScriptedPriceSource::scripted(vec![Err(
        PriceSourceError::timeout("upstream slow"),
    )]));

    let disposition = harness.dispatcher.dispatch(JOB.as_bytes()).await;

    assert!(disposition.should_redeliver());
}

#[rstest]
#[tokio::test]
async fn undecodable_upstream_response_is_dead_lettered() {
    let harness = harness(ScriptedPriceSource::scripted(vec![Err(
        PriceSourceError::decode("expected array"),
    )]));

    let disposition = harness.dispatcher.dispatch(JOB.as_bytes()).await;

    let JobDisposition::Failed(ref error) = disposition else {
        panic!("expected failure, got {disposition:?}");
    };
    assert_eq!(error.code(), ErrorCode::InvalidRequest);
    assert!(!disposition.should_redeliver());
    assert_eq!(harness.store.transaction_count(), 0);
}

#[rstest]
#[tokio::test]
async fn store_outage_is_redelivered(key: SeriesKey) {
    let harness = harness(ScriptedPriceSource::repeating(points(&[22])));
    harness.store.seed(&key, points(&[21]));
    harness
        .store
        .inject(StoreFault::Unavailable(SeriesStoreError::connection("refused")));

    let disposition = harness.dispatcher.dispatch(JOB.as_bytes()).await;

    let JobDisposition::Failed(ref error) = disposition else {
        panic!("expected failure, got {disposition:?}");
    };
    assert_eq!(error.code(), ErrorCode::ServiceUnavailable);
    assert!(disposition.should_redeliver());
}

#[rstest]
#[tokio::test]
async fn drains_newline_delimited_stream(key: SeriesKey) {
    let harness = harness(ScriptedPriceSource::repeating(points(&[22, 23, 24])));
    harness.store.seed(&key, points(&[21]));
    let input = format!("{JOB}\n\n   \n{JOB}\nnot json\n");

    let summary = harness
        .dispatcher
        .dispatch_lines(input.as_bytes(), 2)
        .await
        .expect("stream should drain");

    assert_eq!(
        summary,
        DispatchSummary {
            completed: 2,
            retryable: 0,
            dead_lettered: 1,
        }
    );
    assert_eq!(harness.store.dates(&key), vec![day(21), day(22), day(23), day(24)]);
}

#[rstest]
#[tokio::test]
async fn zero_concurrency_still_drains() {
    let harness = harness(ScriptedPriceSource::repeating(Vec::new()));

    let summary = harness
        .dispatcher
        .dispatch_lines(format!("{JOB}\n").as_bytes(), 0)
        .await
        .expect("stream should drain");

    assert_eq!(summary.completed, 1);
}
