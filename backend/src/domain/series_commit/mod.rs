//! Idempotent commit engine for daily price batches.
//!
//! Each commit runs as one store transaction that optionally purges the key,
//! re-resolves the watermark, truncates the batch to the contiguous run that
//! extends it, and inserts with skip-existing semantics. Transaction-level
//! conflicts are retried with capped, jittered exponential backoff; the queue
//! offers no per-key exclusivity so this transaction is the only guard.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mockable::Clock;
use thiserror::Error;
use tracing::{debug, warn};

use crate::domain::batch_validation::contiguous_prefix;
use crate::domain::ports::{
    SeriesCommitReport, SeriesStore, SeriesStoreError, SeriesTransaction, SeriesTransactionWork,
};
use crate::domain::watermark::WatermarkResolver;
use crate::domain::{FetchedBatch, PricePoint, SeriesKey, Watermark};

mod runtime;

pub use runtime::{AttemptJitter, SeriesCommitRuntime, TokioSleeper};

/// Retry configuration for the commit engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeriesCommitConfig {
    /// Maximum transaction attempts per commit (including the first).
    pub max_attempts: u32,
    /// Initial retry backoff.
    pub initial_backoff: Duration,
    /// Maximum retry backoff cap.
    pub max_backoff: Duration,
}

impl Default for SeriesCommitConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(50),
            max_backoff: Duration::from_secs(2),
        }
    }
}

/// Row counts from a committed batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CommitResult {
    /// Rows inserted by this commit.
    pub inserted: u64,
    /// Rows purged by a refresh.
    pub deleted: u64,
    /// Transaction attempts used.
    pub attempts: u32,
}

/// Failures surfaced by the commit engine.
#[derive(Debug, Error)]
pub enum CommitError {
    /// A refresh was requested without any replacement points.
    #[error("refresh of {key} requires a non-empty batch")]
    EmptyRefresh {
        /// Series that would have been purged.
        key: SeriesKey,
    },
    /// The store failed, or conflicts persisted past the retry budget.
    #[error("series store unavailable after {attempts} attempts: {source}")]
    StoreUnavailable {
        /// Transaction attempts made.
        attempts: u32,
        /// Last store failure.
        #[source]
        source: SeriesStoreError,
    },
}

/// Async sleeping abstraction used between commit attempts.
#[async_trait]
pub trait CommitSleeper: Send + Sync {
    /// Suspend execution for `duration`.
    async fn sleep(&self, duration: Duration);
}

/// Retry backoff jitter abstraction.
pub trait BackoffJitter: Send + Sync {
    /// Return a jittered delay from the exponential base delay.
    ///
    /// ```rust
    /// use price_series::domain::BackoffJitter;
    /// use chrono::{TimeZone, Utc};
    /// use std::time::Duration;
    /// struct FixedJitter;
    /// impl BackoffJitter for FixedJitter {
    ///     fn jittered_delay(&self, base: Duration, attempt: u32, _now: chrono::DateTime<chrono::Utc>) -> Duration {
    ///         base + Duration::from_millis(u64::from(attempt))
    ///     }
    /// }
    /// let now = Utc.with_ymd_and_hms(2023, 6, 22, 0, 0, 0).single().expect("valid time");
    /// let delay = FixedJitter.jittered_delay(Duration::from_millis(50), 2, now);
    /// assert_eq!(delay, Duration::from_millis(52));
    /// ```
    fn jittered_delay(&self, base: Duration, attempt: u32, now: DateTime<Utc>) -> Duration;
}

/// Domain-owned commit engine.
pub struct SeriesCommitEngine {
    store: Arc<dyn SeriesStore>,
    clock: Arc<dyn Clock>,
    sleeper: Arc<dyn CommitSleeper>,
    jitter: Arc<dyn BackoffJitter>,
    config: SeriesCommitConfig,
}

impl SeriesCommitEngine {
    /// Build an engine using the default Tokio runtime helpers.
    pub fn new(
        store: Arc<dyn SeriesStore>,
        clock: Arc<dyn Clock>,
        config: SeriesCommitConfig,
    ) -> Self {
        Self::with_runtime(store, clock, SeriesCommitRuntime::default(), config)
    }

    /// Build an engine with injected runtime abstractions.
    pub fn with_runtime(
        store: Arc<dyn SeriesStore>,
        clock: Arc<dyn Clock>,
        runtime: SeriesCommitRuntime,
        config: SeriesCommitConfig,
    ) -> Self {
        Self {
            store,
            clock,
            sleeper: runtime.sleeper,
            jitter: runtime.jitter,
            config,
        }
    }

    /// Commit `batch` for `key`, optionally purging the key first.
    ///
    /// ```rust,ignore
    /// let result = engine.commit(&key, false, &batch).await?;
    /// assert_eq!(result.deleted, 0);
    /// ```
    pub async fn commit(
        &self,
        key: &SeriesKey,
        force_refresh: bool,
        batch: &FetchedBatch,
    ) -> Result<CommitResult, CommitError> {
        if batch.is_empty() {
            if force_refresh {
                return Err(CommitError::EmptyRefresh { key: key.clone() });
            }
            return Ok(CommitResult::default());
        }

        let work = CommitWork {
            key,
            force_refresh,
            points: batch.points(),
        };
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match self.store.transaction(&work).await {
                Ok(report) => {
                    debug!(
                        key = %key,
                        inserted = report.inserted,
                        deleted = report.deleted,
                        attempt,
                        "series batch committed"
                    );
                    return Ok(CommitResult {
                        inserted: report.inserted,
                        deleted: report.deleted,
                        attempts: attempt,
                    });
                }
                Err(error) if error.is_conflict() && attempt < max_attempts => {
                    let delay = self.jitter.jittered_delay(
                        self.retry_base_delay(attempt),
                        attempt,
                        self.clock.utc(),
                    );
                    warn!(
                        key = %key,
                        attempt,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %error,
                        "series commit conflicted; retrying"
                    );
                    self.sleeper.sleep(delay).await;
                    attempt += 1;
                }
                Err(source) => {
                    return Err(CommitError::StoreUnavailable {
                        attempts: attempt,
                        source,
                    });
                }
            }
        }
    }

    fn retry_base_delay(&self, attempt: u32) -> Duration {
        let exponent = 2_u32.saturating_pow(attempt.saturating_sub(1));
        let base_ms = u64::try_from(self.config.initial_backoff.as_millis()).unwrap_or(u64::MAX);
        let max_ms = u64::try_from(self.config.max_backoff.as_millis()).unwrap_or(u64::MAX);
        Duration::from_millis(base_ms.saturating_mul(u64::from(exponent)).min(max_ms))
    }
}

/// Transaction body shared by every attempt of one commit.
struct CommitWork<'a> {
    key: &'a SeriesKey,
    force_refresh: bool,
    points: &'a [PricePoint],
}

#[async_trait]
impl SeriesTransactionWork for CommitWork<'_> {
    async fn run(
        &self,
        tx: &mut dyn SeriesTransaction,
    ) -> Result<SeriesCommitReport, SeriesStoreError> {
        let deleted = if self.force_refresh {
            tx.delete_series(self.key).await?
        } else {
            0
        };

        let watermark = WatermarkResolver::resolve_in(tx, self.key).await?;
        let start = match watermark {
            Watermark::Absent => self.points.first().map(|point| point.date),
            Watermark::At(_) => watermark.next_date(),
        };
        let prefix = start.map_or(&[][..], |start| contiguous_prefix(self.points, start));

        let inserted = if prefix.is_empty() {
            0
        } else {
            tx.insert_missing(self.key, prefix).await?
        };

        Ok(SeriesCommitReport { inserted, deleted })
    }
}
