//! Queue-facing inbound adapter.
//!
//! Deliveries arrive as raw JSON payloads. The dispatcher validates each one,
//! runs it through the ingestion handler, and reports a disposition the
//! broker can act on: acknowledge, redeliver, or dead-letter. Newline-delimited
//! streams are supported so any broker can feed the worker through a pipe.

use std::sync::Arc;

use futures_util::future;
use futures_util::stream::{self, TryStreamExt};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{info, warn};

use crate::domain::{Error, IngestionOutcome, SeriesIngestionHandler};

mod payload;

pub use payload::{JobPayload, MalformedPayload};

/// Broker-facing result of one delivery.
#[derive(Debug, Clone, PartialEq)]
pub enum JobDisposition {
    /// The job reached a terminal success state; acknowledge it.
    Completed(IngestionOutcome),
    /// The job failed. `Error::is_retryable` tells the broker whether to
    /// redeliver or dead-letter it.
    Failed(Error),
}

impl JobDisposition {
    /// Whether the broker should redeliver the job.
    pub fn should_redeliver(&self) -> bool {
        match self {
            Self::Completed(_) => false,
            Self::Failed(error) => error.is_retryable(),
        }
    }
}

/// Counts of dispositions produced while draining a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DispatchSummary {
    /// Jobs acknowledged as complete.
    pub completed: usize,
    /// Failed jobs that should be redelivered.
    pub retryable: usize,
    /// Failed jobs that should be dead-lettered.
    pub dead_lettered: usize,
}

impl DispatchSummary {
    fn record(mut self, disposition: &JobDisposition) -> Self {
        match disposition {
            JobDisposition::Completed(_) => self.completed += 1,
            JobDisposition::Failed(_) if disposition.should_redeliver() => self.retryable += 1,
            JobDisposition::Failed(_) => self.dead_lettered += 1,
        }
        self
    }
}

/// Validates deliveries and feeds them to the ingestion handler.
#[derive(Clone)]
pub struct JobDispatcher {
    handler: Arc<SeriesIngestionHandler>,
}

impl JobDispatcher {
    /// Create a dispatcher over a shared handler.
    pub fn new(handler: Arc<SeriesIngestionHandler>) -> Self {
        Self { handler }
    }

    /// Process one raw payload.
    pub async fn dispatch(&self, raw: &[u8]) -> JobDisposition {
        let payload = match JobPayload::parse(raw) {
            Ok(payload) => payload,
            Err(error) => {
                warn!(error = %error, "dead-lettering malformed job payload");
                return JobDisposition::Failed(error.into());
            }
        };

        let job = payload.into_job();
        match self.handler.handle(&job).await {
            Ok(outcome) => {
                info!(key = %job.key, status = outcome.status().as_label(), "job completed");
                JobDisposition::Completed(outcome)
            }
            Err(error) => {
                let error = Error::from(error);
                warn!(
                    key = %job.key,
                    retryable = error.is_retryable(),
                    error = error.message(),
                    "job failed"
                );
                JobDisposition::Failed(error)
            }
        }
    }

    /// Drain newline-delimited payloads from `reader`, running up to
    /// `max_concurrent` jobs at once. Blank lines are skipped.
    ///
    /// # Errors
    ///
    /// Returns an I/O error when reading from `reader` fails. Jobs already in
    /// flight are dropped.
    pub async fn dispatch_lines<R>(
        &self,
        reader: R,
        max_concurrent: usize,
    ) -> std::io::Result<DispatchSummary>
    where
        R: AsyncBufRead + Unpin,
    {
        let lines = stream::try_unfold(reader.lines(), |mut lines| async move {
            Ok::<_, std::io::Error>(lines.next_line().await?.map(|line| (line, lines)))
        });

        lines
            .try_filter(|line| future::ready(!line.trim().is_empty()))
            .map_ok(|line| async move {
                Ok::<_, std::io::Error>(self.dispatch(line.as_bytes()).await)
            })
            .try_buffer_unordered(max_concurrent.max(1))
            .try_fold(DispatchSummary::default(), |summary, disposition| {
                future::ready(Ok(summary.record(&disposition)))
            })
            .await
    }
}

#[cfg(test)]
mod tests;
