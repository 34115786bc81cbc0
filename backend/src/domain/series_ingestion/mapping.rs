//! Mapping helpers for handler failures and metric payloads.

use serde_json::json;

use crate::domain::Error;
use crate::domain::ports::{
    IngestionJobOutcome, IngestionJobStatus, PriceSourceError, SeriesStoreError,
};
use crate::domain::series_commit::CommitError;
use crate::domain::SeriesKey;

use super::{IngestionError, IngestionOutcome};

pub(super) fn map_fetch_error(key: &SeriesKey, source: PriceSourceError) -> IngestionError {
    let key = key.clone();
    if source.is_retryable() {
        IngestionError::TransientFetchFailure { key, source }
    } else {
        IngestionError::RejectedFetch { key, source }
    }
}

pub(super) fn map_store_error(key: &SeriesKey, source: SeriesStoreError) -> IngestionError {
    IngestionError::StoreUnavailable {
        key: key.clone(),
        attempts: 1,
        source,
    }
}

pub(super) fn map_commit_error(
    key: &SeriesKey,
    error: CommitError,
) -> Result<IngestionOutcome, IngestionError> {
    match error {
        // The handler never commits an empty batch; treat a refused refresh
        // the same as an empty fetch.
        CommitError::EmptyRefresh { .. } => Ok(IngestionOutcome::Empty),
        CommitError::StoreUnavailable { attempts, source } => {
            Err(IngestionError::StoreUnavailable {
                key: key.clone(),
                attempts,
                source,
            })
        }
    }
}

pub(super) fn outcome_metric(
    result: &Result<IngestionOutcome, IngestionError>,
) -> IngestionJobOutcome {
    match result {
        Ok(IngestionOutcome::Written(commit)) => IngestionJobOutcome {
            status: IngestionJobStatus::Written,
            inserted: commit.inserted,
            deleted: commit.deleted,
        },
        Ok(outcome) => IngestionJobOutcome::without_writes(outcome.status()),
        Err(IngestionError::TransientFetchFailure { .. } | IngestionError::RejectedFetch { .. }) => {
            IngestionJobOutcome::without_writes(IngestionJobStatus::FetchFailed)
        }
        Err(IngestionError::StoreUnavailable { .. }) => {
            IngestionJobOutcome::without_writes(IngestionJobStatus::StoreUnavailable)
        }
    }
}

impl From<IngestionError> for Error {
    fn from(error: IngestionError) -> Self {
        let message = error.to_string();
        match error {
            IngestionError::TransientFetchFailure { key, .. } => {
                Self::service_unavailable(message).with_details(json!({ "key": key.as_str() }))
            }
            IngestionError::RejectedFetch { key, .. } => {
                Self::invalid_request(message).with_details(json!({ "key": key.as_str() }))
            }
            IngestionError::StoreUnavailable { key, attempts, .. } => {
                Self::service_unavailable(message)
                    .with_details(json!({ "key": key.as_str(), "attempts": attempts }))
            }
        }
    }
}
