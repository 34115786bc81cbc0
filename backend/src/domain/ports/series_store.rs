//! Driven port for the transactional daily price series table.
//!
//! Rows are keyed by `(series_key, date)` with a uniqueness constraint. The
//! commit protocol lives in the domain; adapters only supply a transaction
//! scope and the primitive reads and writes that run inside it.

use async_trait::async_trait;
use chrono::NaiveDate;

use super::define_port_error;
use crate::domain::{PricePoint, SeriesKey, SeriesPoint};

define_port_error! {
    /// Errors raised by series store adapters.
    pub enum SeriesStoreError {
        /// Store connection could not be established or was lost.
        Connection { message: String } =>
            "series store connection failed: {message}",
        /// Query or mutation failed during execution.
        Query { message: String } =>
            "series store query failed: {message}",
        /// The transaction lost a race with a concurrent writer and may be
        /// retried from scratch.
        Conflict { message: String } =>
            "series store write conflict: {message}",
    }
}

impl SeriesStoreError {
    /// Return whether the failure is a transaction-level conflict.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

/// Row counts produced by one committed transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SeriesCommitReport {
    /// Rows actually inserted; skipped duplicates are not counted.
    pub inserted: u64,
    /// Rows removed by a purge.
    pub deleted: u64,
}

/// Operations available inside one store transaction.
#[async_trait]
pub trait SeriesTransaction: Send {
    /// Delete every row stored for `key`, returning the number removed.
    async fn delete_series(&mut self, key: &SeriesKey) -> Result<u64, SeriesStoreError>;

    /// Latest stored date for `key` as seen by this transaction.
    async fn latest_date(&mut self, key: &SeriesKey) -> Result<Option<NaiveDate>, SeriesStoreError>;

    /// Insert `points` for `key`, skipping dates that already exist. Returns
    /// the number of rows actually inserted.
    async fn insert_missing(
        &mut self,
        key: &SeriesKey,
        points: &[PricePoint],
    ) -> Result<u64, SeriesStoreError>;
}

/// Unit of work executed inside a store transaction.
///
/// Adapters commit when `run` returns `Ok` and roll back otherwise. The work
/// may be invoked again after a conflict, so it must not carry state between
/// invocations.
#[async_trait]
pub trait SeriesTransactionWork: Send + Sync {
    /// Execute the work against an open transaction.
    async fn run(
        &self,
        tx: &mut dyn SeriesTransaction,
    ) -> Result<SeriesCommitReport, SeriesStoreError>;
}

/// Port over the series table.
#[async_trait]
pub trait SeriesStore: Send + Sync {
    /// Latest stored date for `key`, outside any write transaction.
    async fn latest_date(&self, key: &SeriesKey) -> Result<Option<NaiveDate>, SeriesStoreError>;

    /// Stored rows for `key` with dates in `from..=to`, ascending.
    async fn load_range(
        &self,
        key: &SeriesKey,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<SeriesPoint>, SeriesStoreError>;

    /// Run `work` inside one serialisable transaction.
    async fn transaction(
        &self,
        work: &dyn SeriesTransactionWork,
    ) -> Result<SeriesCommitReport, SeriesStoreError>;
}
