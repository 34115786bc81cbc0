//! In-memory series store honouring the transactional store contract.
//!
//! Transactions are serialised by a store-wide async lock and run against a
//! staged copy of the rows, which replaces the committed rows only when the
//! work succeeds. Faults can be scripted to exercise conflict retries and
//! rollback.

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::domain::ports::{
    SeriesCommitReport, SeriesStore, SeriesStoreError, SeriesTransaction, SeriesTransactionWork,
};
use crate::domain::{PricePoint, SeriesKey, SeriesPoint};

type Rows = BTreeMap<SeriesKey, BTreeMap<NaiveDate, Decimal>>;

/// Scripted failure applied to the next transaction.
#[derive(Debug, Clone)]
pub enum StoreFault {
    /// Run the work, then abort as a serialisation failure would.
    ConflictOnCommit,
    /// Fail the first insert inside the transaction with `error`.
    FailInsert(SeriesStoreError),
    /// Refuse to open the transaction with `error`.
    Unavailable(SeriesStoreError),
    /// Run the work, let a competing writer commit `points` for `key`, then
    /// abort this transaction as a serialisation failure.
    ConcurrentWrite {
        /// Series written by the competitor.
        key: SeriesKey,
        /// Points committed by the competitor.
        points: Vec<PricePoint>,
    },
}

/// Series store backed by process memory.
#[derive(Default)]
pub struct InMemorySeriesStore {
    rows: Mutex<Rows>,
    tx_lock: tokio::sync::Mutex<()>,
    faults: Mutex<VecDeque<StoreFault>>,
    transactions: AtomicUsize,
}

impl InMemorySeriesStore {
    /// Store committed rows for `key` directly, bypassing the commit protocol.
    pub fn seed(&self, key: &SeriesKey, points: impl IntoIterator<Item = PricePoint>) {
        let mut rows = self.lock_rows();
        let series = rows.entry(key.clone()).or_default();
        for point in points {
            series.insert(point.date, point.price);
        }
    }

    /// Committed points for `key`, ascending.
    pub fn points(&self, key: &SeriesKey) -> Vec<PricePoint> {
        self.lock_rows()
            .get(key)
            .map(|series| {
                series
                    .iter()
                    .map(|(date, price)| PricePoint::new(*date, *price))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Committed dates for `key`, ascending.
    pub fn dates(&self, key: &SeriesKey) -> Vec<NaiveDate> {
        self.points(key).into_iter().map(|point| point.date).collect()
    }

    /// Queue a fault for an upcoming transaction.
    pub fn inject(&self, fault: StoreFault) {
        self.faults
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(fault);
    }

    /// Number of transactions opened so far.
    pub fn transaction_count(&self) -> usize {
        self.transactions.load(Ordering::SeqCst)
    }

    fn next_fault(&self) -> Option<StoreFault> {
        self.faults
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
    }

    fn lock_rows(&self) -> MutexGuard<'_, Rows> {
        self.rows.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl SeriesStore for InMemorySeriesStore {
    async fn latest_date(&self, key: &SeriesKey) -> Result<Option<NaiveDate>, SeriesStoreError> {
        Ok(latest_in(&self.lock_rows(), key))
    }

    async fn load_range(
        &self,
        key: &SeriesKey,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<SeriesPoint>, SeriesStoreError> {
        if from > to {
            return Ok(Vec::new());
        }
        let rows = self.lock_rows();
        Ok(rows
            .get(key)
            .map(|series| {
                series
                    .range(from..=to)
                    .map(|(date, price)| SeriesPoint {
                        key: key.clone(),
                        date: *date,
                        price: *price,
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn transaction(
        &self,
        work: &dyn SeriesTransactionWork,
    ) -> Result<SeriesCommitReport, SeriesStoreError> {
        let _guard = self.tx_lock.lock().await;
        self.transactions.fetch_add(1, Ordering::SeqCst);

        let mut staged = StagedTransaction {
            rows: self.lock_rows().clone(),
            fail_insert: None,
        };
        let mut abort_on_commit = false;
        let mut competitor = None;
        match self.next_fault() {
            Some(StoreFault::Unavailable(error)) => return Err(error),
            Some(StoreFault::FailInsert(error)) => staged.fail_insert = Some(error),
            Some(StoreFault::ConflictOnCommit) => abort_on_commit = true,
            Some(StoreFault::ConcurrentWrite { key, points }) => {
                abort_on_commit = true;
                competitor = Some((key, points));
            }
            None => {}
        }

        let report = work.run(&mut staged).await?;
        if abort_on_commit {
            if let Some((key, points)) = competitor {
                self.seed(&key, points);
            }
            return Err(SeriesStoreError::conflict(
                "could not serialize access due to concurrent update",
            ));
        }

        *self.lock_rows() = staged.rows;
        Ok(report)
    }
}

struct StagedTransaction {
    rows: Rows,
    fail_insert: Option<SeriesStoreError>,
}

#[async_trait]
impl SeriesTransaction for StagedTransaction {
    async fn delete_series(&mut self, key: &SeriesKey) -> Result<u64, SeriesStoreError> {
        let removed = self.rows.remove(key).map_or(0, |series| series.len());
        Ok(u64::try_from(removed).unwrap_or(u64::MAX))
    }

    async fn latest_date(&mut self, key: &SeriesKey) -> Result<Option<NaiveDate>, SeriesStoreError> {
        Ok(latest_in(&self.rows, key))
    }

    async fn insert_missing(
        &mut self,
        key: &SeriesKey,
        points: &[PricePoint],
    ) -> Result<u64, SeriesStoreError> {
        if let Some(error) = self.fail_insert.take() {
            return Err(error);
        }
        let series = self.rows.entry(key.clone()).or_default();
        let mut inserted = 0;
        for point in points {
            if let Entry::Vacant(slot) = series.entry(point.date) {
                slot.insert(point.price);
                inserted += 1;
            }
        }
        Ok(inserted)
    }
}

fn latest_in(rows: &Rows, key: &SeriesKey) -> Option<NaiveDate> {
    rows.get(key).and_then(|series| series.keys().next_back().copied())
}
