//! PostgreSQL-backed series store adapter.
//!
//! Every commit runs in a `SERIALIZABLE` transaction so the in-transaction
//! watermark read and the inserts are serialised against concurrent commits
//! for the same key. Inserts use `ON CONFLICT DO NOTHING` on
//! `(series_key, point_date)`; the returned row count is the number actually
//! inserted.

use async_trait::async_trait;
use chrono::NaiveDate;
use diesel::dsl::max;
use diesel::prelude::*;
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use tracing::debug;

use crate::domain::ports::{
    SeriesCommitReport, SeriesStore, SeriesStoreError, SeriesTransaction, SeriesTransactionWork,
};
use crate::domain::{PricePoint, SeriesKey, SeriesPoint};

use super::diesel_helpers::{map_diesel_error, map_pool_error};
use super::models::{NewSeriesPointRow, SeriesPointRow};
use super::pool::DbPool;
use super::schema::series_points;

/// Rows per insert statement; three bind parameters per row keeps each
/// statement under the PostgreSQL limit of 65535.
const INSERT_CHUNK_ROWS: usize = 10_000;

/// Diesel-backed implementation of the series store port.
#[derive(Clone)]
pub struct DieselSeriesStore {
    pool: DbPool,
}

impl DieselSeriesStore {
    /// Create a new store with the given connection pool.
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use price_series::outbound::persistence::{DbPool, DieselSeriesStore, PoolConfig};
    ///
    /// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
    /// let pool = DbPool::new(PoolConfig::new("postgres://localhost/prices")).await?;
    /// let store = DieselSeriesStore::new(pool);
    /// # let _ = store;
    /// # Ok(())
    /// # }
    /// ```
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

async fn latest_date_on(
    conn: &mut AsyncPgConnection,
    key: &SeriesKey,
) -> Result<Option<NaiveDate>, SeriesStoreError> {
    series_points::table
        .filter(series_points::series_key.eq(key.as_str()))
        .select(max(series_points::point_date))
        .get_result::<Option<NaiveDate>>(conn)
        .await
        .map_err(map_diesel_error)
}

fn row_to_point(row: SeriesPointRow) -> Result<SeriesPoint, SeriesStoreError> {
    let key = SeriesKey::new(row.series_key).map_err(|err| {
        SeriesStoreError::query(format!("stored series key is invalid: {err}"))
    })?;
    Ok(SeriesPoint {
        key,
        date: row.point_date,
        price: row.price,
    })
}

/// Transaction handle passed to commit work.
struct DieselSeriesTransaction<'c> {
    conn: &'c mut AsyncPgConnection,
}

#[async_trait]
impl SeriesTransaction for DieselSeriesTransaction<'_> {
    async fn delete_series(&mut self, key: &SeriesKey) -> Result<u64, SeriesStoreError> {
        let conn = &mut *self.conn;
        let deleted = diesel::delete(
            series_points::table.filter(series_points::series_key.eq(key.as_str())),
        )
        .execute(conn)
        .await?;
        debug!(key = %key, deleted, "purged series rows");
        Ok(u64::try_from(deleted).unwrap_or(u64::MAX))
    }

    async fn latest_date(&mut self, key: &SeriesKey) -> Result<Option<NaiveDate>, SeriesStoreError> {
        latest_date_on(&mut *self.conn, key).await
    }

    async fn insert_missing(
        &mut self,
        key: &SeriesKey,
        points: &[PricePoint],
    ) -> Result<u64, SeriesStoreError> {
        let mut inserted = 0_u64;
        for chunk in points.chunks(INSERT_CHUNK_ROWS) {
            let rows: Vec<NewSeriesPointRow<'_>> = chunk
                .iter()
                .map(|point| NewSeriesPointRow {
                    series_key: key.as_str(),
                    point_date: point.date,
                    price: point.price,
                })
                .collect();
            let count = diesel::insert_into(series_points::table)
                .values(&rows)
                .on_conflict((series_points::series_key, series_points::point_date))
                .do_nothing()
                .execute(&mut *self.conn)
                .await?;
            inserted = inserted.saturating_add(u64::try_from(count).unwrap_or(u64::MAX));
        }
        debug!(key = %key, offered = points.len(), inserted, "inserted series rows");
        Ok(inserted)
    }
}

#[async_trait]
impl SeriesStore for DieselSeriesStore {
    async fn latest_date(&self, key: &SeriesKey) -> Result<Option<NaiveDate>, SeriesStoreError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        latest_date_on(&mut conn, key).await
    }

    async fn load_range(
        &self,
        key: &SeriesKey,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<SeriesPoint>, SeriesStoreError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let rows: Vec<SeriesPointRow> = series_points::table
            .filter(series_points::series_key.eq(key.as_str()))
            .filter(series_points::point_date.between(from, to))
            .order_by(series_points::point_date.asc())
            .select(SeriesPointRow::as_select())
            .load(&mut conn)
            .await
            .map_err(map_diesel_error)?;

        rows.into_iter().map(row_to_point).collect()
    }

    async fn transaction(
        &self,
        work: &dyn SeriesTransactionWork,
    ) -> Result<SeriesCommitReport, SeriesStoreError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;

        conn.build_transaction()
            .serializable()
            .run(|conn| {
                async move {
                    let mut tx = DieselSeriesTransaction { conn };
                    work.run(&mut tx).await
                }
                .scope_boxed()
            })
            .await
    }
}
