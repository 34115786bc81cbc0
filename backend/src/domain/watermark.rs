//! Watermark resolution for one series key.
//!
//! The watermark is derived from the store on every call. Callers use it
//! within a single attempt and never cache it.

use std::sync::Arc;

use tracing::debug;

use super::{SeriesKey, Watermark};
use super::ports::{SeriesStore, SeriesStoreError, SeriesTransaction};

/// Reads the latest stored date for a key.
#[derive(Clone)]
pub struct WatermarkResolver {
    store: Arc<dyn SeriesStore>,
}

impl WatermarkResolver {
    /// Build a resolver over an explicit store handle.
    pub fn new(store: Arc<dyn SeriesStore>) -> Self {
        Self { store }
    }

    /// Resolve the current watermark for `key` outside a write transaction.
    ///
    /// # Examples
    ///
    /// ```rust,ignore
    /// let watermark = resolver.resolve(&key).await?;
    /// assert_eq!(watermark, Watermark::Absent);
    /// ```
    pub async fn resolve(&self, key: &SeriesKey) -> Result<Watermark, SeriesStoreError> {
        let latest = self.store.latest_date(key).await?;
        debug!(key = %key, latest = ?latest, "resolved series watermark");
        Ok(Watermark::from_latest(latest))
    }

    /// Resolve the watermark as seen by an open transaction.
    pub async fn resolve_in(
        tx: &mut dyn SeriesTransaction,
        key: &SeriesKey,
    ) -> Result<Watermark, SeriesStoreError> {
        tx.latest_date(key).await.map(Watermark::from_latest)
    }
}
