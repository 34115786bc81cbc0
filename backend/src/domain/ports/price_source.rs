//! Driven port for fetching daily price quotes from an upstream service.
//!
//! The domain owns the request shape and the error taxonomy so the ingestion
//! handler stays adapter-agnostic. Adapters normalise timestamps to UTC days
//! but must not assume the upstream anchors its response at the requested
//! start.

use async_trait::async_trait;
use chrono::NaiveDate;

use super::define_port_error;
use crate::domain::{PricePoint, SeriesKey};

/// Sampling granularity requested from the price source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Granularity {
    /// One point per UTC calendar day.
    #[default]
    Daily,
}

impl Granularity {
    /// Wire label understood by price source adapters.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Daily => "daily",
        }
    }
}

/// Domain-owned fetch request passed to price source adapters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceSourceRequest {
    /// Series to fetch.
    pub key: SeriesKey,
    /// Earliest day of interest.
    pub start: NaiveDate,
    /// Sampling granularity.
    pub granularity: Granularity,
}

impl PriceSourceRequest {
    /// Build a daily request for `key` starting at `start`.
    pub fn daily(key: SeriesKey, start: NaiveDate) -> Self {
        Self {
            key,
            start,
            granularity: Granularity::Daily,
        }
    }
}

define_port_error! {
    /// Errors surfaced while calling the price source.
    pub enum PriceSourceError {
        /// Network transport failed before receiving a response.
        Transport { message: String } =>
            "price source transport failed: {message}",
        /// The call exceeded its timeout.
        Timeout { message: String } =>
            "price source timeout: {message}",
        /// The upstream rate-limited the request.
        RateLimited { message: String } =>
            "price source rate limited request: {message}",
        /// The response could not be decoded.
        Decode { message: String } =>
            "price source response decode failed: {message}",
        /// The upstream rejected the request as invalid.
        InvalidRequest { message: String } =>
            "price source request invalid: {message}",
    }
}

impl PriceSourceError {
    /// Return whether a later redelivery of the job is expected to help.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Transport { .. } | Self::Timeout { .. } | Self::RateLimited { .. }
        )
    }
}

/// Port for fetching daily prices for one series.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Fetch points for `request.key` at or after `request.start`.
    ///
    /// # Examples
    ///
    /// ```rust,ignore
    /// use chrono::NaiveDate;
    /// use price_series::domain::SeriesKey;
    /// use price_series::domain::ports::{PriceSource, PriceSourceRequest};
    ///
    /// async fn newest_day(source: &dyn PriceSource) -> Option<NaiveDate> {
    ///     let request = PriceSourceRequest::daily(
    ///         SeriesKey::new("0xabc").ok()?,
    ///         NaiveDate::from_ymd_opt(2023, 6, 22)?,
    ///     );
    ///     let points = source.fetch_prices(&request).await.ok()?;
    ///     points.iter().map(|point| point.date).max()
    /// }
    /// ```
    async fn fetch_prices(
        &self,
        request: &PriceSourceRequest,
    ) -> Result<Vec<PricePoint>, PriceSourceError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::transport(PriceSourceError::transport("reset"), true)]
    #[case::timeout(PriceSourceError::timeout("slow"), true)]
    #[case::rate_limited(PriceSourceError::rate_limited("429"), true)]
    #[case::decode(PriceSourceError::decode("bad json"), false)]
    #[case::invalid(PriceSourceError::invalid_request("unknown key"), false)]
    fn retryable_classification(#[case] error: PriceSourceError, #[case] expected: bool) {
        assert_eq!(error.is_retryable(), expected);
    }

    #[rstest]
    fn daily_request_uses_daily_granularity() {
        let request = PriceSourceRequest::daily(
            SeriesKey::new("0xabc").expect("valid key"),
            NaiveDate::from_ymd_opt(2023, 6, 22).expect("valid date"),
        );
        assert_eq!(request.granularity.as_str(), "daily");
    }

    #[rstest]
    #[tokio::test]
    async fn mock_source_sees_the_requested_start() {
        let start = NaiveDate::from_ymd_opt(2023, 6, 22).expect("valid date");
        let mut source = MockPriceSource::new();
        source
            .expect_fetch_prices()
            .withf(move |request| request.start == start && request.key.as_str() == "0xabc")
            .times(1)
            .returning(|_| Err(PriceSourceError::rate_limited("slow down")));

        let request = PriceSourceRequest::daily(SeriesKey::new("0xabc").expect("valid key"), start);
        let error = source.fetch_prices(&request).await.expect_err("scripted failure");
        assert!(error.is_retryable());
    }
}
