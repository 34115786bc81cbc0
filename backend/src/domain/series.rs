//! Series primitives: keys, points, watermarks, fetched batches, and jobs.
//!
//! Dates are UTC calendar days. Prices are decimals and are never mutated in
//! place once stored; a refresh replaces rows instead.

use std::fmt;

use chrono::{Days, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const MAX_SERIES_KEY_LEN: usize = 128;

/// Identifier of one independent daily price series (for example a token
/// address).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct SeriesKey(String);

impl SeriesKey {
    /// Construct a key after validating that it is non-empty, trimmed, and
    /// bounded in length.
    ///
    /// # Examples
    /// ```
    /// use price_series::domain::SeriesKey;
    ///
    /// let key = SeriesKey::new("0xabc").expect("valid key");
    /// assert_eq!(key.as_str(), "0xabc");
    /// assert!(SeriesKey::new(" 0xabc").is_err());
    /// ```
    pub fn new(value: impl Into<String>) -> Result<Self, SeriesKeyValidationError> {
        let raw = value.into();
        if raw.trim().is_empty() {
            return Err(SeriesKeyValidationError::Empty);
        }
        if raw.trim() != raw {
            return Err(SeriesKeyValidationError::ContainsWhitespace);
        }
        if raw.len() > MAX_SERIES_KEY_LEN {
            return Err(SeriesKeyValidationError::TooLong {
                max: MAX_SERIES_KEY_LEN,
            });
        }
        Ok(Self(raw))
    }

    /// Borrow the underlying key as a string slice.
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for SeriesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl AsRef<str> for SeriesKey {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl<'de> Deserialize<'de> for SeriesKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Self::new(raw).map_err(serde::de::Error::custom)
    }
}

/// Validation errors returned when constructing [`SeriesKey`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SeriesKeyValidationError {
    /// Key is empty after trimming whitespace.
    #[error("series key must not be empty")]
    Empty,
    /// Key contains leading or trailing whitespace.
    #[error("series key must not contain surrounding whitespace")]
    ContainsWhitespace,
    /// Key exceeds the storable length.
    #[error("series key must be at most {max} bytes")]
    TooLong { max: usize },
}

/// One daily observation returned by a price source or stored for a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricePoint {
    /// UTC calendar day of the observation.
    pub date: NaiveDate,
    /// Observed price.
    pub price: Decimal,
}

impl PricePoint {
    /// Build a point from a day and a price.
    pub fn new(date: NaiveDate, price: Decimal) -> Self {
        Self { date, price }
    }
}

/// One stored row of a series.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeriesPoint {
    /// Series the row belongs to.
    pub key: SeriesKey,
    /// UTC calendar day of the row.
    pub date: NaiveDate,
    /// Stored price.
    pub price: Decimal,
}

/// Latest stored date for a key, derived on every read and never cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Watermark {
    /// The key has no stored rows.
    Absent,
    /// The latest stored day.
    At(NaiveDate),
}

impl Watermark {
    /// Build a watermark from an optional latest date.
    pub fn from_latest(latest: Option<NaiveDate>) -> Self {
        latest.map_or(Self::Absent, Self::At)
    }

    /// The latest stored date, when present.
    pub fn latest(self) -> Option<NaiveDate> {
        match self {
            Self::Absent => None,
            Self::At(date) => Some(date),
        }
    }

    /// The only date a batch may start at to extend the series, or `None`
    /// when the series is absent and any start is acceptable.
    pub fn next_date(self) -> Option<NaiveDate> {
        self.latest().and_then(next_day)
    }
}

/// Return the calendar day after `date`, or `None` at the end of the
/// representable range.
pub fn next_day(date: NaiveDate) -> Option<NaiveDate> {
    date.checked_add_days(Days::new(1))
}

/// Ascending, one-point-per-day batch fetched for one job.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FetchedBatch {
    points: Vec<PricePoint>,
}

impl FetchedBatch {
    /// Normalise raw source points into ascending order with one point per
    /// day. When a day repeats, the last observation wins.
    ///
    /// # Examples
    /// ```
    /// use chrono::NaiveDate;
    /// use price_series::domain::{FetchedBatch, PricePoint};
    /// use rust_decimal::Decimal;
    ///
    /// let day = |d| NaiveDate::from_ymd_opt(2023, 6, d).expect("valid date");
    /// let batch = FetchedBatch::from_points(vec![
    ///     PricePoint::new(day(23), Decimal::new(2, 0)),
    ///     PricePoint::new(day(22), Decimal::new(1, 0)),
    ///     PricePoint::new(day(23), Decimal::new(3, 0)),
    /// ]);
    /// assert_eq!(batch.len(), 2);
    /// assert_eq!(batch.first_date(), Some(day(22)));
    /// assert_eq!(batch.points()[1].price, Decimal::new(3, 0));
    /// ```
    pub fn from_points(mut points: Vec<PricePoint>) -> Self {
        // Stable sort keeps source order within a day so the later
        // observation is retained by the reverse dedup below.
        points.sort_by_key(|point| point.date);
        points.reverse();
        points.dedup_by_key(|point| point.date);
        points.reverse();
        Self { points }
    }

    /// Borrow the normalised points.
    pub fn points(&self) -> &[PricePoint] {
        &self.points
    }

    /// Date of the first point, if any.
    pub fn first_date(&self) -> Option<NaiveDate> {
        self.points.first().map(|point| point.date)
    }

    /// Date of the last point, if any.
    pub fn last_date(&self) -> Option<NaiveDate> {
        self.points.last().map(|point| point.date)
    }

    /// Number of points in the batch.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether the batch carries no points.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Unit of work delivered by the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestionJob {
    /// Series to extend or reload.
    pub key: SeriesKey,
    /// Purge every stored row for the key before loading the batch.
    pub force_refresh: bool,
    /// Date requested from the price source.
    pub requested_start: NaiveDate,
}
