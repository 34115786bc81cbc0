//! Batch validation against the resolved watermark.
//!
//! Only the first date of a batch is inspected here. The commit engine
//! separately truncates whatever it writes to a contiguous run, so a batch
//! with holes past its first date can still be accepted.

use chrono::NaiveDate;

use super::{FetchedBatch, PricePoint, Watermark, next_day};

/// How a batch's first date relates to the stored watermark.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchRelation {
    /// The batch starts on or before the latest stored date.
    Overlap,
    /// The batch starts after the day following the latest stored date.
    Gap,
}

/// Why a batch was not accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionReason {
    /// The batch does not start on the day after the watermark.
    GapOrOverlap {
        /// Latest stored date.
        watermark: NaiveDate,
        /// First date of the rejected batch.
        first_date: NaiveDate,
        /// Observed relation between the two.
        relation: BatchRelation,
    },
    /// The batch carried no points.
    EmptyBatch,
}

impl RejectionReason {
    /// Stable label for logs and metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            Self::GapOrOverlap {
                relation: BatchRelation::Overlap,
                ..
            } => "overlap",
            Self::GapOrOverlap {
                relation: BatchRelation::Gap,
                ..
            } => "gap",
            Self::EmptyBatch => "empty_batch",
        }
    }
}

/// Result of validating a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchValidation {
    /// The batch extends the series and may be committed.
    Accepted,
    /// The batch must not be written.
    Rejected(RejectionReason),
}

impl BatchValidation {
    /// Whether the batch was accepted.
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted)
    }
}

/// Check that `batch` starts exactly one day after `watermark`.
///
/// An absent watermark accepts any non-empty batch.
///
/// # Examples
/// ```
/// use chrono::NaiveDate;
/// use price_series::domain::{
///     BatchValidation, FetchedBatch, PricePoint, Watermark, validate_batch,
/// };
/// use rust_decimal::Decimal;
///
/// let day = |d| NaiveDate::from_ymd_opt(2023, 6, d).expect("valid date");
/// let batch = FetchedBatch::from_points(vec![PricePoint::new(day(22), Decimal::ONE)]);
///
/// assert_eq!(validate_batch(Watermark::At(day(21)), &batch), BatchValidation::Accepted);
/// assert!(!validate_batch(Watermark::At(day(20)), &batch).is_accepted());
/// ```
pub fn validate_batch(watermark: Watermark, batch: &FetchedBatch) -> BatchValidation {
    let Some(first_date) = batch.first_date() else {
        return BatchValidation::Rejected(RejectionReason::EmptyBatch);
    };
    let Some(latest) = watermark.latest() else {
        return BatchValidation::Accepted;
    };

    match next_day(latest) {
        Some(expected) if first_date == expected => BatchValidation::Accepted,
        _ => BatchValidation::Rejected(RejectionReason::GapOrOverlap {
            watermark: latest,
            first_date,
            relation: if first_date <= latest {
                BatchRelation::Overlap
            } else {
                BatchRelation::Gap
            },
        }),
    }
}

/// Longest run of consecutive days in `points` beginning at `start`.
///
/// `points` must be ascending with one point per day. Returns an empty slice
/// when `start` is not present.
pub fn contiguous_prefix(points: &[PricePoint], start: NaiveDate) -> &[PricePoint] {
    let Ok(begin) = points.binary_search_by_key(&start, |point| point.date) else {
        return &[];
    };

    let run = points.get(begin..).unwrap_or_default();
    let len = 1 + run
        .windows(2)
        .take_while(|pair| matches!(pair, [prev, next] if next_day(prev.date) == Some(next.date)))
        .count();
    run.get(..len).unwrap_or(run)
}
