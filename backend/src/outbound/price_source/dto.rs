//! DTOs for decoding price quote responses.
//!
//! The adapter decodes into these transport DTOs first, then maps into domain
//! points in one pass. Timestamps are unix seconds and are truncated to their
//! UTC calendar day.

use chrono::DateTime;
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::domain::PricePoint;

#[derive(Debug, Deserialize)]
pub(super) struct PriceResponseDto {
    #[serde(default)]
    pub(super) prices: Vec<PriceQuoteDto>,
}

#[derive(Debug, Deserialize)]
pub(super) struct PriceQuoteDto {
    pub(super) timestamp: i64,
    pub(super) price: Decimal,
}

impl PriceResponseDto {
    pub(super) fn into_domain_points(self) -> Result<Vec<PricePoint>, String> {
        self.prices
            .into_iter()
            .map(PriceQuoteDto::into_domain_point)
            .collect()
    }
}

impl PriceQuoteDto {
    fn into_domain_point(self) -> Result<PricePoint, String> {
        let instant = DateTime::from_timestamp(self.timestamp, 0)
            .ok_or_else(|| format!("timestamp {} is out of range", self.timestamp))?;
        if self.price.is_sign_negative() {
            return Err(format!(
                "price at timestamp {} is negative: {}",
                self.timestamp, self.price
            ));
        }
        Ok(PricePoint::new(instant.date_naive(), self.price))
    }
}
