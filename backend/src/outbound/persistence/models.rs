//! Internal Diesel row structs for database operations.
//!
//! These types are implementation details of the persistence layer and must
//! never be exposed to the domain. They exist solely to satisfy Diesel's
//! type requirements for queries and mutations.

use chrono::NaiveDate;
use diesel::prelude::*;
use rust_decimal::Decimal;

use super::schema::series_points;

/// Row struct for reading from the `series_points` table.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = series_points)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct SeriesPointRow {
    pub series_key: String,
    pub point_date: NaiveDate,
    pub price: Decimal,
}

/// Insertable struct for new price points.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = series_points)]
pub(crate) struct NewSeriesPointRow<'a> {
    pub series_key: &'a str,
    pub point_date: NaiveDate,
    pub price: Decimal,
}
