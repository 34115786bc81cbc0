//! Diesel table definitions for the PostgreSQL schema.
//!
//! These definitions must match the database migrations exactly. They are used
//! by Diesel for compile-time query validation and type-safe SQL generation.
//!
//! # Maintenance
//!
//! When migrations change the schema, this file should be regenerated or
//! manually updated to reflect those changes. The `diesel print-schema`
//! command can generate these definitions from a live database.

diesel::table! {
    /// Daily price points, one row per series and day.
    ///
    /// `(series_key, point_date)` is unique; rows are inserted or purged but
    /// never updated.
    series_points (id) {
        /// Surrogate primary key.
        id -> Int8,
        /// Series identifier (for example a token address).
        series_key -> Text,
        /// UTC calendar day of the observation.
        point_date -> Date,
        /// Observed price.
        price -> Numeric,
    }
}
