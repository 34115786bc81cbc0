//! Shared Diesel error mapping for the series store adapter.
//!
//! Transaction-level conflicts (serialisation failures, deadlocks, and unique
//! violations that escape `ON CONFLICT DO NOTHING`) map to
//! [`SeriesStoreError::Conflict`] so the commit engine retries them. Lost
//! connections map to [`SeriesStoreError::Connection`]; everything else is a
//! query failure.

use diesel::result::{DatabaseErrorKind, Error as DieselError};
use tracing::debug;

use crate::domain::ports::SeriesStoreError;

use super::pool::PoolError;

const DEADLOCK_MESSAGE: &str = "deadlock detected";

/// Map pool errors to store connection errors.
pub fn map_pool_error(error: PoolError) -> SeriesStoreError {
    SeriesStoreError::connection(error.into_message())
}

/// Classify a Diesel error into a store error.
pub fn map_diesel_error(error: DieselError) -> SeriesStoreError {
    match &error {
        DieselError::DatabaseError(kind, info) => {
            debug!(?kind, message = info.message(), "diesel operation failed");
        }
        _ => debug!(
            error_type = %std::any::type_name_of_val(&error),
            "diesel operation failed"
        ),
    }

    match error {
        DieselError::DatabaseError(
            DatabaseErrorKind::SerializationFailure | DatabaseErrorKind::UniqueViolation,
            info,
        ) => SeriesStoreError::conflict(info.message().to_owned()),
        DieselError::DatabaseError(DatabaseErrorKind::ClosedConnection, info) => {
            SeriesStoreError::connection(info.message().to_owned())
        }
        DieselError::DatabaseError(_, info) if info.message().contains(DEADLOCK_MESSAGE) => {
            SeriesStoreError::conflict(info.message().to_owned())
        }
        DieselError::DatabaseError(_, info) => SeriesStoreError::query(info.message().to_owned()),
        DieselError::BrokenTransactionManager => {
            SeriesStoreError::connection("transaction manager is broken")
        }
        other => SeriesStoreError::query(other.to_string()),
    }
}

impl From<DieselError> for SeriesStoreError {
    fn from(error: DieselError) -> Self {
        map_diesel_error(error)
    }
}
