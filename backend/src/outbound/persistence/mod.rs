//! PostgreSQL persistence adapters using Diesel ORM.
//!
//! Provides the series store port over PostgreSQL via `diesel-async` with
//! `bb8` connection pooling.
//!
//! - **Thin adapter**: the commit protocol lives in the domain; this layer
//!   supplies the transaction scope and primitive reads and writes.
//! - **Internal models**: Diesel row structs (`models.rs`) and schema
//!   definitions (`schema.rs`) never leave this module.
//! - **Strongly typed errors**: Diesel failures are classified into
//!   `SeriesStoreError` variants, with write conflicts kept distinct.
//!
//! # Example
//!
//! ```ignore
//! use price_series::outbound::persistence::{DbPool, DieselSeriesStore, PoolConfig};
//!
//! let pool = DbPool::new(PoolConfig::new("postgres://localhost/prices")).await?;
//! let store = DieselSeriesStore::new(pool);
//! ```

pub(crate) mod diesel_helpers;
mod diesel_series_store;
mod migrations;
mod models;
mod pool;
mod schema;

pub use diesel_series_store::DieselSeriesStore;
pub use migrations::{MIGRATIONS, MigrationError, apply_blocking, run_pending_migrations};
pub use pool::{DbPool, PoolConfig, PoolError};
