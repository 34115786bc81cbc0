//! Test utilities for the price series crate.
//!
//! This module provides shared helpers for both unit tests (in `src/`) and
//! integration tests (in `tests/`). It is compiled for tests and behind the
//! `test-support` feature.

pub mod price_source;
pub mod series_commit;
pub mod series_store;

pub use price_source::ScriptedPriceSource;
pub use series_commit::{ImmediateSleeper, MutableClock, NoJitter, RecordingSleeper};
pub use series_store::{InMemorySeriesStore, StoreFault};
