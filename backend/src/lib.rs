//! Daily price series ingestion.
//!
//! Extends per-key daily price series from an upstream price service while
//! keeping every stored series gap-free under concurrent, duplicate job
//! delivery.
#![cfg_attr(not(any(test, doctest)), deny(clippy::unwrap_used))]
#![cfg_attr(not(any(test, doctest)), deny(clippy::expect_used))]

pub mod config;
pub mod domain;
pub mod inbound;
pub mod outbound;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
