//! Price source outbound adapters.
//!
//! This module provides a thin HTTP implementation of the `PriceSource` port.

mod dto;
mod http_source;

pub use http_source::HttpPriceSource;
