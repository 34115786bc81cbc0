//! Inbound adapters that translate external deliveries into domain service
//! calls while keeping transport details at the edge.
//!
//! Queue deliveries live under [`queue`]; the binaries feed it from stdin or
//! from command-line flags.

pub mod queue;
