//! Oracle module for price feeds.
//!
//! The engine only depends on the [`PriceOracle`] trait; [`PriceFeed`] is
//! the in-memory implementation used by tests and simulations.

pub mod price_feed;

pub use price_feed::*;
