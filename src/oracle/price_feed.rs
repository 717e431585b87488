//! Price feed implementation.
//!
//! The engine reads USD prices through the [`PriceOracle`] trait. The
//! in-memory [`PriceFeed`] keeps the latest price per asset; staleness
//! handling belongs to whatever feeds it.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::core::asset::AssetId;
use crate::error::{Error, Result};
use crate::utils::validation::validate_price;

// ═══════════════════════════════════════════════════════════════════════════════
// ORACLE INTERFACE
// ═══════════════════════════════════════════════════════════════════════════════

/// Source of USD prices per asset unit
pub trait PriceOracle {
    /// Current USD price of one unit of `asset`
    fn price(&self, asset: AssetId) -> Result<Decimal>;
}

impl<T: PriceOracle + ?Sized> PriceOracle for &T {
    fn price(&self, asset: AssetId) -> Result<Decimal> {
        (**self).price(asset)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// PRICE DATA
// ═══════════════════════════════════════════════════════════════════════════════

/// A single price data point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceData {
    /// USD per asset unit
    pub price: Decimal,
    /// Timestamp of the update
    pub timestamp: u64,
}

// ═══════════════════════════════════════════════════════════════════════════════
// PRICE FEED
// ═══════════════════════════════════════════════════════════════════════════════

/// Latest price per asset
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PriceFeed {
    prices: BTreeMap<AssetId, PriceData>,
}

impl PriceFeed {
    /// Create an empty feed
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a price
    pub fn set_price(&mut self, asset: AssetId, price: Decimal, now: u64) -> Result<()> {
        validate_price(price)?;
        tracing::debug!(%asset, %price, "price updated");
        self.prices.insert(asset, PriceData { price, timestamp: now });
        Ok(())
    }

    /// Latest data point for an asset
    pub fn get(&self, asset: AssetId) -> Option<&PriceData> {
        self.prices.get(&asset)
    }
}

impl PriceOracle for PriceFeed {
    fn price(&self, asset: AssetId) -> Result<Decimal> {
        self.prices
            .get(&asset)
            .map(|data| data.price)
            .ok_or(Error::PriceUnavailable(asset.0))
    }
}
