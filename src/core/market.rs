//! Market configuration.
//!
//! A market groups the assets that can be deposited and borrowed together
//! and fixes the collateralization thresholds for its accounts. Markets are
//! created once and read-only afterwards.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::core::asset::AssetId;
use crate::error::{Error, Result};
use crate::utils::constants::{DEFAULT_LIQUIDATE_RATE, DEFAULT_WITHDRAW_RATE};
use crate::utils::validation::validate_market_rates;

/// Market identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MarketId(pub u16);

impl fmt::Display for MarketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "market#{}", self.0)
    }
}

/// Parameters supplied when creating a market
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketConfig {
    /// Collateral/debt percentage below which an account is liquidable
    pub liquidate_rate: Decimal,
    /// Stricter percentage guarding borrows and withdrawals
    pub withdraw_rate: Decimal,
    /// Listed assets
    pub assets: Vec<AssetId>,
}

impl MarketConfig {
    /// Market over `assets` with the default 120% / 200% thresholds
    pub fn new(assets: Vec<AssetId>) -> Self {
        Self {
            liquidate_rate: Decimal::from(DEFAULT_LIQUIDATE_RATE),
            withdraw_rate: Decimal::from(DEFAULT_WITHDRAW_RATE),
            assets,
        }
    }

    /// Override thresholds
    pub fn with_rates(mut self, liquidate_rate: u64, withdraw_rate: u64) -> Self {
        self.liquidate_rate = Decimal::from(liquidate_rate);
        self.withdraw_rate = Decimal::from(withdraw_rate);
        self
    }
}

/// A created market
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Market {
    /// Identifier
    pub id: MarketId,
    /// Liquidation threshold in percent
    pub liquidate_rate: Decimal,
    /// Borrow / withdrawal threshold in percent
    pub withdraw_rate: Decimal,
    /// Listed assets, ascending by id
    assets: Vec<AssetId>,
}

impl Market {
    /// Build a market from its configuration
    pub fn from_config(id: MarketId, config: MarketConfig) -> Result<Self> {
        validate_market_rates(config.liquidate_rate, config.withdraw_rate)?;

        let mut assets = config.assets;
        assets.sort();
        let listed = assets.len();
        assets.dedup();
        if assets.len() != listed {
            return Err(Error::InvalidParameter {
                name: "assets".into(),
                reason: "duplicate asset in market".into(),
            });
        }
        if assets.len() < 2 {
            return Err(Error::InvalidParameter {
                name: "assets".into(),
                reason: "a market needs at least two assets".into(),
            });
        }

        Ok(Self {
            id,
            liquidate_rate: config.liquidate_rate,
            withdraw_rate: config.withdraw_rate,
            assets,
        })
    }

    /// Listed assets in ascending id order
    pub fn assets(&self) -> &[AssetId] {
        &self.assets
    }

    /// Whether the asset is listed
    pub fn contains(&self, asset: AssetId) -> bool {
        self.assets.binary_search(&asset).is_ok()
    }

    /// Fail unless the asset is listed
    pub fn ensure_listed(&self, asset: AssetId) -> Result<()> {
        if !self.contains(asset) {
            return Err(Error::AssetNotInMarket {
                asset: asset.0,
                market: self.id.0,
            });
        }
        Ok(())
    }
}
