//! Assets listed by the engine.
//!
//! An asset is immutable after creation; its price is owned by the oracle.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};
use crate::utils::constants::{DEFAULT_ASSET_DECIMALS, MAX_ASSET_DECIMALS};

/// Asset identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AssetId(pub u16);

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "asset#{}", self.0)
    }
}

/// A listed asset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    /// Identifier
    pub id: AssetId,
    /// Ticker symbol
    pub symbol: String,
    /// Decimal precision of balances
    pub decimals: u32,
    /// Collateral weight in basis points (15000 = 1.5x)
    pub collateral_rate: u64,
}

impl Asset {
    /// Create an asset with the default 18 decimals
    pub fn new(id: AssetId, symbol: impl Into<String>) -> Self {
        Self {
            id,
            symbol: symbol.into(),
            decimals: DEFAULT_ASSET_DECIMALS,
            collateral_rate: 15_000,
        }
    }

    /// Override decimal precision
    pub fn with_decimals(mut self, decimals: u32) -> Result<Self> {
        if decimals > MAX_ASSET_DECIMALS {
            return Err(Error::InvalidParameter {
                name: "decimals".into(),
                reason: format!("{} exceeds maximum {}", decimals, MAX_ASSET_DECIMALS),
            });
        }
        self.decimals = decimals;
        Ok(self)
    }

    /// Override collateral weight
    pub fn with_collateral_rate(mut self, collateral_rate: u64) -> Result<Self> {
        if collateral_rate == 0 {
            return Err(Error::InvalidParameter {
                name: "collateral_rate".into(),
                reason: "must be greater than 0".into(),
            });
        }
        self.collateral_rate = collateral_rate;
        Ok(self)
    }
}
