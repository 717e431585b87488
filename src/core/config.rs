//! Engine configuration.
//!
//! Parameters shared by every market: the auction ratio curve, the pool's
//! rate model and insurance cut, and how many events the ledger retains.
//! Market thresholds live in [`MarketConfig`](crate::core::market::MarketConfig).

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::liquidation::auction::{RampShape, RatioRamp};
use crate::pool::rate_model::RateModel;
use crate::utils::constants::*;
use crate::utils::validation::validate_unit_ratio;

/// Environment variable overriding the auction floor ratio
pub const ENV_AUCTION_FLOOR: &str = "HYDRA_AUCTION_FLOOR";
/// Environment variable overriding the auction step length
pub const ENV_AUCTION_STEP_SECS: &str = "HYDRA_AUCTION_STEP_SECS";
/// Environment variable overriding the pool insurance ratio
pub const ENV_INSURANCE_RATIO: &str = "HYDRA_INSURANCE_RATIO";

/// Engine-wide configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Auction sale ratio curve
    pub auction: RatioRamp,
    /// Borrow rate model of the pool
    pub rate_model: RateModel,
    /// Share of interest reserved for bad debt
    pub insurance_ratio: Decimal,
    /// Events kept by the ledger
    pub max_events: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            auction: RatioRamp::default(),
            rate_model: RateModel::default(),
            insurance_ratio: DEFAULT_INSURANCE_RATIO,
            max_events: DEFAULT_MAX_EVENTS,
        }
    }
}

impl EngineConfig {
    /// Override the auction curve
    pub fn with_auction(mut self, auction: RatioRamp) -> Self {
        self.auction = auction;
        self
    }

    /// Override the rate model
    pub fn with_rate_model(mut self, rate_model: RateModel) -> Self {
        self.rate_model = rate_model;
        self
    }

    /// Override the insurance ratio
    pub fn with_insurance_ratio(mut self, insurance_ratio: Decimal) -> Self {
        self.insurance_ratio = insurance_ratio;
        self
    }

    /// Load from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| Error::Config(format!("{}: {}", path.as_ref().display(), e)))?;

        let config: Self = serde_json::from_str(&content).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save as pretty JSON
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = serde_json::to_string_pretty(self).map_err(|e| Error::Serialization(e.to_string()))?;

        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).map_err(|e| Error::Config(e.to_string()))?;
        }

        std::fs::write(path.as_ref(), content).map_err(|e| Error::Config(e.to_string()))
    }

    /// Defaults overridden by `HYDRA_*` environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Defaults overridden by whatever `lookup` returns; unparsable values are logged and ignored
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(floor) = parse_override::<Decimal, _>(&lookup, ENV_AUCTION_FLOOR) {
            config.auction.floor = floor;
        }

        if let Some(secs) = parse_override::<u64, _>(&lookup, ENV_AUCTION_STEP_SECS) {
            config.auction.shape = match config.auction.shape {
                RampShape::Stepped { increment, .. } => RampShape::Stepped {
                    step_secs: secs,
                    increment,
                },
                RampShape::Linear { .. } => RampShape::Linear { duration_secs: secs },
            };
        }

        if let Some(ratio) = parse_override::<Decimal, _>(&lookup, ENV_INSURANCE_RATIO) {
            config.insurance_ratio = ratio;
        }

        config
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        self.auction.validate()?;

        if !self.rate_model.check_model() {
            return Err(Error::Config("rate model coefficients must be non-negative".into()));
        }

        validate_unit_ratio(self.insurance_ratio, "insurance_ratio")?;

        if self.max_events == 0 {
            return Err(Error::Config("max_events must be greater than 0".into()));
        }

        Ok(())
    }
}

fn parse_override<T, F>(lookup: &F, var: &str) -> Option<T>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(var)?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(var, value = %raw, "ignoring unparsable configuration override");
            None
        }
    }
}
