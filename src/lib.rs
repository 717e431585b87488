//! # Hydra Margin
//!
//! Liquidation and collateral-auction engine for an oracle-priced margin
//! lending market. Users deposit collateral into per-market accounts,
//! borrow from a shared interest-bearing pool, and get liquidated when the
//! value of their balances falls below the market's threshold.
//!
//! ## Architecture
//!
//! - **Core**: Assets, markets, collateral accounts and engine configuration
//! - **Oracle**: Price oracle interface and an in-memory feed
//! - **Pool**: Supplier liquidity with index-based interest accrual
//! - **Liquidation**: Valuation, liquidation controller and Dutch-style auctions
//! - **Protocol**: The atomic ledger and its events
//!
//! ## Liquidation flow
//!
//! An account is liquidable while `balances × 100 < debts × liquidate_rate`.
//! Liquidation locks the account, repays what it can from the account's own
//! balances and, if debt remains, auctions the seized collateral at a ratio
//! that rises from 1% of oracle value towards full value over time.
//!
//! ## Example
//!
//! ```rust,ignore
//! use hydra_margin::prelude::*;
//!
//! let mut ledger = Ledger::new(EngineConfig::default(), feed)?;
//! ledger.create_asset(Asset::new(AssetId(1), "ETH"), now)?;
//! ledger.create_asset(Asset::new(AssetId(2), "USD"), now)?;
//! let market = ledger.create_market(MarketConfig::new(vec![AssetId(1), AssetId(2)]))?;
//!
//! let outcome = ledger.liquidate_account(user, market, now)?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    trivial_casts,
    unused_lifetimes,
    unused_qualifications
)]

pub mod core;
pub mod error;
pub mod liquidation;
pub mod oracle;
pub mod pool;
pub mod protocol;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::core::{
        account::{AccountKey, AccountStatus, BalancePath, Balances, CollateralAccount},
        asset::{Asset, AssetId},
        config::EngineConfig,
        market::{Market, MarketConfig, MarketId},
    };
    pub use crate::error::{Error, Result};
    pub use crate::liquidation::{
        auction::{Auction, AuctionId, AuctionState, RampShape, RatioRamp},
        engine::{FillOutcome, LiquidationEngine, LiquidationOutcome},
        valuation::Valuation,
    };
    pub use crate::oracle::price_feed::{PriceFeed, PriceOracle};
    pub use crate::pool::{LendingPool, RateModel};
    pub use crate::protocol::{
        events::{EventLog, LedgerEvent},
        ledger::{AccountDetails, AuctionDetails, Ledger},
    };
    pub use crate::utils::address::Address;
}

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
