//! Liquidation module.
//!
//! This module handles unsafe collateral accounts:
//! - Valuation of balances and debts against oracle prices
//! - Liquidation controller with forced repayment
//! - Descending-discount auctions for leftover debt

pub mod auction;
pub mod engine;
pub mod valuation;

pub use auction::*;
pub use engine::*;
pub use valuation::*;
