//! Interest pool
//!
//! Supplier liquidity, index-based borrow accrual and the bad-debt
//! settlement path used by collateral auctions.

pub mod lending_pool;
pub mod rate_model;

pub use lending_pool::{AssetPool, BorrowPosition, LendingPool, WriteOff};
pub use rate_model::RateModel;
