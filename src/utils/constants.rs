//! Engine constants and default parameters.
//!
//! All protocol-wide constants are defined here for easy auditing and modification.

use rust_decimal::Decimal;

// ═══════════════════════════════════════════════════════════════════════════════
// TIME
// ═══════════════════════════════════════════════════════════════════════════════

/// Seconds in a (365 day) year, used for interest accrual
pub const SECONDS_PER_YEAR: u64 = 31_536_000;

// ═══════════════════════════════════════════════════════════════════════════════
// ASSETS
// ═══════════════════════════════════════════════════════════════════════════════

/// Default decimal precision of an asset
pub const DEFAULT_ASSET_DECIMALS: u32 = 18;

/// Maximum decimal precision representable by the engine
pub const MAX_ASSET_DECIMALS: u32 = 24;

// ═══════════════════════════════════════════════════════════════════════════════
// COLLATERALIZATION
// ═══════════════════════════════════════════════════════════════════════════════

/// Rates are expressed in percent (120 = 1.20x)
pub const RATE_PRECISION: Decimal = Decimal::ONE_HUNDRED;

/// Default liquidation threshold - 120%
pub const DEFAULT_LIQUIDATE_RATE: u64 = 120;

/// Default withdrawal / borrow threshold - 200%
pub const DEFAULT_WITHDRAW_RATE: u64 = 200;

// ═══════════════════════════════════════════════════════════════════════════════
// AUCTIONS
// ═══════════════════════════════════════════════════════════════════════════════

/// Ratio at which a fresh auction sells its collateral - 0.01
pub const AUCTION_FLOOR_RATIO: Decimal = Decimal::from_parts(1, 0, 0, false, 2);

/// Ratio at which the ramp stops - 1.0
pub const AUCTION_CEILING_RATIO: Decimal = Decimal::ONE;

/// Seconds per ramp step
pub const AUCTION_STEP_SECS: u64 = 15;

/// Ratio increment per ramp step - 0.01
pub const AUCTION_STEP_INCREMENT: Decimal = Decimal::from_parts(1, 0, 0, false, 2);

// ═══════════════════════════════════════════════════════════════════════════════
// INTEREST POOL
// ═══════════════════════════════════════════════════════════════════════════════

/// Linear coefficient of the borrow rate polynomial - 0.2
pub const RATE_LINEAR_COEFFICIENT: Decimal = Decimal::from_parts(2, 0, 0, false, 1);

/// Quadratic coefficient of the borrow rate polynomial - 0.5
pub const RATE_QUADRATIC_COEFFICIENT: Decimal = Decimal::from_parts(5, 0, 0, false, 1);

/// Share of borrow interest routed to the insurance balance - 10%
pub const DEFAULT_INSURANCE_RATIO: Decimal = Decimal::from_parts(1, 0, 0, false, 1);

// ═══════════════════════════════════════════════════════════════════════════════
// EVENTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Maximum number of events retained by the ledger
pub const DEFAULT_MAX_EVENTS: usize = 1000;
