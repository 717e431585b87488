//! Collateral auctions.
//!
//! Debt that forced repayment could not clear is sold together with the
//! seized collateral in a descending-discount auction. The sale ratio starts
//! at a floor and ramps toward full value with elapsed time; a bidder repays
//! part of the debt and receives collateral at the current ratio.
//!
//! An auction is `Active` while both legs are non-zero and `Filled` once
//! either reaches zero. Filled auctions are kept as history.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::core::account::AccountKey;
use crate::core::asset::AssetId;
use crate::core::market::MarketId;
use crate::error::{Error, Result};
use crate::utils::constants::*;
use crate::utils::math::*;
use crate::utils::validation::{validate_amount, validate_unit_ratio};

/// Auction identifier, assigned in creation order starting at 0
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AuctionId(pub u32);

impl fmt::Display for AuctionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "auction#{}", self.0)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// RATIO RAMP
// ═══════════════════════════════════════════════════════════════════════════════

/// Shape of the ratio curve between floor and ceiling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RampShape {
    /// Straight line reaching the ceiling after `duration_secs`
    Linear {
        /// Seconds from floor to ceiling
        duration_secs: u64,
    },
    /// `increment` added every `step_secs`
    Stepped {
        /// Seconds per step
        step_secs: u64,
        /// Ratio added per step
        increment: Decimal,
    },
}

/// Time-based sale ratio of an auction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RatioRamp {
    /// Ratio at creation
    pub floor: Decimal,
    /// Maximum ratio
    pub ceiling: Decimal,
    /// Curve between the two
    pub shape: RampShape,
}

impl Default for RatioRamp {
    fn default() -> Self {
        Self {
            floor: AUCTION_FLOOR_RATIO,
            ceiling: AUCTION_CEILING_RATIO,
            shape: RampShape::Stepped {
                step_secs: AUCTION_STEP_SECS,
                increment: AUCTION_STEP_INCREMENT,
            },
        }
    }
}

impl RatioRamp {
    /// Linear ramp over `duration_secs`
    pub fn linear(floor: Decimal, ceiling: Decimal, duration_secs: u64) -> Self {
        Self {
            floor,
            ceiling,
            shape: RampShape::Linear { duration_secs },
        }
    }

    /// Check `0 < floor <= ceiling <= 1` and a non-degenerate shape
    pub fn validate(&self) -> Result<()> {
        validate_unit_ratio(self.floor, "auction.floor")?;
        validate_unit_ratio(self.ceiling, "auction.ceiling")?;
        if self.floor.is_zero() || self.floor > self.ceiling {
            return Err(Error::InvalidParameter {
                name: "auction.floor".into(),
                reason: format!("must be in (0, {}]", self.ceiling),
            });
        }

        match self.shape {
            RampShape::Linear { duration_secs: 0 } | RampShape::Stepped { step_secs: 0, .. } => {
                Err(Error::InvalidParameter {
                    name: "auction.shape".into(),
                    reason: "ramp period must be positive".into(),
                })
            }
            RampShape::Stepped { increment, .. } if increment <= Decimal::ZERO => Err(Error::InvalidParameter {
                name: "auction.increment".into(),
                reason: "must be positive".into(),
            }),
            _ => Ok(()),
        }
    }

    /// Ratio after `elapsed` seconds; non-decreasing, `ratio(0) == floor`
    pub fn ratio(&self, elapsed: u64) -> Result<Decimal> {
        let span = safe_sub(self.ceiling, self.floor)?;
        let ratio = match self.shape {
            RampShape::Linear { duration_secs } => {
                if duration_secs == 0 || elapsed >= duration_secs {
                    self.ceiling
                } else {
                    let gained = mul_div(span, Decimal::from(elapsed), Decimal::from(duration_secs))?;
                    safe_add(self.floor, gained)?
                }
            }
            RampShape::Stepped { step_secs, increment } => {
                if step_secs == 0 {
                    self.ceiling
                } else {
                    let steps = Decimal::from(elapsed / step_secs);
                    // saturate instead of overflowing for very old auctions
                    match steps.checked_mul(increment).and_then(|g| g.checked_add(self.floor)) {
                        Some(ratio) => ratio,
                        None => self.ceiling,
                    }
                }
            }
        };
        Ok(ratio.min(self.ceiling))
    }

    /// Seconds until the ceiling is reached
    pub fn full_value_after(&self) -> Result<u64> {
        match self.shape {
            RampShape::Linear { duration_secs } => Ok(duration_secs),
            RampShape::Stepped { step_secs, increment } => {
                let steps = safe_div(safe_sub(self.ceiling, self.floor)?, increment)?.ceil();
                let steps = steps.to_u64().ok_or(Error::Overflow {
                    operation: format!("ramp steps {}", steps),
                })?;
                steps.checked_mul(step_secs).ok_or(Error::Overflow {
                    operation: format!("{} * {}", steps, step_secs),
                })
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// AUCTION
// ═══════════════════════════════════════════════════════════════════════════════

/// Auction lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuctionState {
    /// Both legs outstanding
    Active,
    /// Debt or collateral exhausted
    Filled,
}

/// Result of pricing a bid against an auction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FillQuote {
    /// Ratio in effect
    pub ratio: Decimal,
    /// Debt the bidder pays
    pub accepted_debt: Decimal,
    /// Collateral the bidder receives
    pub released_collateral: Decimal,
    /// Debt left without collateral once this fill completes
    pub residual_debt: Decimal,
}

/// Leftover debt of a liquidated account paired with its seized collateral
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Auction {
    /// Identifier
    pub id: AuctionId,
    /// Market of the liquidated account
    pub market: MarketId,
    /// Liquidated account whose frozen debt the fills repay
    pub borrower: AccountKey,
    /// Asset bidders repay
    pub debt_asset: AssetId,
    /// Asset bidders receive
    pub collateral_asset: AssetId,
    /// Debt at creation
    pub initial_debt_amount: Decimal,
    /// Collateral at creation
    pub initial_collateral_amount: Decimal,
    /// Debt still outstanding
    pub left_debt_amount: Decimal,
    /// Collateral still for sale
    pub left_collateral_amount: Decimal,
    /// Creation timestamp
    pub start_time: u64,
}

impl Auction {
    /// Current state
    pub fn state(&self) -> AuctionState {
        if self.left_debt_amount.is_zero() || self.left_collateral_amount.is_zero() {
            AuctionState::Filled
        } else {
            AuctionState::Active
        }
    }

    /// Whether bids are still accepted
    pub fn is_active(&self) -> bool {
        self.state() == AuctionState::Active
    }

    /// Sale ratio at `now`; a clock before `start_time` reads as the floor
    pub fn ratio_at(&self, ramp: &RatioRamp, now: u64) -> Result<Decimal> {
        ramp.ratio(now.saturating_sub(self.start_time))
    }

    /// Price a bid of `offered` debt at `now` without changing the auction.
    ///
    /// The release is `offered / ratio` converted at the auction's own
    /// collateral-per-debt rate. When that would exceed the collateral left,
    /// the bidder takes all of it for `ratio * left_debt`.
    pub fn quote(
        &self,
        offered: Decimal,
        ramp: &RatioRamp,
        now: u64,
        debt_decimals: u32,
        collateral_decimals: u32,
    ) -> Result<FillQuote> {
        if !self.is_active() {
            return Err(Error::AuctionFinished(self.id.0));
        }
        validate_amount(offered, "offered debt")?;
        if offered > self.left_debt_amount {
            return Err(Error::AuctionOverfill {
                offered,
                remaining: self.left_debt_amount,
            });
        }

        let ratio = self.ratio_at(ramp, now)?;
        // paying off the whole debt claims the whole collateral at this ratio
        let share = if offered == self.left_debt_amount {
            self.left_collateral_amount
        } else {
            mul_div(offered, self.left_collateral_amount, self.left_debt_amount)?
        };
        let requested = safe_div(share, ratio)?;

        let (accepted_debt, released_collateral) = if requested >= self.left_collateral_amount {
            let accepted = round_up(safe_mul(ratio, self.left_debt_amount)?, debt_decimals).min(offered);
            (accepted, self.left_collateral_amount)
        } else {
            (offered, truncate(requested, collateral_decimals))
        };

        if released_collateral.is_zero() {
            return Err(Error::InvalidParameter {
                name: "offered debt".into(),
                reason: format!("{} releases no collateral", offered),
            });
        }

        let residual_debt = if released_collateral == self.left_collateral_amount {
            safe_sub(self.left_debt_amount, accepted_debt)?
        } else {
            Decimal::ZERO
        };

        Ok(FillQuote {
            ratio,
            accepted_debt,
            released_collateral,
            residual_debt,
        })
    }

    /// Apply a quote produced by [`Auction::quote`]
    pub(crate) fn apply(&mut self, quote: &FillQuote) -> Result<()> {
        let settled = safe_add(quote.accepted_debt, quote.residual_debt)?;
        self.left_debt_amount = safe_sub(self.left_debt_amount, settled)?;
        self.left_collateral_amount = safe_sub(self.left_collateral_amount, quote.released_collateral)?;
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// AUCTION BOOK
// ═══════════════════════════════════════════════════════════════════════════════

/// Parameters of a new auction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewAuction {
    /// Liquidated account
    pub borrower: AccountKey,
    /// Asset bidders repay
    pub debt_asset: AssetId,
    /// Asset bidders receive
    pub collateral_asset: AssetId,
    /// Debt sold
    pub debt_amount: Decimal,
    /// Collateral sold
    pub collateral_amount: Decimal,
}

/// Every auction ever created
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuctionBook {
    auctions: BTreeMap<AuctionId, Auction>,
    next_id: u32,
}

impl AuctionBook {
    /// Empty book
    pub fn new() -> Self {
        Self::default()
    }

    /// Open an auction starting at `now`
    pub fn create(&mut self, params: NewAuction, now: u64) -> Result<AuctionId> {
        validate_amount(params.debt_amount, "auction debt")?;
        validate_amount(params.collateral_amount, "auction collateral")?;

        let id = AuctionId(self.next_id);
        self.next_id = self.next_id.checked_add(1).ok_or(Error::Overflow {
            operation: "auction id".into(),
        })?;

        self.auctions.insert(
            id,
            Auction {
                id,
                market: params.borrower.market,
                borrower: params.borrower,
                debt_asset: params.debt_asset,
                collateral_asset: params.collateral_asset,
                initial_debt_amount: params.debt_amount,
                initial_collateral_amount: params.collateral_amount,
                left_debt_amount: params.debt_amount,
                left_collateral_amount: params.collateral_amount,
                start_time: now,
            },
        );
        Ok(id)
    }

    /// Number of auctions ever created
    pub fn count(&self) -> usize {
        self.auctions.len()
    }

    /// Look up an auction
    pub fn get(&self, id: AuctionId) -> Result<&Auction> {
        self.auctions.get(&id).ok_or(Error::AuctionNotFound(id.0))
    }

    pub(crate) fn get_mut(&mut self, id: AuctionId) -> Result<&mut Auction> {
        self.auctions.get_mut(&id).ok_or(Error::AuctionNotFound(id.0))
    }

    /// All auctions in creation order
    pub fn iter(&self) -> impl Iterator<Item = &Auction> {
        self.auctions.values()
    }

    /// Whether the account still has an auction taking bids
    pub fn has_active(&self, borrower: AccountKey) -> bool {
        self.auctions
            .values()
            .any(|a| a.borrower == borrower && a.is_active())
    }
}
