//! Liquidation controller.
//!
//! Decides whether a collateral account is liquidable, locks it, repays as
//! much debt as possible from the account's own balances, and hands any
//! leftover debt to collateral auctions. Also settles auction fills against
//! the pool and releases the account once nothing is owed.
//!
//! Forced repayment only uses the account's balance of each debt asset
//! itself, in ascending asset order. Balances of other assets are seized
//! for the auctions.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::core::account::{AccountKey, AccountStatus, Balances, CollateralAccount};
use crate::core::asset::{Asset, AssetId};
use crate::core::market::Market;
use crate::error::{Error, Result};
use crate::liquidation::auction::{AuctionBook, AuctionId, NewAuction, RatioRamp};
use crate::liquidation::valuation::{valuate, Valuation};
use crate::oracle::price_feed::PriceOracle;
use crate::pool::lending_pool::{LendingPool, WriteOff};
use crate::utils::math::*;

// ═══════════════════════════════════════════════════════════════════════════════
// OUTCOMES
// ═══════════════════════════════════════════════════════════════════════════════

/// Debt repaid from the account's own balance during liquidation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repayment {
    /// Debt asset
    pub asset: AssetId,
    /// Amount repaid
    pub amount: Decimal,
}

/// Debt dropped because no collateral backs it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BadDebt {
    /// Debt asset
    pub asset: AssetId,
    /// Amount written off
    pub amount: Decimal,
    /// How the pool absorbed it
    pub absorbed: WriteOff,
}

/// What a liquidation did
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidationReport {
    /// Valuation that triggered it
    pub valuation: Valuation,
    /// Forced repayments, ascending by asset
    pub repayments: Vec<Repayment>,
    /// Auctions opened for the leftover debt
    pub auctions: Vec<AuctionId>,
    /// Leftover debt with no collateral to sell
    pub bad_debt: Vec<BadDebt>,
}

/// Result of [`LiquidationEngine::liquidate_account`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LiquidationOutcome {
    /// Not liquidable; nothing changed
    Skipped(Valuation),
    /// No debt left; the account is Normal again
    Resolved(LiquidationReport),
    /// Leftover debt is being auctioned; the account stays Liquid
    Auctioned(LiquidationReport),
}

impl LiquidationOutcome {
    /// Report of an executed liquidation
    pub fn report(&self) -> Option<&LiquidationReport> {
        match self {
            LiquidationOutcome::Skipped(_) => None,
            LiquidationOutcome::Resolved(report) | LiquidationOutcome::Auctioned(report) => Some(report),
        }
    }

    /// Auctions opened by this liquidation
    pub fn auctions(&self) -> &[AuctionId] {
        self.report().map(|r| r.auctions.as_slice()).unwrap_or(&[])
    }
}

/// Result of a fill
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FillOutcome {
    /// Auction filled
    pub auction: AuctionId,
    /// Ratio in effect
    pub ratio: Decimal,
    /// Debt paid by the bidder
    pub accepted_debt: Decimal,
    /// Collateral released to the bidder
    pub released_collateral: Decimal,
    /// Residual debt written off when the collateral ran out
    pub bad_debt: Option<BadDebt>,
    /// Whether the auction is now Filled
    pub finished: bool,
    /// Whether the borrower's account returned to Normal
    pub account_released: bool,
}

/// Liquidation statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidationStats {
    /// Liquidations executed
    pub total_liquidations: u64,
    /// Liquidations cleared by forced repayment alone
    pub resolved_liquidations: u64,
    /// Auctions opened
    pub total_auctions: u64,
    /// Fills accepted
    pub total_fills: u64,
    /// Write-offs recorded
    pub total_write_offs: u64,
}

// ═══════════════════════════════════════════════════════════════════════════════
// LIQUIDATION ENGINE
// ═══════════════════════════════════════════════════════════════════════════════

/// Engine for liquidating unsafe collateral accounts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidationEngine {
    ramp: RatioRamp,
    stats: LiquidationStats,
}

impl Default for LiquidationEngine {
    fn default() -> Self {
        Self::new(RatioRamp::default())
    }
}

impl LiquidationEngine {
    /// Create an engine selling collateral along `ramp`
    pub fn new(ramp: RatioRamp) -> Self {
        Self {
            ramp,
            stats: LiquidationStats::default(),
        }
    }

    /// Auction ratio curve
    pub fn ramp(&self) -> &RatioRamp {
        &self.ramp
    }

    /// Running statistics
    pub fn statistics(&self) -> LiquidationStats {
        self.stats
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // DETECTION
    // ═══════════════════════════════════════════════════════════════════════════

    /// An account is liquidable while Normal, in debt, and below the market threshold
    pub fn is_liquidable(
        &self,
        account: Option<&CollateralAccount>,
        valuation: &Valuation,
        market: &Market,
    ) -> Result<bool> {
        let status = account.map(|a| a.status()).unwrap_or_default();
        if status.is_liquid() {
            return Ok(false);
        }
        valuation.is_below(market.liquidate_rate)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // LIQUIDATION
    // ═══════════════════════════════════════════════════════════════════════════

    /// Liquidate `account` if it is liquidable; a no-op otherwise.
    ///
    /// Callers must discard every effect when this returns an error.
    #[allow(clippy::too_many_arguments)]
    pub fn liquidate_account<O>(
        &mut self,
        account: &mut CollateralAccount,
        market: &Market,
        assets: &BTreeMap<AssetId, Asset>,
        pool: &mut LendingPool,
        auctions: &mut AuctionBook,
        oracle: &O,
        now: u64,
    ) -> Result<LiquidationOutcome>
    where
        O: PriceOracle + ?Sized,
    {
        let key = account.key;
        let valuation = valuate(Some(&*account), key, market, pool, oracle, now)?;
        if !self.is_liquidable(Some(&*account), &valuation, market)? {
            tracing::debug!(%key, status = ?account.status(), "account not liquidable");
            return Ok(LiquidationOutcome::Skipped(valuation));
        }

        account.lock();
        self.stats.total_liquidations += 1;
        tracing::info!(
            %key,
            balances_usd = %valuation.balances_total_usd,
            debts_usd = %valuation.debts_total_usd,
            "liquidating account"
        );

        let mut report = LiquidationReport {
            valuation,
            repayments: Vec::new(),
            auctions: Vec::new(),
            bad_debt: Vec::new(),
        };

        // Forced repayment
        for &asset in market.assets() {
            let owed = pool.indexed_borrow_of(asset, key, now)?;
            let amount = owed.min(account.balance(asset));
            if amount.is_zero() {
                continue;
            }
            account.debit(asset, amount)?;
            let applied = pool.repay(asset, key, amount, now)?;
            report.repayments.push(Repayment { asset, amount: applied });
        }

        let mut leftover = Vec::new();
        for &asset in market.assets() {
            if !pool.indexed_borrow_of(asset, key, now)?.is_zero() {
                leftover.push(asset);
            }
        }
        if leftover.is_empty() {
            account.unlock();
            self.stats.resolved_liquidations += 1;
            tracing::info!(%key, "liquidation resolved by forced repayment");
            return Ok(LiquidationOutcome::Resolved(report));
        }

        // Leftover debt stops accruing and goes to auction
        let mut debts = Vec::with_capacity(leftover.len());
        for asset in leftover {
            debts.push((asset, pool.freeze_borrow(asset, key, now)?));
        }
        let collateral: Vec<(AssetId, Decimal)> = account.balances().collect();

        let debt_weights = usd_weights(&debts, oracle)?;
        let collateral_weights = usd_weights(&collateral, oracle)?;

        let mut debt_split = Vec::with_capacity(debts.len());
        for &(asset, amount) in &debts {
            debt_split.push(split_proportional(amount, &collateral_weights, decimals_of(assets, asset)?)?);
        }
        let mut collateral_split = Vec::with_capacity(collateral.len());
        for &(asset, amount) in &collateral {
            collateral_split.push(split_proportional(amount, &debt_weights, decimals_of(assets, asset)?)?);
        }

        for (i, &(debt_asset, total_debt)) in debts.iter().enumerate() {
            // no collateral at all: the whole debt is unrecoverable
            if collateral.is_empty() {
                report.bad_debt.push(self.write_off(pool, debt_asset, key, total_debt)?);
                continue;
            }

            for (j, &(collateral_asset, _)) in collateral.iter().enumerate() {
                let debt_amount = debt_split[i][j];
                let collateral_amount = collateral_split[j][i];
                if debt_amount.is_zero() {
                    continue;
                }
                if collateral_amount.is_zero() {
                    report.bad_debt.push(self.write_off(pool, debt_asset, key, debt_amount)?);
                    continue;
                }

                account.debit(collateral_asset, collateral_amount)?;
                let id = auctions.create(
                    NewAuction {
                        borrower: key,
                        debt_asset,
                        collateral_asset,
                        debt_amount,
                        collateral_amount,
                    },
                    now,
                )?;
                self.stats.total_auctions += 1;
                tracing::info!(
                    auction = %id,
                    %key,
                    %debt_asset,
                    %debt_amount,
                    %collateral_asset,
                    %collateral_amount,
                    "auction created"
                );
                report.auctions.push(id);
            }
        }

        if report.auctions.is_empty() {
            account.unlock();
            self.stats.resolved_liquidations += 1;
            return Ok(LiquidationOutcome::Resolved(report));
        }
        Ok(LiquidationOutcome::Auctioned(report))
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // AUCTION FILLS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Settle a bid of `offered` debt on auction `id`.
    ///
    /// The bidder pays the accepted debt from `bidder` and receives the
    /// released collateral there. `borrower` must be the auctioned account.
    #[allow(clippy::too_many_arguments)]
    pub fn fill_auction(
        &mut self,
        id: AuctionId,
        offered: Decimal,
        bidder: &mut Balances,
        borrower: &mut CollateralAccount,
        pool: &mut LendingPool,
        auctions: &mut AuctionBook,
        assets: &BTreeMap<AssetId, Asset>,
        now: u64,
    ) -> Result<FillOutcome> {
        let auction = auctions.get(id)?;
        let key = auction.borrower;
        if borrower.key != key {
            return Err(Error::InvariantViolation(format!(
                "{} belongs to {}, not {}",
                id, key, borrower.key
            )));
        }
        let (debt_asset, collateral_asset) = (auction.debt_asset, auction.collateral_asset);
        let quote = auction.quote(
            offered,
            &self.ramp,
            now,
            decimals_of(assets, debt_asset)?,
            decimals_of(assets, collateral_asset)?,
        )?;

        bidder.debit(debt_asset, quote.accepted_debt)?;
        pool.repay_frozen(debt_asset, key, quote.accepted_debt)?;
        bidder.credit(collateral_asset, quote.released_collateral)?;

        let bad_debt = if quote.residual_debt.is_zero() {
            None
        } else {
            Some(self.write_off(pool, debt_asset, key, quote.residual_debt)?)
        };

        let auction = auctions.get_mut(id)?;
        auction.apply(&quote)?;
        let finished = !auction.is_active();
        self.stats.total_fills += 1;

        tracing::info!(
            auction = %id,
            ratio = %quote.ratio,
            accepted_debt = %quote.accepted_debt,
            released_collateral = %quote.released_collateral,
            finished,
            "auction filled"
        );

        let account_released =
            borrower.status() == AccountStatus::Liquid && !pool.has_debt(key) && !auctions.has_active(key);
        if account_released {
            borrower.unlock();
            tracing::info!(%key, "account released from liquidation");
        }

        Ok(FillOutcome {
            auction: id,
            ratio: quote.ratio,
            accepted_debt: quote.accepted_debt,
            released_collateral: quote.released_collateral,
            bad_debt,
            finished,
            account_released,
        })
    }

    fn write_off(
        &mut self,
        pool: &mut LendingPool,
        asset: AssetId,
        key: AccountKey,
        amount: Decimal,
    ) -> Result<BadDebt> {
        let absorbed = pool.write_off(asset, key, amount)?;
        self.stats.total_write_offs += 1;
        Ok(BadDebt { asset, amount, absorbed })
    }
}

fn decimals_of(assets: &BTreeMap<AssetId, Asset>, asset: AssetId) -> Result<u32> {
    assets
        .get(&asset)
        .map(|a| a.decimals)
        .ok_or(Error::UnknownAsset(asset.0))
}

fn usd_weights<O>(amounts: &[(AssetId, Decimal)], oracle: &O) -> Result<Vec<Decimal>>
where
    O: PriceOracle + ?Sized,
{
    amounts
        .iter()
        .map(|&(asset, amount)| usd_value(amount, oracle.price(asset)?))
        .collect()
}
