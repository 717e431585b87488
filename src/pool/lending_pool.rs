//! Interest-bearing lending pool.
//!
//! Suppliers deposit liquidity per asset; collateral accounts borrow it.
//! Borrows are stored as shares of a borrow index that grows with the
//! utilization-based rate, supplies as shares of a supply index that
//! receives the interest net of the insurance cut.
//!
//! Debt handed to an auction is frozen: it stops accruing and is settled by
//! auction fills or written off as bad debt.
//!
//! Accounting identity per asset, kept by every operation:
//! `cash + total_borrow == total_supply + insurance`.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::core::account::AccountKey;
use crate::core::asset::AssetId;
use crate::error::{Error, Result};
use crate::pool::rate_model::{accrual_factor, increment_index, RateModel};
use crate::utils::address::Address;
use crate::utils::math::*;
use crate::utils::validation::{validate_amount, validate_unit_ratio};

// ═══════════════════════════════════════════════════════════════════════════════
// ASSET POOL
// ═══════════════════════════════════════════════════════════════════════════════

/// Pool state of one asset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetPool {
    /// Decimal precision of the asset
    pub decimals: u32,
    /// Liquidity on hand
    pub cash: Decimal,
    /// Supply shares outstanding
    pub supply_shares: Decimal,
    /// Borrow shares outstanding
    pub borrow_shares: Decimal,
    /// Supply share value
    pub supply_index: Decimal,
    /// Borrow share value
    pub borrow_index: Decimal,
    /// Non-accruing debt held by auctions
    pub frozen_borrow: Decimal,
    /// Interest reserved to cover bad debt
    pub insurance: Decimal,
    /// Timestamp of the last accrual
    pub last_update: u64,
}

impl AssetPool {
    fn new(decimals: u32, now: u64) -> Self {
        Self {
            decimals,
            cash: Decimal::ZERO,
            supply_shares: Decimal::ZERO,
            borrow_shares: Decimal::ZERO,
            supply_index: Decimal::ONE,
            borrow_index: Decimal::ONE,
            frozen_borrow: Decimal::ZERO,
            insurance: Decimal::ZERO,
            last_update: now,
        }
    }

    /// Supplied liquidity including accrued interest
    pub fn total_supply(&self) -> Result<Decimal> {
        safe_mul(self.supply_shares, self.supply_index)
    }

    /// Index-bearing borrows
    pub fn indexed_borrow(&self) -> Result<Decimal> {
        safe_mul(self.borrow_shares, self.borrow_index)
    }

    /// All borrows, frozen included
    pub fn total_borrow(&self) -> Result<Decimal> {
        safe_add(self.indexed_borrow()?, self.frozen_borrow)
    }

    /// Borrowed share of supplied liquidity
    pub fn utilization(&self) -> Result<Decimal> {
        let supply = self.total_supply()?;
        if supply.is_zero() {
            return Ok(Decimal::ZERO);
        }
        safe_div(self.total_borrow()?, supply)
    }

    /// State after accruing interest up to `now`, with the interest earned.
    ///
    /// A clock earlier than the last update accrues nothing.
    fn accrued(&self, model: &RateModel, insurance_ratio: Decimal, now: u64) -> Result<(Self, Decimal)> {
        let mut next = self.clone();
        if now <= self.last_update {
            return Ok((next, Decimal::ZERO));
        }
        next.last_update = now;
        if self.borrow_shares.is_zero() {
            return Ok((next, Decimal::ZERO));
        }

        let rate = model.borrow_rate(self.utilization()?)?;
        let factor = accrual_factor(rate, now - self.last_update)?;
        next.borrow_index = increment_index(self.borrow_index, factor)?;

        let interest = safe_sub(next.indexed_borrow()?, self.indexed_borrow()?)?;
        let supply = self.total_supply()?;

        // with nobody to pay, all interest is reserved
        let to_insurance = if supply.is_zero() {
            interest
        } else {
            safe_mul(interest, insurance_ratio)?
        };
        let to_suppliers = safe_sub(interest, to_insurance)?;

        next.insurance = safe_add(self.insurance, to_insurance)?;
        if !to_suppliers.is_zero() {
            next.supply_index = increment_index(self.supply_index, safe_div(to_suppliers, supply)?)?;
        }
        Ok((next, interest))
    }
}

/// An account's debt in one asset
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BorrowPosition {
    /// Shares of the borrow index
    pub shares: Decimal,
    /// Debt frozen under auction
    pub frozen: Decimal,
}

impl BorrowPosition {
    fn is_empty(&self) -> bool {
        self.shares.is_zero() && self.frozen.is_zero()
    }
}

/// How a write-off was absorbed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteOff {
    /// Part paid from the insurance balance
    pub covered_by_insurance: Decimal,
    /// Part recognized as a loss by suppliers
    pub socialized_loss: Decimal,
}

// ═══════════════════════════════════════════════════════════════════════════════
// LENDING POOL
// ═══════════════════════════════════════════════════════════════════════════════

/// Shared interest-bearing pool for all markets
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LendingPool {
    rate_model: RateModel,
    insurance_ratio: Decimal,
    assets: BTreeMap<AssetId, AssetPool>,
    supplies: BTreeMap<(AssetId, Address), Decimal>,
    borrows: BTreeMap<(AssetId, AccountKey), BorrowPosition>,
}

impl LendingPool {
    /// Create an empty pool
    pub fn new(rate_model: RateModel, insurance_ratio: Decimal) -> Result<Self> {
        if !rate_model.check_model() {
            return Err(Error::InvalidParameter {
                name: "rate_model".into(),
                reason: "coefficients must be non-negative".into(),
            });
        }
        validate_unit_ratio(insurance_ratio, "insurance_ratio")?;

        Ok(Self {
            rate_model,
            insurance_ratio,
            assets: BTreeMap::new(),
            supplies: BTreeMap::new(),
            borrows: BTreeMap::new(),
        })
    }

    /// Open a pool for an asset
    pub fn list_asset(&mut self, asset: AssetId, decimals: u32, now: u64) {
        self.assets
            .entry(asset)
            .or_insert_with(|| AssetPool::new(decimals, now));
    }

    /// Pool state of an asset
    pub fn asset_pool(&self, asset: AssetId) -> Result<&AssetPool> {
        self.assets.get(&asset).ok_or(Error::UnknownAsset(asset.0))
    }

    fn asset_pool_mut(&mut self, asset: AssetId) -> Result<&mut AssetPool> {
        self.assets.get_mut(&asset).ok_or(Error::UnknownAsset(asset.0))
    }

    /// Pool state of an asset as it would be at `now`
    pub fn asset_pool_at(&self, asset: AssetId, now: u64) -> Result<AssetPool> {
        let (pool, _) = self
            .asset_pool(asset)?
            .accrued(&self.rate_model, self.insurance_ratio, now)?;
        Ok(pool)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // ACCRUAL
    // ═══════════════════════════════════════════════════════════════════════════

    /// Accrue interest on an asset up to `now`
    pub fn accrue(&mut self, asset: AssetId, now: u64) -> Result<()> {
        let (next, interest) = self
            .asset_pool(asset)?
            .accrued(&self.rate_model, self.insurance_ratio, now)?;
        if !interest.is_zero() {
            tracing::trace!(%asset, %interest, index = %next.borrow_index, "interest accrued");
        }
        *self.asset_pool_mut(asset)? = next;
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // SUPPLY
    // ═══════════════════════════════════════════════════════════════════════════

    /// Add liquidity
    pub fn supply(&mut self, asset: AssetId, user: Address, amount: Decimal, now: u64) -> Result<()> {
        validate_amount(amount, "supply")?;
        self.accrue(asset, now)?;

        let pool = self.asset_pool_mut(asset)?;
        let shares = safe_div(amount, pool.supply_index)?;
        pool.supply_shares = safe_add(pool.supply_shares, shares)?;
        pool.cash = safe_add(pool.cash, amount)?;

        let entry = self.supplies.entry((asset, user)).or_insert(Decimal::ZERO);
        *entry = safe_add(*entry, shares)?;
        Ok(())
    }

    fn supply_shares_of(&self, asset: AssetId, user: Address) -> Decimal {
        self.supplies.get(&(asset, user)).copied().unwrap_or(Decimal::ZERO)
    }

    /// Liquidity supplied by `user` at `now`, truncated to asset precision
    pub fn supply_of(&self, asset: AssetId, user: Address, now: u64) -> Result<Decimal> {
        let shares = self.supply_shares_of(asset, user);
        if shares.is_zero() {
            return Ok(Decimal::ZERO);
        }
        let pool = self.asset_pool_at(asset, now)?;
        Ok(truncate(safe_mul(shares, pool.supply_index)?, pool.decimals))
    }

    /// Remove liquidity; returns the amount released
    pub fn withdraw_supply(&mut self, asset: AssetId, user: Address, amount: Decimal, now: u64) -> Result<Decimal> {
        validate_amount(amount, "withdraw")?;
        self.accrue(asset, now)?;

        let owned = self.supply_of(asset, user, now)?;
        if amount > owned {
            return Err(Error::InsufficientBalance {
                required: amount,
                available: owned,
            });
        }

        let held = self.supply_shares_of(asset, user);
        let pool = self.asset_pool_mut(asset)?;
        if amount > pool.cash {
            return Err(Error::InsufficientLiquidity {
                required: amount,
                available: pool.cash,
            });
        }

        let shares = if amount == owned {
            held
        } else {
            safe_div(amount, pool.supply_index)?.min(held)
        };
        // truncation dust left by a full exit stays with the pool
        let dust = safe_sub(safe_mul(shares, pool.supply_index)?, amount).unwrap_or(Decimal::ZERO);
        pool.supply_shares = safe_sub(pool.supply_shares, shares)?;
        pool.cash = safe_sub(pool.cash, amount)?;
        pool.insurance = safe_add(pool.insurance, dust)?;

        let remaining = safe_sub(held, shares)?;
        if remaining.is_zero() {
            self.supplies.remove(&(asset, user));
        } else {
            self.supplies.insert((asset, user), remaining);
        }
        Ok(amount)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // BORROW
    // ═══════════════════════════════════════════════════════════════════════════

    /// Lend `amount` to a collateral account
    pub fn borrow(&mut self, asset: AssetId, account: AccountKey, amount: Decimal, now: u64) -> Result<()> {
        validate_amount(amount, "borrow")?;
        self.accrue(asset, now)?;

        let pool = self.asset_pool_mut(asset)?;
        if amount > pool.cash {
            return Err(Error::InsufficientLiquidity {
                required: amount,
                available: pool.cash,
            });
        }
        let shares = safe_div(amount, pool.borrow_index)?;
        pool.borrow_shares = safe_add(pool.borrow_shares, shares)?;
        pool.cash = safe_sub(pool.cash, amount)?;

        let position = self.borrows.entry((asset, account)).or_default();
        position.shares = safe_add(position.shares, shares)?;
        Ok(())
    }

    fn position(&self, asset: AssetId, account: AccountKey) -> BorrowPosition {
        self.borrows.get(&(asset, account)).copied().unwrap_or_default()
    }

    /// Index-bearing debt of an account at `now`, rounded up to asset precision
    pub fn indexed_borrow_of(&self, asset: AssetId, account: AccountKey, now: u64) -> Result<Decimal> {
        let shares = self.position(asset, account).shares;
        if shares.is_zero() {
            return Ok(Decimal::ZERO);
        }
        let pool = self.asset_pool_at(asset, now)?;
        Ok(round_up(safe_mul(shares, pool.borrow_index)?, pool.decimals))
    }

    /// Debt of an account frozen under auction
    pub fn frozen_borrow_of(&self, asset: AssetId, account: AccountKey) -> Decimal {
        self.position(asset, account).frozen
    }

    /// Total debt of an account at `now`, accrual included
    pub fn borrow_of(&self, asset: AssetId, account: AccountKey, now: u64) -> Result<Decimal> {
        safe_add(
            self.indexed_borrow_of(asset, account, now)?,
            self.frozen_borrow_of(asset, account),
        )
    }

    /// Whether the account owes anything in any asset
    pub fn has_debt(&self, account: AccountKey) -> bool {
        self.borrows
            .iter()
            .any(|((_, key), position)| *key == account && !position.is_empty())
    }

    /// Repay index-bearing debt; returns the amount actually applied
    pub fn repay(&mut self, asset: AssetId, account: AccountKey, amount: Decimal, now: u64) -> Result<Decimal> {
        validate_amount(amount, "repay")?;
        self.accrue(asset, now)?;

        let owed = self.indexed_borrow_of(asset, account, now)?;
        let applied = amount.min(owed);
        if applied.is_zero() {
            return Ok(Decimal::ZERO);
        }

        let held = self.position(asset, account).shares;
        let pool = self.asset_pool_mut(asset)?;
        let shares = if applied == owed {
            held
        } else {
            safe_div(applied, pool.borrow_index)?.min(held)
        };
        let rounding = safe_sub(applied, safe_mul(shares, pool.borrow_index)?).unwrap_or(Decimal::ZERO);
        pool.borrow_shares = safe_sub(pool.borrow_shares, shares)?;
        pool.cash = safe_add(pool.cash, applied)?;
        pool.insurance = safe_add(pool.insurance, rounding)?;

        self.update_position(asset, account, |position| {
            position.shares = safe_sub(position.shares, shares)?;
            Ok(())
        })?;
        Ok(applied)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // AUCTION SETTLEMENT
    // ═══════════════════════════════════════════════════════════════════════════

    /// Move an account's index-bearing debt into the frozen bucket; returns the amount moved
    pub fn freeze_borrow(&mut self, asset: AssetId, account: AccountKey, now: u64) -> Result<Decimal> {
        self.accrue(asset, now)?;

        let owed = self.indexed_borrow_of(asset, account, now)?;
        if owed.is_zero() {
            return Ok(Decimal::ZERO);
        }

        let shares = self.position(asset, account).shares;
        let pool = self.asset_pool_mut(asset)?;
        let rounding = safe_sub(owed, safe_mul(shares, pool.borrow_index)?).unwrap_or(Decimal::ZERO);
        pool.borrow_shares = safe_sub(pool.borrow_shares, shares)?;
        pool.frozen_borrow = safe_add(pool.frozen_borrow, owed)?;
        pool.insurance = safe_add(pool.insurance, rounding)?;

        self.update_position(asset, account, |position| {
            position.shares = Decimal::ZERO;
            position.frozen = safe_add(position.frozen, owed)?;
            Ok(())
        })?;
        Ok(owed)
    }

    /// Settle frozen debt with funds paid by an auction bidder
    pub fn repay_frozen(&mut self, asset: AssetId, account: AccountKey, amount: Decimal) -> Result<()> {
        self.release_frozen(asset, account, amount)?;
        let pool = self.asset_pool_mut(asset)?;
        pool.cash = safe_add(pool.cash, amount)?;
        Ok(())
    }

    /// Drop frozen debt that no auction can recover
    pub fn write_off(&mut self, asset: AssetId, account: AccountKey, amount: Decimal) -> Result<WriteOff> {
        self.release_frozen(asset, account, amount)?;

        let pool = self.asset_pool_mut(asset)?;
        let covered_by_insurance = amount.min(pool.insurance);
        pool.insurance = safe_sub(pool.insurance, covered_by_insurance)?;

        let socialized_loss = safe_sub(amount, covered_by_insurance)?;
        if !socialized_loss.is_zero() {
            let supply = pool.total_supply()?;
            if socialized_loss > supply {
                return Err(Error::InvariantViolation(format!(
                    "bad debt {} on {} exceeds supplied liquidity {}",
                    socialized_loss, asset, supply
                )));
            }
            let remaining = safe_sub(supply, socialized_loss)?;
            pool.supply_index = mul_div(pool.supply_index, remaining, supply)?;
        }

        tracing::warn!(
            %asset,
            %account,
            %covered_by_insurance,
            %socialized_loss,
            "bad debt written off"
        );

        Ok(WriteOff {
            covered_by_insurance,
            socialized_loss,
        })
    }

    fn release_frozen(&mut self, asset: AssetId, account: AccountKey, amount: Decimal) -> Result<()> {
        let frozen = self.frozen_borrow_of(asset, account);
        if amount > frozen {
            return Err(Error::InvariantViolation(format!(
                "releasing {} of frozen debt {} for {}",
                amount, frozen, account
            )));
        }
        let pool = self.asset_pool_mut(asset)?;
        pool.frozen_borrow = safe_sub(pool.frozen_borrow, amount)?;

        self.update_position(asset, account, |position| {
            position.frozen = safe_sub(position.frozen, amount)?;
            Ok(())
        })
    }

    fn update_position<F>(&mut self, asset: AssetId, account: AccountKey, f: F) -> Result<()>
    where
        F: FnOnce(&mut BorrowPosition) -> Result<()>,
    {
        let key = (asset, account);
        let position = self.borrows.entry(key).or_default();
        f(position)?;
        if position.is_empty() {
            self.borrows.remove(&key);
        }
        Ok(())
    }
}
