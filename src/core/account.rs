//! Collateral accounts.
//!
//! A collateral account is the per (user, market) bundle of balances that
//! backs the user's borrows in that market. Borrow amounts themselves are
//! tracked by the interest pool. While an account is `Liquid` only the
//! liquidation controller and the auction engine may touch it; every other
//! balance-mutating entry point goes through [`CollateralAccount::ensure_operable`].

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::core::asset::AssetId;
use crate::core::market::MarketId;
use crate::error::{Error, Result};
use crate::utils::address::Address;
use crate::utils::math::{safe_add, safe_sub};

// ═══════════════════════════════════════════════════════════════════════════════
// ACCOUNT STATUS
// ═══════════════════════════════════════════════════════════════════════════════

/// Lock state of a collateral account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AccountStatus {
    /// Usable by its owner
    #[default]
    Normal,
    /// Under liquidation; locked for everyone but the engine
    Liquid,
}

impl AccountStatus {
    /// Whether the account is locked
    pub fn is_liquid(&self) -> bool {
        matches!(self, AccountStatus::Liquid)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// KEYS & PATHS
// ═══════════════════════════════════════════════════════════════════════════════

/// Identifies a collateral account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AccountKey {
    /// Owner
    pub user: Address,
    /// Market the account belongs to
    pub market: MarketId,
}

impl AccountKey {
    /// Create a key
    pub fn new(user: Address, market: MarketId) -> Self {
        Self { user, market }
    }
}

impl fmt::Display for AccountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.user.short(), self.market)
    }
}

/// Where a balance lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BalancePath {
    /// The user's wallet balance, outside any market
    Wallet(Address),
    /// A collateral account inside a market
    Collateral(AccountKey),
}

impl BalancePath {
    /// Owner of the balance
    pub fn user(&self) -> Address {
        match self {
            BalancePath::Wallet(user) => *user,
            BalancePath::Collateral(key) => key.user,
        }
    }

    /// Collateral account behind this path, if any
    pub fn account(&self) -> Option<AccountKey> {
        match self {
            BalancePath::Wallet(_) => None,
            BalancePath::Collateral(key) => Some(*key),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// BALANCES
// ═══════════════════════════════════════════════════════════════════════════════

/// Non-negative per-asset balances, used by wallets and collateral accounts
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balances(BTreeMap<AssetId, Decimal>);

impl Balances {
    /// Empty balances
    pub fn new() -> Self {
        Self::default()
    }

    /// Balance of one asset
    pub fn get(&self, asset: AssetId) -> Decimal {
        self.0.get(&asset).copied().unwrap_or(Decimal::ZERO)
    }

    /// Non-zero balances in ascending asset order
    pub fn iter(&self) -> impl Iterator<Item = (AssetId, Decimal)> + '_ {
        self.0
            .iter()
            .filter(|(_, amount)| !amount.is_zero())
            .map(|(asset, amount)| (*asset, *amount))
    }

    /// Whether every balance is zero
    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }

    /// Add to a balance
    pub fn credit(&mut self, asset: AssetId, amount: Decimal) -> Result<()> {
        if amount.is_zero() {
            return Ok(());
        }
        let updated = safe_add(self.get(asset), amount)?;
        self.0.insert(asset, updated);
        Ok(())
    }

    /// Remove from a balance; never lets it go negative
    pub fn debit(&mut self, asset: AssetId, amount: Decimal) -> Result<()> {
        let available = self.get(asset);
        if amount > available {
            return Err(Error::InsufficientBalance {
                required: amount,
                available,
            });
        }
        let updated = safe_sub(available, amount)?;
        if updated.is_zero() {
            self.0.remove(&asset);
        } else {
            self.0.insert(asset, updated);
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// COLLATERAL ACCOUNT
// ═══════════════════════════════════════════════════════════════════════════════

/// Balances of one user in one market
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollateralAccount {
    /// Account key
    pub key: AccountKey,
    status: AccountStatus,
    balances: Balances,
}

impl CollateralAccount {
    /// Create an empty, unlocked account
    pub fn new(key: AccountKey) -> Self {
        Self {
            key,
            status: AccountStatus::Normal,
            balances: Balances::new(),
        }
    }

    /// Current lock state
    pub fn status(&self) -> AccountStatus {
        self.status
    }

    /// Single guard consulted by every externally triggered balance mutation
    pub fn ensure_operable(&self) -> Result<()> {
        if self.status.is_liquid() {
            return Err(Error::AccountLocked(self.key.to_string()));
        }
        Ok(())
    }

    /// Balance of one asset
    pub fn balance(&self, asset: AssetId) -> Decimal {
        self.balances.get(asset)
    }

    /// Non-zero balances in ascending asset order
    pub fn balances(&self) -> impl Iterator<Item = (AssetId, Decimal)> + '_ {
        self.balances.iter()
    }

    /// Whether every balance is zero
    pub fn is_empty(&self) -> bool {
        self.balances.is_empty()
    }

    /// Add to a balance
    pub fn credit(&mut self, asset: AssetId, amount: Decimal) -> Result<()> {
        self.balances.credit(asset, amount)
    }

    /// Remove from a balance
    pub fn debit(&mut self, asset: AssetId, amount: Decimal) -> Result<()> {
        self.balances.debit(asset, amount)
    }

    pub(crate) fn lock(&mut self) {
        self.status = AccountStatus::Liquid;
    }

    pub(crate) fn unlock(&mut self) {
        self.status = AccountStatus::Normal;
    }
}
