//! Position valuation.
//!
//! Converts a collateral account's balances and its pool debts into USD
//! totals using the oracle. Read-only: safe to call at any time, including
//! while the account is being liquidated.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::core::account::{AccountKey, CollateralAccount};
use crate::core::market::Market;
use crate::error::Result;
use crate::oracle::price_feed::PriceOracle;
use crate::pool::lending_pool::LendingPool;
use crate::utils::math::*;

/// USD totals of a collateral account
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Valuation {
    /// Sum of balance × price over the market's assets
    pub balances_total_usd: Decimal,
    /// Sum of accrued debt × price over the market's assets
    pub debts_total_usd: Decimal,
}

impl Valuation {
    /// Collateral/debt percentage, `None` without debt
    pub fn ratio_pct(&self) -> Result<Option<Decimal>> {
        collateral_ratio_pct(self.balances_total_usd, self.debts_total_usd)
    }

    /// Whether the position is below `liquidate_rate`; zero debt never is
    pub fn is_below(&self, liquidate_rate: Decimal) -> Result<bool> {
        if self.debts_total_usd.is_zero() {
            return Ok(false);
        }
        Ok(!meets_rate(self.balances_total_usd, self.debts_total_usd, liquidate_rate)?)
    }

    /// Whether the position satisfies `rate` (used for borrow/withdraw checks)
    pub fn satisfies(&self, rate: Decimal) -> Result<bool> {
        meets_rate(self.balances_total_usd, self.debts_total_usd, rate)
    }
}

/// Value an account against current oracle prices and debts accrued to `now`.
///
/// A missing account values at zero on the balance side. Prices are only
/// requested for assets with a non-zero amount.
pub fn valuate<O>(
    account: Option<&CollateralAccount>,
    key: AccountKey,
    market: &Market,
    pool: &LendingPool,
    oracle: &O,
    now: u64,
) -> Result<Valuation>
where
    O: PriceOracle + ?Sized,
{
    let mut valuation = Valuation::default();

    for &asset in market.assets() {
        let balance = account.map(|a| a.balance(asset)).unwrap_or(Decimal::ZERO);
        let debt = pool.borrow_of(asset, key, now)?;
        if balance.is_zero() && debt.is_zero() {
            continue;
        }

        let price = oracle.price(asset)?;
        valuation.balances_total_usd = safe_add(valuation.balances_total_usd, usd_value(balance, price)?)?;
        valuation.debts_total_usd = safe_add(valuation.debts_total_usd, usd_value(debt, price)?)?;
    }

    Ok(valuation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::asset::AssetId;
    use crate::core::market::{MarketConfig, MarketId};
    use crate::oracle::price_feed::PriceFeed;
    use crate::pool::rate_model::RateModel;
    use crate::utils::address::Address;
    use crate::utils::constants::DEFAULT_INSURANCE_RATIO;
    use proptest::prelude::*;

    const ETH: AssetId = AssetId(1);
    const USD: AssetId = AssetId(2);

    struct Fixture {
        market: Market,
        pool: LendingPool,
        feed: PriceFeed,
        account: CollateralAccount,
    }

    fn fixture(eth_price: i64, borrowed: i64) -> Fixture {
        let market = Market::from_config(MarketId(1), MarketConfig::new(vec![ETH, USD])).unwrap();
        let mut pool = LendingPool::new(RateModel::default(), DEFAULT_INSURANCE_RATIO).unwrap();
        pool.list_asset(ETH, 18, 0);
        pool.list_asset(USD, 18, 0);
        pool.supply(USD, Address::from_label("u1"), Decimal::from(10_000), 0).unwrap();

        let key = AccountKey::new(Address::from_label("u2"), market.id);
        let mut account = CollateralAccount::new(key);
        account.credit(ETH, Decimal::ONE).unwrap();
        if borrowed > 0 {
            pool.borrow(USD, key, Decimal::from(borrowed), 0).unwrap();
            account.credit(USD, Decimal::from(borrowed)).unwrap();
        }

        let mut feed = PriceFeed::new();
        feed.set_price(ETH, Decimal::from(eth_price), 0).unwrap();
        feed.set_price(USD, Decimal::ONE, 0).unwrap();

        Fixture { market, pool, feed, account }
    }

    fn value(f: &Fixture) -> Valuation {
        valuate(Some(&f.account), f.account.key, &f.market, &f.pool, &f.feed, 0).unwrap()
    }

    #[test]
    fn test_no_debt_is_never_below() {
        let f = fixture(100, 0);
        let v = value(&f);
        assert_eq!(v.balances_total_usd, Decimal::from(100));
        assert_eq!(v.debts_total_usd, Decimal::ZERO);
        assert!(!v.is_below(f.market.liquidate_rate).unwrap());
        assert_eq!(v.ratio_pct().unwrap(), None);
    }

    #[test]
    fn test_threshold() {
        let healthy = value(&fixture(100, 100));
        assert_eq!(healthy.balances_total_usd, Decimal::from(200));
        assert_eq!(healthy.debts_total_usd, Decimal::from(100));
        assert!(!healthy.is_below(Decimal::from(120)).unwrap());
        assert!(healthy.satisfies(Decimal::from(200)).unwrap());

        let unsafe_position = value(&fixture(10, 100));
        assert_eq!(unsafe_position.balances_total_usd, Decimal::from(110));
        assert!(unsafe_position.is_below(Decimal::from(120)).unwrap());
        assert_eq!(unsafe_position.ratio_pct().unwrap(), Some(Decimal::from(110)));
    }

    #[test]
    fn test_missing_account_values_balances_at_zero() {
        let f = fixture(100, 0);
        let key = AccountKey::new(Address::from_label("nobody"), f.market.id);
        let v = valuate(None, key, &f.market, &f.pool, &f.feed, 0).unwrap();
        assert_eq!(v, Valuation::default());
    }

    #[test]
    fn test_missing_price_fails_only_when_needed() {
        let mut f = fixture(100, 0);
        f.feed = PriceFeed::new();
        f.feed.set_price(ETH, Decimal::from(100), 0).unwrap();
        // no USD balance or debt, so no USD price is needed
        assert!(valuate(Some(&f.account), f.account.key, &f.market, &f.pool, &f.feed, 0).is_ok());

        f.account.credit(USD, Decimal::ONE).unwrap();
        assert!(valuate(Some(&f.account), f.account.key, &f.market, &f.pool, &f.feed, 0).is_err());
    }

    proptest! {
        #[test]
        fn prop_debt_price_increase_only_raises_debt_value(
            base in 1i64..1_000_000,
            bump in 1i64..1_000_000,
        ) {
            let mut f = fixture(100, 100);
            // borrowed funds spent elsewhere: only ETH backs the debt
            f.account.debit(USD, Decimal::from(100)).unwrap();

            f.feed.set_price(USD, Decimal::new(base, 4), 0).unwrap();
            let before = value(&f);
            f.feed.set_price(USD, Decimal::new(base + bump, 4), 0).unwrap();
            let after = value(&f);

            prop_assert!(after.debts_total_usd > before.debts_total_usd);
            prop_assert_eq!(before.balances_total_usd, after.balances_total_usd);
        }

        #[test]
        fn prop_collateral_price_never_changes_debt_value(eth in 1i64..1_000_000) {
            let mut f = fixture(100, 100);
            let before = value(&f);
            f.feed.set_price(ETH, Decimal::from(eth), 0).unwrap();
            let after = value(&f);
            prop_assert_eq!(before.debts_total_usd, after.debts_total_usd);
        }
    }
}
