//! Ledger orchestrating markets, accounts, the pool and auctions.
//!
//! The [`Ledger`] is the single entry point for callers. Every
//! state-changing operation runs inside `Ledger::transact`: the state is
//! snapshotted first and restored if the operation fails, so no partial
//! effect is ever observable. Operations are applied one at a time and take
//! the current time explicitly.
//!
//! The oracle is not part of the persisted state; it is supplied when the
//! ledger is created or restored.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::core::account::{AccountKey, AccountStatus, BalancePath, Balances, CollateralAccount};
use crate::core::asset::{Asset, AssetId};
use crate::core::config::EngineConfig;
use crate::core::market::{Market, MarketConfig, MarketId};
use crate::error::{Error, Result};
use crate::liquidation::auction::{AuctionBook, AuctionId};
use crate::liquidation::engine::{FillOutcome, LiquidationEngine, LiquidationOutcome, LiquidationStats};
use crate::liquidation::valuation::{valuate, Valuation};
use crate::oracle::price_feed::PriceOracle;
use crate::pool::lending_pool::LendingPool;
use crate::protocol::events::*;
use crate::utils::address::Address;
use crate::utils::validation::{validate_amount, validate_precision};

// ═══════════════════════════════════════════════════════════════════════════════
// QUERY RESULTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Health summary of a collateral account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountDetails {
    /// Whether `liquidate_account` would act on it now
    pub liquidable: bool,
    /// Lock state
    pub status: AccountStatus,
    /// Accrued debt in USD
    pub debts_total_usd: Decimal,
    /// Balances in USD
    pub balances_total_usd: Decimal,
}

/// Current view of an auction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuctionDetails {
    /// Asset bidders repay
    pub debt_asset: AssetId,
    /// Asset bidders receive
    pub collateral_asset: AssetId,
    /// Collateral still for sale
    pub left_collateral_amount: Decimal,
    /// Debt still to be repaid
    pub left_debt_amount: Decimal,
    /// Sale ratio at the queried time
    pub ratio: Decimal,
}

// ═══════════════════════════════════════════════════════════════════════════════
// LEDGER STATE
// ═══════════════════════════════════════════════════════════════════════════════

/// Everything the ledger persists
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct LedgerState {
    /// Engine configuration
    config: EngineConfig,
    /// Listed assets
    assets: BTreeMap<AssetId, Asset>,
    /// Created markets
    markets: BTreeMap<MarketId, Market>,
    /// Collateral accounts, created on first use
    accounts: BTreeMap<AccountKey, CollateralAccount>,
    /// Balances held outside any market
    wallets: BTreeMap<Address, Balances>,
    /// Interest-bearing pool
    pool: LendingPool,
    /// All auctions ever created
    auctions: AuctionBook,
    /// Liquidation controller
    engine: LiquidationEngine,
    /// Recent events
    events: EventLog,
}

impl LedgerState {
    fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let pool = LendingPool::new(config.rate_model, config.insurance_ratio)?;
        let engine = LiquidationEngine::new(config.auction);
        let events = EventLog::new(config.max_events);

        Ok(Self {
            config,
            assets: BTreeMap::new(),
            markets: BTreeMap::new(),
            accounts: BTreeMap::new(),
            wallets: BTreeMap::new(),
            pool,
            auctions: AuctionBook::new(),
            engine,
            events,
        })
    }

    fn asset(&self, id: AssetId) -> Result<&Asset> {
        self.assets.get(&id).ok_or(Error::UnknownAsset(id.0))
    }

    fn market(&self, id: MarketId) -> Result<&Market> {
        self.markets.get(&id).ok_or(Error::UnknownMarket(id.0))
    }

    /// Positive amount within the asset's precision
    fn check_amount(&self, asset: AssetId, amount: Decimal, name: &str) -> Result<()> {
        validate_amount(amount, name)?;
        validate_precision(amount, self.asset(asset)?.decimals, name)
    }

    /// Guard shared by every externally triggered collateral mutation
    fn operable_account(&mut self, key: AccountKey, asset: AssetId) -> Result<&mut CollateralAccount> {
        self.market(key.market)?.ensure_listed(asset)?;

        let account = self
            .accounts
            .entry(key)
            .or_insert_with(|| CollateralAccount::new(key));
        if let Err(e) = account.ensure_operable() {
            tracing::warn!(%key, %asset, "rejected operation on liquidating account");
            return Err(e);
        }
        Ok(account)
    }

    fn valuation<O>(&self, key: AccountKey, oracle: &O, now: u64) -> Result<Valuation>
    where
        O: PriceOracle + ?Sized,
    {
        let market = self.market(key.market)?;
        valuate(self.accounts.get(&key), key, market, &self.pool, oracle, now)
    }

    /// Fail unless the account meets its market's withdraw rate
    fn ensure_withdraw_rate<O>(&self, key: AccountKey, oracle: &O, now: u64) -> Result<()>
    where
        O: PriceOracle + ?Sized,
    {
        if !self.pool.has_debt(key) {
            return Ok(());
        }
        let minimum = self.market(key.market)?.withdraw_rate;
        let valuation = self.valuation(key, oracle, now)?;
        if !valuation.satisfies(minimum)? {
            return Err(Error::CollateralizationRatioTooLow {
                current: valuation.ratio_pct()?.unwrap_or_default(),
                minimum,
            });
        }
        Ok(())
    }

    fn debit_path(&mut self, path: BalancePath, asset: AssetId, amount: Decimal) -> Result<()> {
        match path {
            BalancePath::Wallet(user) => self.wallets.entry(user).or_default().debit(asset, amount),
            BalancePath::Collateral(key) => self.operable_account(key, asset)?.debit(asset, amount),
        }
    }

    fn credit_path(&mut self, path: BalancePath, asset: AssetId, amount: Decimal) -> Result<()> {
        match path {
            BalancePath::Wallet(user) => self.wallets.entry(user).or_default().credit(asset, amount),
            BalancePath::Collateral(key) => self.operable_account(key, asset)?.credit(asset, amount),
        }
    }
}

/// Id for the market created after `existing` markets
fn next_market_id(existing: usize) -> Result<MarketId> {
    u16::try_from(existing)
        .ok()
        .and_then(|n| n.checked_add(1))
        .map(MarketId)
        .ok_or(Error::Overflow {
            operation: "market id".into(),
        })
}

// ═══════════════════════════════════════════════════════════════════════════════
// LEDGER
// ═══════════════════════════════════════════════════════════════════════════════

/// Margin ledger priced by an oracle `O`
#[derive(Debug, Clone)]
pub struct Ledger<O> {
    state: LedgerState,
    oracle: O,
}

impl<O: PriceOracle> Ledger<O> {
    /// Create an empty ledger
    pub fn new(config: EngineConfig, oracle: O) -> Result<Self> {
        Ok(Self {
            state: LedgerState::new(config)?,
            oracle,
        })
    }

    /// Run `op` atomically: on error the state is restored to what it was before.
    fn transact<T, F>(&mut self, op: F) -> Result<T>
    where
        F: FnOnce(&mut LedgerState, &O) -> Result<T>,
    {
        let snapshot = self.state.clone();
        match op(&mut self.state, &self.oracle) {
            Ok(value) => Ok(value),
            Err(e) => {
                tracing::debug!(error = %e, code = e.code(), "operation reverted");
                self.state = snapshot;
                Err(e)
            }
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // ACCESSORS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Engine configuration
    pub fn config(&self) -> &EngineConfig {
        &self.state.config
    }

    /// Price oracle
    pub fn oracle(&self) -> &O {
        &self.oracle
    }

    /// Price oracle, for publishing prices
    pub fn oracle_mut(&mut self) -> &mut O {
        &mut self.oracle
    }

    /// Interest pool
    pub fn pool(&self) -> &LendingPool {
        &self.state.pool
    }

    /// Auction book
    pub fn auctions(&self) -> &AuctionBook {
        &self.state.auctions
    }

    /// Recent events
    pub fn events(&self) -> &EventLog {
        &self.state.events
    }

    /// Liquidation statistics
    pub fn statistics(&self) -> LiquidationStats {
        self.state.engine.statistics()
    }

    /// A listed asset
    pub fn asset(&self, id: AssetId) -> Result<&Asset> {
        self.state.asset(id)
    }

    /// A created market
    pub fn market(&self, id: MarketId) -> Result<&Market> {
        self.state.market(id)
    }

    /// A collateral account, if it was ever used
    pub fn account(&self, user: Address, market: MarketId) -> Option<&CollateralAccount> {
        self.state.accounts.get(&AccountKey::new(user, market))
    }

    /// Balance of a collateral account
    pub fn collateral_balance(&self, user: Address, market: MarketId, asset: AssetId) -> Decimal {
        self.account(user, market)
            .map(|a| a.balance(asset))
            .unwrap_or(Decimal::ZERO)
    }

    /// Wallet balance of a user
    pub fn wallet_balance(&self, user: Address, asset: AssetId) -> Decimal {
        self.state
            .wallets
            .get(&user)
            .map(|w| w.get(asset))
            .unwrap_or(Decimal::ZERO)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // REGISTRY
    // ═══════════════════════════════════════════════════════════════════════════

    /// List an asset and open its pool
    pub fn create_asset(&mut self, asset: Asset, now: u64) -> Result<()> {
        self.transact(|state, _| {
            if state.assets.contains_key(&asset.id) {
                return Err(Error::InvalidParameter {
                    name: "asset".into(),
                    reason: format!("{} already exists", asset.id),
                });
            }
            state.pool.list_asset(asset.id, asset.decimals, now);
            tracing::info!(
                id = %asset.id,
                symbol = %asset.symbol,
                decimals = asset.decimals,
                collateral_rate = asset.collateral_rate,
                "asset created"
            );
            state.assets.insert(asset.id, asset);
            Ok(())
        })
    }

    /// Create a market over already listed assets
    pub fn create_market(&mut self, config: MarketConfig) -> Result<MarketId> {
        self.transact(|state, _| {
            for &asset in &config.assets {
                state.asset(asset)?;
            }
            let id = next_market_id(state.markets.len())?;
            let market = Market::from_config(id, config)?;
            tracing::info!(
                %id,
                liquidate_rate = %market.liquidate_rate,
                withdraw_rate = %market.withdraw_rate,
                assets = market.assets().len(),
                "market created"
            );
            state.markets.insert(id, market);
            Ok(id)
        })
    }

    /// Mint wallet funds (fixtures and bridges)
    pub fn credit_wallet(&mut self, user: Address, asset: AssetId, amount: Decimal) -> Result<()> {
        self.transact(|state, _| {
            state.check_amount(asset, amount, "credit")?;
            state.wallets.entry(user).or_default().credit(asset, amount)
        })
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // ACCOUNT OPERATIONS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Move wallet funds into a collateral account
    pub fn deposit(&mut self, user: Address, market: MarketId, asset: AssetId, amount: Decimal, now: u64) -> Result<()> {
        self.transact(|state, _| {
            state.check_amount(asset, amount, "deposit")?;
            let key = AccountKey::new(user, market);
            state.operable_account(key, asset)?;

            state.wallets.entry(user).or_default().debit(asset, amount)?;
            state.operable_account(key, asset)?.credit(asset, amount)?;

            tracing::debug!(%key, %asset, %amount, "deposited");
            state.events.push(LedgerEvent::Deposited(BalanceEvent {
                account: key,
                asset,
                amount,
                timestamp: now,
            }));
            Ok(())
        })
    }

    /// Move collateral back to the wallet, keeping the withdraw rate
    pub fn withdraw(&mut self, user: Address, market: MarketId, asset: AssetId, amount: Decimal, now: u64) -> Result<()> {
        self.transact(|state, oracle| {
            state.check_amount(asset, amount, "withdraw")?;
            let key = AccountKey::new(user, market);

            state.operable_account(key, asset)?.debit(asset, amount)?;
            state.wallets.entry(user).or_default().credit(asset, amount)?;
            state.ensure_withdraw_rate(key, oracle, now)?;

            tracing::debug!(%key, %asset, %amount, "withdrawn");
            state.events.push(LedgerEvent::Withdrawn(BalanceEvent {
                account: key,
                asset,
                amount,
                timestamp: now,
            }));
            Ok(())
        })
    }

    /// Move funds between two balance paths of the same user
    pub fn transfer(&mut self, asset: AssetId, from: BalancePath, to: BalancePath, amount: Decimal, now: u64) -> Result<()> {
        self.transact(|state, oracle| {
            state.check_amount(asset, amount, "transfer")?;
            if from.user() != to.user() {
                tracing::warn!(from = %from.user(), to = %to.user(), "cross-user transfer rejected");
                return Err(Error::InvalidParameter {
                    name: "to".into(),
                    reason: "transfer destination belongs to a different user".into(),
                });
            }
            if let BalancePath::Collateral(key) = to {
                state.operable_account(key, asset)?;
            }

            state.debit_path(from, asset, amount)?;
            state.credit_path(to, asset, amount)?;
            if let Some(key) = from.account() {
                state.ensure_withdraw_rate(key, oracle, now)?;
            }

            state.events.push(LedgerEvent::Transferred(TransferEvent {
                from,
                to,
                asset,
                amount,
                timestamp: now,
            }));
            Ok(())
        })
    }

    /// Borrow from the pool into the collateral account
    pub fn borrow(&mut self, user: Address, market: MarketId, asset: AssetId, amount: Decimal, now: u64) -> Result<()> {
        self.transact(|state, oracle| {
            state.check_amount(asset, amount, "borrow")?;
            let key = AccountKey::new(user, market);
            state.operable_account(key, asset)?;

            state.pool.borrow(asset, key, amount, now)?;
            state.operable_account(key, asset)?.credit(asset, amount)?;
            state.ensure_withdraw_rate(key, oracle, now)?;

            tracing::info!(%key, %asset, %amount, "borrowed");
            state.events.push(LedgerEvent::Borrowed(BalanceEvent {
                account: key,
                asset,
                amount,
                timestamp: now,
            }));
            Ok(())
        })
    }

    /// Repay pool debt from the collateral account; returns the amount applied
    pub fn repay(&mut self, user: Address, market: MarketId, asset: AssetId, amount: Decimal, now: u64) -> Result<Decimal> {
        self.transact(|state, _| {
            state.check_amount(asset, amount, "repay")?;
            let key = AccountKey::new(user, market);
            state.operable_account(key, asset)?;

            let applied = state.pool.repay(asset, key, amount, now)?;
            state.operable_account(key, asset)?.debit(asset, applied)?;

            tracing::info!(%key, %asset, %applied, "repaid");
            state.events.push(LedgerEvent::Repaid(BalanceEvent {
                account: key,
                asset,
                amount: applied,
                timestamp: now,
            }));
            Ok(applied)
        })
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // POOL OPERATIONS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Supply wallet funds to the pool
    pub fn supply_pool(&mut self, user: Address, asset: AssetId, amount: Decimal, now: u64) -> Result<()> {
        self.transact(|state, _| {
            state.check_amount(asset, amount, "supply")?;
            state.wallets.entry(user).or_default().debit(asset, amount)?;
            state.pool.supply(asset, user, amount, now)?;
            tracing::debug!(user = %user.short(), %asset, %amount, "supplied");
            Ok(())
        })
    }

    /// Withdraw supplied funds back to the wallet
    pub fn withdraw_pool(&mut self, user: Address, asset: AssetId, amount: Decimal, now: u64) -> Result<()> {
        self.transact(|state, _| {
            state.check_amount(asset, amount, "withdraw")?;
            let released = state.pool.withdraw_supply(asset, user, amount, now)?;
            state.wallets.entry(user).or_default().credit(asset, released)?;
            tracing::debug!(user = %user.short(), %asset, %released, "supply withdrawn");
            Ok(())
        })
    }

    /// Liquidity supplied by a user, interest included
    pub fn pool_supply_of(&self, user: Address, asset: AssetId, now: u64) -> Result<Decimal> {
        self.state.pool.supply_of(asset, user, now)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // QUERIES
    // ═══════════════════════════════════════════════════════════════════════════

    /// Valuation and lock state of an account
    pub fn get_account_details(&self, user: Address, market: MarketId, now: u64) -> Result<AccountDetails> {
        let key = AccountKey::new(user, market);
        let account = self.state.accounts.get(&key);
        let valuation = self.state.valuation(key, &self.oracle, now)?;
        let liquidable = self
            .state
            .engine
            .is_liquidable(account, &valuation, self.state.market(market)?)?;

        Ok(AccountDetails {
            liquidable,
            status: account.map(|a| a.status()).unwrap_or_default(),
            debts_total_usd: valuation.debts_total_usd,
            balances_total_usd: valuation.balances_total_usd,
        })
    }

    /// Debt of an account in one asset, accrued to `now`
    pub fn get_pool_borrow_of(&self, asset: AssetId, user: Address, market: MarketId, now: u64) -> Result<Decimal> {
        self.state.market(market)?.ensure_listed(asset)?;
        self.state.pool.borrow_of(asset, AccountKey::new(user, market), now)
    }

    /// Number of auctions ever created
    pub fn get_auctions_count(&self) -> usize {
        self.state.auctions.count()
    }

    /// Current view of an auction
    pub fn get_auction_details(&self, id: AuctionId, now: u64) -> Result<AuctionDetails> {
        let auction = self.state.auctions.get(id)?;
        Ok(AuctionDetails {
            debt_asset: auction.debt_asset,
            collateral_asset: auction.collateral_asset,
            left_collateral_amount: auction.left_collateral_amount,
            left_debt_amount: auction.left_debt_amount,
            ratio: auction.ratio_at(self.state.engine.ramp(), now)?,
        })
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // LIQUIDATION
    // ═══════════════════════════════════════════════════════════════════════════

    /// Liquidate an account if it is liquidable; a no-op otherwise
    pub fn liquidate_account(&mut self, user: Address, market: MarketId, now: u64) -> Result<LiquidationOutcome> {
        self.transact(|state, oracle| {
            let key = AccountKey::new(user, market);
            let market = state.markets.get(&market).ok_or(Error::UnknownMarket(market.0))?;

            let account = match state.accounts.get_mut(&key) {
                Some(account) => account,
                None => {
                    let valuation = valuate(None, key, market, &state.pool, oracle, now)?;
                    return Ok(LiquidationOutcome::Skipped(valuation));
                }
            };

            let outcome = state.engine.liquidate_account(
                account,
                market,
                &state.assets,
                &mut state.pool,
                &mut state.auctions,
                oracle,
                now,
            )?;

            let report = match outcome.report() {
                Some(report) => report,
                None => return Ok(outcome),
            };

            state.events.push(LedgerEvent::AccountLiquidated(AccountLiquidatedEvent {
                account: key,
                balances_total_usd: report.valuation.balances_total_usd,
                debts_total_usd: report.valuation.debts_total_usd,
                resolved: matches!(outcome, LiquidationOutcome::Resolved(_)),
                timestamp: now,
            }));
            for &id in &report.auctions {
                let auction = state.auctions.get(id)?;
                state.events.push(LedgerEvent::AuctionCreated(AuctionCreatedEvent {
                    auction: id,
                    account: key,
                    debt_asset: auction.debt_asset,
                    collateral_asset: auction.collateral_asset,
                    debt_amount: auction.initial_debt_amount,
                    collateral_amount: auction.initial_collateral_amount,
                    timestamp: now,
                }));
            }
            for bad in &report.bad_debt {
                state.events.push(LedgerEvent::BadDebtWrittenOff(BadDebtEvent {
                    account: key,
                    asset: bad.asset,
                    covered_by_insurance: bad.absorbed.covered_by_insurance,
                    socialized_loss: bad.absorbed.socialized_loss,
                    timestamp: now,
                }));
            }
            Ok(outcome)
        })
    }

    /// Repay `offered` debt of an auction from the bidder's wallet for discounted collateral
    pub fn fill_auction(&mut self, bidder: Address, id: AuctionId, offered: Decimal, now: u64) -> Result<FillOutcome> {
        self.transact(|state, _| {
            let auction = state.auctions.get(id)?;
            let key = auction.borrower;
            state.check_amount(auction.debt_asset, offered, "offered")?;

            let borrower = state
                .accounts
                .get_mut(&key)
                .ok_or_else(|| Error::InvariantViolation(format!("{} has no account {}", id, key)))?;
            let wallet = state.wallets.entry(bidder).or_default();

            let outcome = state.engine.fill_auction(
                id,
                offered,
                wallet,
                borrower,
                &mut state.pool,
                &mut state.auctions,
                &state.assets,
                now,
            )?;

            state.events.push(LedgerEvent::AuctionFilled(AuctionFilledEvent {
                auction: id,
                bidder,
                ratio: outcome.ratio,
                debt_amount: outcome.accepted_debt,
                collateral_amount: outcome.released_collateral,
                timestamp: now,
            }));
            if let Some(bad) = outcome.bad_debt {
                state.events.push(LedgerEvent::BadDebtWrittenOff(BadDebtEvent {
                    account: key,
                    asset: bad.asset,
                    covered_by_insurance: bad.absorbed.covered_by_insurance,
                    socialized_loss: bad.absorbed.socialized_loss,
                    timestamp: now,
                }));
            }
            if outcome.finished {
                state.events.push(LedgerEvent::AuctionFinished(AuctionFinishedEvent {
                    auction: id,
                    account_released: outcome.account_released,
                    timestamp: now,
                }));
            }
            Ok(outcome)
        })
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // PERSISTENCE
    // ═══════════════════════════════════════════════════════════════════════════

    /// Serialize the state (the oracle is not included)
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        bincode::serialize(&self.state).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Restore a ledger from [`Ledger::to_bytes`] output
    pub fn from_bytes(bytes: &[u8], oracle: O) -> Result<Self> {
        let state: LedgerState = bincode::deserialize(bytes).map_err(|e| Error::Deserialization(e.to_string()))?;
        state.config.validate()?;
        Ok(Self { state, oracle })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::price_feed::PriceFeed;
    use std::str::FromStr;

    const ETH: AssetId = AssetId(1);
    const USD: AssetId = AssetId(2);

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn ledger() -> (Ledger<PriceFeed>, MarketId) {
        let mut feed = PriceFeed::new();
        feed.set_price(ETH, d("100"), 0).unwrap();
        feed.set_price(USD, Decimal::ONE, 0).unwrap();

        let mut ledger = Ledger::new(EngineConfig::default(), feed).unwrap();
        ledger.create_asset(Asset::new(ETH, "ETH"), 0).unwrap();
        ledger.create_asset(Asset::new(USD, "USD"), 0).unwrap();
        let market = ledger.create_market(MarketConfig::new(vec![ETH, USD])).unwrap();
        (ledger, market)
    }

    #[test]
    fn test_registry_validation() {
        let (mut ledger, market) = ledger();
        assert_eq!(market, MarketId(1));
        assert!(ledger.create_asset(Asset::new(ETH, "ETH2"), 0).is_err());
        assert_eq!(
            ledger.create_market(MarketConfig::new(vec![ETH, AssetId(9)])),
            Err(Error::UnknownAsset(9))
        );
    }

    #[test]
    fn test_failed_operation_is_reverted() {
        let (mut ledger, market) = ledger();
        let user = Address::from_label("u2");
        ledger.credit_wallet(user, ETH, Decimal::ONE).unwrap();
        ledger.deposit(user, market, ETH, Decimal::ONE, 0).unwrap();
        let before = ledger.to_bytes().unwrap();

        // no USD supplied: the pool cannot lend
        let err = ledger.borrow(user, market, USD, d("10"), 0).unwrap_err();
        assert!(matches!(err, Error::InsufficientLiquidity { .. }));
        assert_eq!(ledger.to_bytes().unwrap(), before);
    }

    #[test]
    fn test_withdraw_rate_guards_borrow_and_withdraw() {
        let (mut ledger, market) = ledger();
        let (u1, u2) = (Address::from_label("u1"), Address::from_label("u2"));
        ledger.credit_wallet(u1, USD, d("1000")).unwrap();
        ledger.supply_pool(u1, USD, d("1000"), 0).unwrap();
        ledger.credit_wallet(u2, ETH, Decimal::ONE).unwrap();
        ledger.deposit(u2, market, ETH, Decimal::ONE, 0).unwrap();

        // 100 + 101 < 2 * 101
        assert!(matches!(
            ledger.borrow(u2, market, USD, d("101"), 0),
            Err(Error::CollateralizationRatioTooLow { .. })
        ));
        ledger.borrow(u2, market, USD, d("100"), 0).unwrap();
        assert!(ledger.withdraw(u2, market, ETH, d("0.5"), 0).is_err());
        assert_eq!(ledger.collateral_balance(u2, market, ETH), Decimal::ONE);

        assert_eq!(ledger.repay(u2, market, USD, d("150"), 0).unwrap(), d("100"));
        ledger.withdraw(u2, market, ETH, Decimal::ONE, 0).unwrap();
        assert_eq!(ledger.wallet_balance(u2, ETH), Decimal::ONE);
        assert_eq!(ledger.events().filter_by_type("Withdrawn").len(), 1);
    }

    #[test]
    fn test_missing_account_liquidation_is_skipped() {
        let (mut ledger, market) = ledger();
        let outcome = ledger
            .liquidate_account(Address::from_label("nobody"), market, 0)
            .unwrap();
        assert!(matches!(outcome, LiquidationOutcome::Skipped(_)));
        assert!(ledger.events().is_empty());
        assert!(ledger.account(Address::from_label("nobody"), market).is_none());
    }

    #[test]
    fn test_amount_precision_is_enforced() {
        let mut feed = PriceFeed::new();
        feed.set_price(USD, Decimal::ONE, 0).unwrap();
        let mut ledger = Ledger::new(EngineConfig::default(), feed).unwrap();
        ledger
            .create_asset(Asset::new(USD, "USD").with_decimals(6).unwrap(), 0)
            .unwrap();

        let user = Address::from_label("u1");
        assert!(ledger.credit_wallet(user, USD, d("0.0000001")).is_err());
        ledger.credit_wallet(user, USD, d("0.000001")).unwrap();
        assert_eq!(ledger.wallet_balance(user, USD), d("0.000001"));
    }

    #[test]
    fn test_market_ids_never_wrap() {
        assert_eq!(next_market_id(0), Ok(MarketId(1)));
        assert_eq!(next_market_id(65_534), Ok(MarketId(u16::MAX)));
        assert!(matches!(next_market_id(65_535), Err(Error::Overflow { .. })));
        assert!(matches!(next_market_id(70_000), Err(Error::Overflow { .. })));
    }

    #[test]
    fn test_transfer_stays_within_one_user() {
        let (mut ledger, market) = ledger();
        let (u1, u2) = (Address::from_label("u1"), Address::from_label("u2"));
        ledger.credit_wallet(u1, USD, d("20000")).unwrap();

        let err = ledger
            .transfer(USD, BalancePath::Wallet(u1), BalancePath::Wallet(u2), d("20000"), 0)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidParameter { .. }));
        let err = ledger
            .transfer(
                USD,
                BalancePath::Wallet(u1),
                BalancePath::Collateral(AccountKey::new(u2, market)),
                d("1"),
                0,
            )
            .unwrap_err();
        assert!(matches!(err, Error::InvalidParameter { .. }));
        assert_eq!(ledger.wallet_balance(u1, USD), d("20000"));
        assert_eq!(ledger.wallet_balance(u2, USD), Decimal::ZERO);
        assert!(ledger.account(u2, market).is_none());

        ledger
            .transfer(
                USD,
                BalancePath::Wallet(u1),
                BalancePath::Collateral(AccountKey::new(u1, market)),
                d("500"),
                0,
            )
            .unwrap();
        assert_eq!(ledger.collateral_balance(u1, market, USD), d("500"));
        assert_eq!(ledger.events().filter_by_type("Transferred").len(), 1);
    }
}
