//! Integration tests for the margin ledger.
//!
//! These tests drive a full ETH/USD market through borrowing, liquidation
//! and auction settlement using only the public API.

use hydra_margin::prelude::*;
use hydra_margin::utils::math::truncate;
use rust_decimal::Decimal;
use std::str::FromStr;

const ETH: AssetId = AssetId(1);
const USD: AssetId = AssetId(2);
const BTC: AssetId = AssetId(3);
const DAY: u64 = 86_400;

// ═══════════════════════════════════════════════════════════════════════════════
// TEST HELPERS
// ═══════════════════════════════════════════════════════════════════════════════

fn d(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

struct Setup {
    ledger: Ledger<PriceFeed>,
    market: MarketId,
    u1: Address,
    u2: Address,
}

/// u1 supplies 10 000 USD; u2 deposits 1 ETH and borrows 100 USD at t=0
fn setup() -> Setup {
    let mut feed = PriceFeed::new();
    feed.set_price(ETH, d("100"), 0).unwrap();
    feed.set_price(USD, Decimal::ONE, 0).unwrap();

    let mut ledger = Ledger::new(EngineConfig::default(), feed).unwrap();
    ledger.create_asset(Asset::new(ETH, "ETH"), 0).unwrap();
    ledger.create_asset(Asset::new(USD, "USD"), 0).unwrap();
    let market = ledger
        .create_market(MarketConfig::new(vec![ETH, USD]).with_rates(120, 200))
        .unwrap();

    let u1 = Address::from_label("u1");
    let u2 = Address::from_label("u2");

    ledger.credit_wallet(u1, USD, d("30000")).unwrap();
    ledger.supply_pool(u1, USD, d("10000"), 0).unwrap();

    ledger.credit_wallet(u2, ETH, Decimal::ONE).unwrap();
    ledger.deposit(u2, market, ETH, Decimal::ONE, 0).unwrap();
    ledger.borrow(u2, market, USD, d("100"), 0).unwrap();

    Setup { ledger, market, u1, u2 }
}

/// Same as [`setup`] with ETH crashed to 10
fn crashed() -> Setup {
    let mut s = setup();
    s.ledger.oracle_mut().set_price(ETH, d("10"), 0).unwrap();
    s
}

/// Crashed market liquidated one day later, leaving auction 0
fn auctioned() -> Setup {
    let mut s = crashed();
    let outcome = s.ledger.liquidate_account(s.u2, s.market, DAY).unwrap();
    assert!(matches!(outcome, LiquidationOutcome::Auctioned(_)));
    s
}

// ═══════════════════════════════════════════════════════════════════════════════
// VALUATION
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_account_without_debt_is_never_liquidable() {
    let mut s = setup();
    let u3 = Address::from_label("u3");
    s.ledger.credit_wallet(u3, ETH, Decimal::ONE).unwrap();
    s.ledger.deposit(u3, s.market, ETH, Decimal::ONE, 0).unwrap();
    s.ledger.oracle_mut().set_price(ETH, Decimal::ZERO, 0).unwrap();

    let details = s.ledger.get_account_details(u3, s.market, 0).unwrap();
    assert!(!details.liquidable);
    assert_eq!(details.debts_total_usd, Decimal::ZERO);

    let outcome = s.ledger.liquidate_account(u3, s.market, 0).unwrap();
    assert!(matches!(outcome, LiquidationOutcome::Skipped(_)));
    assert_eq!(details.status, AccountStatus::Normal);
}

#[test]
fn test_threshold_correctness() {
    let s = setup();
    let details = s.ledger.get_account_details(s.u2, s.market, 0).unwrap();
    assert_eq!(details.balances_total_usd, d("200"));
    assert_eq!(details.debts_total_usd, d("100"));
    assert!(!details.liquidable);

    let s = crashed();
    let details = s.ledger.get_account_details(s.u2, s.market, 0).unwrap();
    assert_eq!(details.balances_total_usd, d("110"));
    assert!(details.liquidable);
    assert_eq!(details.status, AccountStatus::Normal);
}

#[test]
fn test_healthy_liquidation_is_a_no_op() {
    let mut s = setup();
    let before = s.ledger.to_bytes().unwrap();

    let outcome = s.ledger.liquidate_account(s.u2, s.market, 0).unwrap();
    assert!(matches!(outcome, LiquidationOutcome::Skipped(_)));
    assert_eq!(s.ledger.to_bytes().unwrap(), before);
}

// ═══════════════════════════════════════════════════════════════════════════════
// LIQUIDATION
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_exact_repay_resolves_to_normal() {
    let mut s = crashed();

    let outcome = s.ledger.liquidate_account(s.u2, s.market, 0).unwrap();
    assert!(matches!(outcome, LiquidationOutcome::Resolved(_)));

    assert_eq!(s.ledger.get_pool_borrow_of(USD, s.u2, s.market, 0).unwrap(), Decimal::ZERO);
    assert_eq!(s.ledger.get_auctions_count(), 0);

    let details = s.ledger.get_account_details(s.u2, s.market, 0).unwrap();
    assert_eq!(details.status, AccountStatus::Normal);
    assert!(!details.liquidable);
    assert_eq!(s.ledger.collateral_balance(s.u2, s.market, ETH), Decimal::ONE);

    let liquidated = s.ledger.events().filter_by_type("AccountLiquidated");
    assert_eq!(liquidated.len(), 1);
}

#[test]
fn test_partial_repay_escalates_to_auction() {
    let s = auctioned();

    let owed = s.ledger.get_pool_borrow_of(USD, s.u2, s.market, DAY).unwrap();
    // one day at 0.205% a year on 100 USD
    assert_eq!(owed, d("0.000561643835616439"));

    assert_eq!(s.ledger.get_auctions_count(), 1);
    let details = s.ledger.get_account_details(s.u2, s.market, DAY).unwrap();
    assert_eq!(details.status, AccountStatus::Liquid);
    assert!(!details.liquidable);

    let auction = s.ledger.get_auction_details(AuctionId(0), DAY).unwrap();
    assert_eq!(auction.debt_asset, USD);
    assert_eq!(auction.collateral_asset, ETH);
    assert_eq!(auction.left_collateral_amount, Decimal::ONE);
    assert_eq!(auction.left_debt_amount, owed);
    assert_eq!(auction.ratio, d("0.01"));

    // frozen debt no longer accrues
    assert_eq!(s.ledger.get_pool_borrow_of(USD, s.u2, s.market, DAY * 30).unwrap(), owed);
    assert_eq!(s.ledger.events().filter_by_type("AuctionCreated").len(), 1);
}

#[test]
fn test_reliquidation_is_idempotent() {
    let mut s = auctioned();
    let once = s.ledger.to_bytes().unwrap();

    let outcome = s.ledger.liquidate_account(s.u2, s.market, DAY).unwrap();
    assert!(matches!(outcome, LiquidationOutcome::Skipped(_)));
    assert_eq!(s.ledger.to_bytes().unwrap(), once);
    assert_eq!(s.ledger.statistics().total_liquidations, 1);
}

#[test]
fn test_locked_account_rejects_balance_changes() {
    let mut s = auctioned();
    s.ledger.credit_wallet(s.u2, USD, d("50")).unwrap();
    let before = s.ledger.to_bytes().unwrap();

    let locked = |r: Result<()>| matches!(r, Err(Error::AccountLocked(_)));
    assert!(locked(s.ledger.deposit(s.u2, s.market, USD, d("50"), DAY)));
    assert!(locked(s.ledger.withdraw(s.u2, s.market, USD, d("1"), DAY)));
    assert!(locked(s.ledger.transfer(
        USD,
        BalancePath::Wallet(s.u2),
        BalancePath::Collateral(AccountKey::new(s.u2, s.market)),
        d("1"),
        DAY,
    )));
    assert!(locked(s.ledger.transfer(
        ETH,
        BalancePath::Collateral(AccountKey::new(s.u2, s.market)),
        BalancePath::Wallet(s.u2),
        d("1"),
        DAY,
    )));
    assert!(locked(s.ledger.borrow(s.u2, s.market, USD, d("1"), DAY)));

    let err = s.ledger.repay(s.u2, s.market, USD, d("1"), DAY).unwrap_err();
    assert!(err.to_string().starts_with("CAN_NOT_OPERATOR_LIQUIDATING_COLLATERAL_ACCOUNT"));

    assert_eq!(s.ledger.to_bytes().unwrap(), before);
    assert_eq!(s.ledger.wallet_balance(s.u2, USD), d("50"));
}

// ═══════════════════════════════════════════════════════════════════════════════
// AUCTIONS
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_fill_at_full_value_returns_account_to_normal() {
    let mut s = auctioned();
    let debt = s.ledger.get_auction_details(AuctionId(0), DAY).unwrap().left_debt_amount;
    let later = DAY + s.ledger.config().auction.full_value_after().unwrap();
    let wallet_before = s.ledger.wallet_balance(s.u1, USD);

    let outcome = s.ledger.fill_auction(s.u1, AuctionId(0), debt, later).unwrap();
    assert_eq!(outcome.ratio, Decimal::ONE);
    assert_eq!(outcome.released_collateral, Decimal::ONE);
    assert!(outcome.finished);
    assert!(outcome.account_released);

    assert_eq!(s.ledger.wallet_balance(s.u1, ETH), Decimal::ONE);
    assert_eq!(s.ledger.wallet_balance(s.u1, USD), wallet_before - debt);
    assert_eq!(s.ledger.get_pool_borrow_of(USD, s.u2, s.market, later).unwrap(), Decimal::ZERO);

    let details = s.ledger.get_account_details(s.u2, s.market, later).unwrap();
    assert_eq!(details.status, AccountStatus::Normal);

    // unlocked again
    s.ledger.credit_wallet(s.u2, ETH, Decimal::ONE).unwrap();
    s.ledger.deposit(s.u2, s.market, ETH, Decimal::ONE, later).unwrap();

    let finished = s.ledger.events().filter_by_type("AuctionFinished");
    assert_eq!(finished.len(), 1);
}

#[test]
fn test_early_fill_takes_everything_and_writes_off_residual() {
    let mut s = auctioned();
    let debt = s.ledger.get_auction_details(AuctionId(0), DAY).unwrap().left_debt_amount;

    let outcome = s.ledger.fill_auction(s.u1, AuctionId(0), debt, DAY).unwrap();
    assert_eq!(outcome.ratio, d("0.01"));
    assert_eq!(outcome.released_collateral, Decimal::ONE);
    assert!(outcome.accepted_debt < debt);

    let bad = outcome.bad_debt.expect("residual debt is written off");
    assert_eq!(outcome.accepted_debt + bad.amount, debt);
    assert!(outcome.finished);
    assert!(outcome.account_released);

    let auction = s.ledger.get_auction_details(AuctionId(0), DAY).unwrap();
    assert_eq!(auction.left_debt_amount, Decimal::ZERO);
    assert_eq!(auction.left_collateral_amount, Decimal::ZERO);
    assert_eq!(s.ledger.events().filter_by_type("BadDebtWrittenOff").len(), 1);

    // a finished auction takes no more bids
    assert_eq!(
        s.ledger.fill_auction(s.u1, AuctionId(0), d("0.0001"), DAY),
        Err(Error::AuctionFinished(0))
    );
}

#[test]
fn test_partial_fills_conserve_debt() {
    let mut s = auctioned();
    let initial = s.ledger.get_auction_details(AuctionId(0), DAY).unwrap();
    let later = DAY + s.ledger.config().auction.full_value_after().unwrap();

    let half = truncate(initial.left_debt_amount / Decimal::TWO, 18);
    let first = s.ledger.fill_auction(s.u1, AuctionId(0), half, later).unwrap();
    assert!(!first.finished);

    let mid = s.ledger.get_auction_details(AuctionId(0), later).unwrap();
    assert!(mid.left_debt_amount < initial.left_debt_amount);
    assert!(mid.left_collateral_amount < initial.left_collateral_amount);
    assert_eq!(s.ledger.get_account_details(s.u2, s.market, later).unwrap().status, AccountStatus::Liquid);

    let second = s.ledger.fill_auction(s.u1, AuctionId(0), mid.left_debt_amount, later).unwrap();
    assert!(second.finished);
    assert!(second.account_released);
    assert!(first.accepted_debt + second.accepted_debt <= initial.left_debt_amount);
}

#[test]
fn test_account_released_only_after_last_auction() {
    let mut s = setup();
    s.ledger.oracle_mut().set_price(BTC, d("1000"), 0).unwrap();
    s.ledger
        .create_asset(Asset::new(BTC, "BTC").with_collateral_rate(15_000).unwrap(), 0)
        .unwrap();
    let market = s
        .ledger
        .create_market(MarketConfig::new(vec![ETH, USD, BTC]).with_rates(120, 200))
        .unwrap();
    assert_eq!(market, MarketId(2));

    let u3 = Address::from_label("u3");
    s.ledger.credit_wallet(u3, ETH, Decimal::ONE).unwrap();
    s.ledger.credit_wallet(u3, BTC, d("0.1")).unwrap();
    s.ledger.deposit(u3, market, ETH, Decimal::ONE, 0).unwrap();
    s.ledger.deposit(u3, market, BTC, d("0.1"), 0).unwrap();
    s.ledger.borrow(u3, market, USD, d("100"), 0).unwrap();
    s.ledger
        .transfer(
            USD,
            BalancePath::Collateral(AccountKey::new(u3, market)),
            BalancePath::Wallet(u3),
            d("40"),
            0,
        )
        .unwrap();

    // 10 + 40 + 60 = 110 < 120% of 100
    s.ledger.oracle_mut().set_price(ETH, d("10"), 0).unwrap();
    s.ledger.oracle_mut().set_price(BTC, d("400"), 0).unwrap();
    assert!(s.ledger.get_account_details(u3, market, 0).unwrap().liquidable);

    let outcome = s.ledger.liquidate_account(u3, market, 0).unwrap();
    assert_eq!(outcome.auctions(), &[AuctionId(0), AuctionId(1)]);
    let eth_auction = s.ledger.get_auction_details(AuctionId(0), 0).unwrap();
    let btc_auction = s.ledger.get_auction_details(AuctionId(1), 0).unwrap();
    assert_eq!((eth_auction.collateral_asset, eth_auction.left_debt_amount), (ETH, d("8")));
    assert_eq!((btc_auction.collateral_asset, btc_auction.left_debt_amount), (BTC, d("32")));

    let later = s.ledger.config().auction.full_value_after().unwrap();
    let first = s.ledger.fill_auction(s.u1, AuctionId(0), d("8"), later).unwrap();
    assert!(first.finished);
    assert!(!first.account_released);
    assert_eq!(first.released_collateral, Decimal::ONE);
    assert_eq!(
        s.ledger.get_account_details(u3, market, later).unwrap().status,
        AccountStatus::Liquid
    );
    let locked = s.ledger.transfer(
        USD,
        BalancePath::Wallet(u3),
        BalancePath::Collateral(AccountKey::new(u3, market)),
        d("1"),
        later,
    );
    assert!(matches!(locked, Err(Error::AccountLocked(_))));

    let second = s.ledger.fill_auction(s.u1, AuctionId(1), d("32"), later).unwrap();
    assert!(second.finished);
    assert!(second.account_released);
    assert_eq!(second.released_collateral, d("0.1"));
    assert_eq!(
        s.ledger.get_account_details(u3, market, later).unwrap().status,
        AccountStatus::Normal
    );
    assert_eq!(s.ledger.get_pool_borrow_of(USD, u3, market, later).unwrap(), Decimal::ZERO);
    assert_eq!(s.ledger.wallet_balance(s.u1, ETH), Decimal::ONE);
    assert_eq!(s.ledger.wallet_balance(s.u1, BTC), d("0.1"));
    assert_eq!(s.ledger.events().filter_by_type("AuctionFinished").len(), 2);
}

#[test]
fn test_transfer_between_users_is_rejected() {
    let mut s = setup();
    let before = s.ledger.to_bytes().unwrap();

    let err = s
        .ledger
        .transfer(USD, BalancePath::Wallet(s.u1), BalancePath::Wallet(s.u2), d("20000"), 0)
        .unwrap_err();
    assert!(matches!(err, Error::InvalidParameter { .. }));
    assert_eq!(s.ledger.to_bytes().unwrap(), before);
    assert_eq!(s.ledger.wallet_balance(s.u1, USD), d("20000"));
    assert_eq!(s.ledger.wallet_balance(s.u2, USD), Decimal::ZERO);
}

#[test]
fn test_overfill_is_rejected() {
    let mut s = auctioned();
    let before = s.ledger.to_bytes().unwrap();

    let err = s
        .ledger
        .fill_auction(s.u1, AuctionId(0), d("1"), DAY)
        .unwrap_err();
    assert!(matches!(err, Error::AuctionOverfill { .. }));
    assert_eq!(s.ledger.to_bytes().unwrap(), before);

    assert_eq!(
        s.ledger.fill_auction(s.u1, AuctionId(9), d("1"), DAY),
        Err(Error::AuctionNotFound(9))
    );
}

#[test]
fn test_bidder_without_funds_is_rejected() {
    let mut s = auctioned();
    let broke = Address::from_label("broke");
    let debt = s.ledger.get_auction_details(AuctionId(0), DAY).unwrap().left_debt_amount;
    let before = s.ledger.to_bytes().unwrap();

    let err = s.ledger.fill_auction(broke, AuctionId(0), debt, DAY).unwrap_err();
    assert!(matches!(err, Error::InsufficientBalance { .. }));
    assert_eq!(s.ledger.to_bytes().unwrap(), before);
}

// ═══════════════════════════════════════════════════════════════════════════════
// PERSISTENCE & CONFIGURATION
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_snapshot_round_trip() {
    let s = auctioned();
    let bytes = s.ledger.to_bytes().unwrap();

    let restored = Ledger::from_bytes(&bytes, s.ledger.oracle().clone()).unwrap();
    assert_eq!(restored.get_auctions_count(), 1);
    assert_eq!(
        restored.get_account_details(s.u2, s.market, DAY).unwrap(),
        s.ledger.get_account_details(s.u2, s.market, DAY).unwrap()
    );
    assert_eq!(restored.events().digest(), s.ledger.events().digest());

    assert!(Ledger::from_bytes(&bytes[..bytes.len() / 2], PriceFeed::new()).is_err());
}

#[test]
fn test_config_file_drives_the_ramp() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("engine.json");
    EngineConfig::default()
        .with_auction(RatioRamp::linear(d("0.5"), Decimal::ONE, 100))
        .save(&path)
        .unwrap();

    let config = EngineConfig::load(&path).unwrap();
    let mut feed = PriceFeed::new();
    feed.set_price(ETH, d("10"), 0).unwrap();
    feed.set_price(USD, Decimal::ONE, 0).unwrap();

    let mut ledger = Ledger::new(config, feed).unwrap();
    ledger.create_asset(Asset::new(ETH, "ETH"), 0).unwrap();
    ledger.create_asset(Asset::new(USD, "USD"), 0).unwrap();
    let market = ledger.create_market(MarketConfig::new(vec![ETH, USD])).unwrap();

    let (u1, u2) = (Address::from_label("u1"), Address::from_label("u2"));
    ledger.credit_wallet(u1, USD, d("1000")).unwrap();
    ledger.supply_pool(u1, USD, d("1000"), 0).unwrap();
    ledger.credit_wallet(u2, ETH, d("30")).unwrap();
    ledger.deposit(u2, market, ETH, d("30"), 0).unwrap();
    ledger.borrow(u2, market, USD, d("100"), 0).unwrap();
    ledger.withdraw(u2, market, USD, d("100"), 0).unwrap();

    // 300 USD of ETH against 100 USD debt; ETH drops to 3
    ledger.oracle_mut().set_price(ETH, d("3"), 0).unwrap();
    ledger.liquidate_account(u2, market, 10).unwrap();

    assert_eq!(ledger.get_auction_details(AuctionId(0), 10).unwrap().ratio, d("0.5"));
    assert_eq!(ledger.get_auction_details(AuctionId(0), 60).unwrap().ratio, d("0.75"));
    assert_eq!(ledger.get_auction_details(AuctionId(0), 500).unwrap().ratio, Decimal::ONE);
}
