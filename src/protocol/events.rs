//! Ledger events for state change notifications.
//!
//! Every successful state-changing ledger operation records one or more
//! events. Events of a failed operation are discarded together with its
//! other effects.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::VecDeque;

use crate::core::account::{AccountKey, BalancePath};
use crate::core::asset::AssetId;
use crate::liquidation::auction::AuctionId;
use crate::utils::address::Address;
use crate::utils::constants::DEFAULT_MAX_EVENTS;

// ═══════════════════════════════════════════════════════════════════════════════
// EVENT TYPES
// ═══════════════════════════════════════════════════════════════════════════════

/// All ledger event types
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerEvent {
    // Liquidation Events
    /// Account was locked and liquidated
    AccountLiquidated(AccountLiquidatedEvent),
    /// Auction opened for leftover debt
    AuctionCreated(AuctionCreatedEvent),
    /// Bid settled against an auction
    AuctionFilled(AuctionFilledEvent),
    /// Auction reached a terminal state
    AuctionFinished(AuctionFinishedEvent),
    /// Unrecoverable debt removed from the pool
    BadDebtWrittenOff(BadDebtEvent),

    // Account Events
    /// Wallet funds moved into a collateral account
    Deposited(BalanceEvent),
    /// Collateral moved back to the wallet
    Withdrawn(BalanceEvent),
    /// Funds moved between balance paths
    Transferred(TransferEvent),
    /// Funds borrowed from the pool
    Borrowed(BalanceEvent),
    /// Pool debt repaid
    Repaid(BalanceEvent),
}

impl LedgerEvent {
    /// Get the event type as a string
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::AccountLiquidated(_) => "AccountLiquidated",
            Self::AuctionCreated(_) => "AuctionCreated",
            Self::AuctionFilled(_) => "AuctionFilled",
            Self::AuctionFinished(_) => "AuctionFinished",
            Self::BadDebtWrittenOff(_) => "BadDebtWrittenOff",
            Self::Deposited(_) => "Deposited",
            Self::Withdrawn(_) => "Withdrawn",
            Self::Transferred(_) => "Transferred",
            Self::Borrowed(_) => "Borrowed",
            Self::Repaid(_) => "Repaid",
        }
    }

    /// Get the timestamp of the event
    pub fn timestamp(&self) -> u64 {
        match self {
            Self::AccountLiquidated(e) => e.timestamp,
            Self::AuctionCreated(e) => e.timestamp,
            Self::AuctionFilled(e) => e.timestamp,
            Self::AuctionFinished(e) => e.timestamp,
            Self::BadDebtWrittenOff(e) => e.timestamp,
            Self::Deposited(e) | Self::Withdrawn(e) | Self::Borrowed(e) | Self::Repaid(e) => e.timestamp,
            Self::Transferred(e) => e.timestamp,
        }
    }

    /// SHA-256 of the event's binary encoding
    pub fn hash(&self) -> [u8; 32] {
        let data = bincode::serialize(self).unwrap_or_default();
        Sha256::digest(&data).into()
    }
}

/// Emitted when an account is locked for liquidation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountLiquidatedEvent {
    /// Liquidated account
    pub account: AccountKey,
    /// Collateral value at trigger
    pub balances_total_usd: Decimal,
    /// Debt value at trigger
    pub debts_total_usd: Decimal,
    /// Whether forced repayment cleared all debt
    pub resolved: bool,
    /// Event timestamp
    pub timestamp: u64,
}

/// Emitted when an auction is opened
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuctionCreatedEvent {
    /// Auction identifier
    pub auction: AuctionId,
    /// Liquidated account
    pub account: AccountKey,
    /// Asset bidders repay
    pub debt_asset: AssetId,
    /// Asset bidders receive
    pub collateral_asset: AssetId,
    /// Debt sold
    pub debt_amount: Decimal,
    /// Collateral sold
    pub collateral_amount: Decimal,
    /// Event timestamp
    pub timestamp: u64,
}

/// Emitted on every accepted bid
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuctionFilledEvent {
    /// Auction identifier
    pub auction: AuctionId,
    /// Bidder
    pub bidder: Address,
    /// Ratio in effect
    pub ratio: Decimal,
    /// Debt paid
    pub debt_amount: Decimal,
    /// Collateral released
    pub collateral_amount: Decimal,
    /// Event timestamp
    pub timestamp: u64,
}

/// Emitted when an auction stops taking bids
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuctionFinishedEvent {
    /// Auction identifier
    pub auction: AuctionId,
    /// Whether the liquidated account returned to Normal
    pub account_released: bool,
    /// Event timestamp
    pub timestamp: u64,
}

/// Emitted when debt is written off
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BadDebtEvent {
    /// Account the debt belonged to
    pub account: AccountKey,
    /// Debt asset
    pub asset: AssetId,
    /// Part paid by insurance
    pub covered_by_insurance: Decimal,
    /// Part lost by suppliers
    pub socialized_loss: Decimal,
    /// Event timestamp
    pub timestamp: u64,
}

/// Single-account balance movement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceEvent {
    /// Account involved
    pub account: AccountKey,
    /// Asset moved
    pub asset: AssetId,
    /// Amount moved
    pub amount: Decimal,
    /// Event timestamp
    pub timestamp: u64,
}

/// Movement between two balance paths
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferEvent {
    /// Source
    pub from: BalancePath,
    /// Destination
    pub to: BalancePath,
    /// Asset moved
    pub asset: AssetId,
    /// Amount moved
    pub amount: Decimal,
    /// Event timestamp
    pub timestamp: u64,
}

// ═══════════════════════════════════════════════════════════════════════════════
// EVENT LOG
// ═══════════════════════════════════════════════════════════════════════════════

/// Bounded history of recent events
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventLog {
    events: VecDeque<LedgerEvent>,
    max_events: usize,
    total_recorded: u64,
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_EVENTS)
    }
}

impl EventLog {
    /// Create an empty log keeping at most `max_events`
    pub fn new(max_events: usize) -> Self {
        Self {
            events: VecDeque::new(),
            max_events: max_events.max(1),
            total_recorded: 0,
        }
    }

    /// Add an event (with pruning)
    pub fn push(&mut self, event: LedgerEvent) {
        self.events.push_back(event);
        self.total_recorded += 1;

        while self.events.len() > self.max_events {
            self.events.pop_front();
        }
    }

    /// Retained events, oldest first
    pub fn iter(&self) -> impl Iterator<Item = &LedgerEvent> {
        self.events.iter()
    }

    /// Most recent event
    pub fn last(&self) -> Option<&LedgerEvent> {
        self.events.back()
    }

    /// Get events of a specific type
    pub fn filter_by_type(&self, event_type: &str) -> Vec<&LedgerEvent> {
        self.events
            .iter()
            .filter(|e| e.event_type() == event_type)
            .collect()
    }

    /// Get the number of retained events
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Events ever recorded, pruned ones included
    pub fn total_recorded(&self) -> u64 {
        self.total_recorded
    }

    /// Hex digest chaining the hashes of the retained events
    pub fn digest(&self) -> String {
        let mut acc = [0u8; 32];
        for event in &self.events {
            let mut hasher = Sha256::new();
            hasher.update(acc);
            hasher.update(event.hash());
            acc = hasher.finalize().into();
        }
        hex::encode(acc)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════
