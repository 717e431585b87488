//! Error types for the Hydra margin engine.
//!
//! Every public operation either fully succeeds or fails with one of
//! these errors; the ledger discards all effects of a failed operation.

use rust_decimal::Decimal;
use thiserror::Error;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the margin engine
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    // ═══════════════════════════════════════════════════════════════════
    // Account Errors
    // ═══════════════════════════════════════════════════════════════════

    /// Balance-mutating operation on an account that is being liquidated
    #[error("CAN_NOT_OPERATOR_LIQUIDATING_COLLATERAL_ACCOUNT: {0}")]
    AccountLocked(String),

    /// Balance too low for the requested operation
    #[error("Insufficient balance: required {required}, available {available}")]
    InsufficientBalance {
        /// Required amount
        required: Decimal,
        /// Available amount
        available: Decimal,
    },

    /// Collateral/debt ratio below the market threshold
    #[error("Collateral ratio {current}% below required {minimum}%")]
    CollateralizationRatioTooLow {
        /// Current ratio percentage
        current: Decimal,
        /// Required ratio percentage
        minimum: Decimal,
    },

    // ═══════════════════════════════════════════════════════════════════
    // Liquidation & Auction Errors
    // ═══════════════════════════════════════════════════════════════════

    /// Auction does not exist
    #[error("Auction not found: {0}")]
    AuctionNotFound(u32),

    /// Auction already reached a terminal state
    #[error("Auction {0} is already filled")]
    AuctionFinished(u32),

    /// Fill offered more debt than the auction still carries
    #[error("Auction overfill: offered {offered}, remaining debt {remaining}")]
    AuctionOverfill {
        /// Debt amount offered by the bidder
        offered: Decimal,
        /// Debt still outstanding on the auction
        remaining: Decimal,
    },

    // ═══════════════════════════════════════════════════════════════════
    // Market & Oracle Errors
    // ═══════════════════════════════════════════════════════════════════

    /// Asset is not registered
    #[error("Unknown asset: {0}")]
    UnknownAsset(u16),

    /// Market is not registered
    #[error("Unknown market: {0}")]
    UnknownMarket(u16),

    /// Asset is not part of the market
    #[error("Asset {asset} is not listed in market {market}")]
    AssetNotInMarket {
        /// Asset identifier
        asset: u16,
        /// Market identifier
        market: u16,
    },

    /// No price published for the asset
    #[error("Price unavailable for asset {0}")]
    PriceUnavailable(u16),

    // ═══════════════════════════════════════════════════════════════════
    // Pool Errors
    // ═══════════════════════════════════════════════════════════════════

    /// Pool cannot lend or release the requested amount
    #[error("Insufficient pool liquidity: required {required}, available {available}")]
    InsufficientLiquidity {
        /// Requested amount
        required: Decimal,
        /// Liquidity on hand
        available: Decimal,
    },

    // ═══════════════════════════════════════════════════════════════════
    // Validation Errors
    // ═══════════════════════════════════════════════════════════════════

    /// Invalid input parameter
    #[error("Invalid parameter {name}: {reason}")]
    InvalidParameter {
        /// Parameter name
        name: String,
        /// Reason for invalidity
        reason: String,
    },

    /// Amount is zero
    #[error("Amount cannot be zero")]
    ZeroAmount,

    /// Overflow in calculation
    #[error("Arithmetic overflow in {operation}")]
    Overflow {
        /// Operation that overflowed
        operation: String,
    },

    /// Underflow in calculation
    #[error("Arithmetic underflow in {operation}")]
    Underflow {
        /// Operation that underflowed
        operation: String,
    },

    /// Configuration could not be loaded or is inconsistent
    #[error("Configuration error: {0}")]
    Config(String),

    // ═══════════════════════════════════════════════════════════════════
    // Serialization Errors
    // ═══════════════════════════════════════════════════════════════════

    /// Serialization failed
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Deserialization failed
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    // ═══════════════════════════════════════════════════════════════════
    // Internal Errors
    // ═══════════════════════════════════════════════════════════════════

    /// Invariant violation detected
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),
}

impl Error {
    /// Returns true if the caller may retry after changing its request
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::InsufficientBalance { .. }
                | Error::CollateralizationRatioTooLow { .. }
                | Error::AuctionOverfill { .. }
                | Error::InsufficientLiquidity { .. }
                | Error::AccountLocked(_)
        )
    }

    /// Returns the error code for external systems
    pub fn code(&self) -> u32 {
        match self {
            // Account errors: 1xxx
            Error::AccountLocked(_) => 1001,
            Error::InsufficientBalance { .. } => 1002,
            Error::CollateralizationRatioTooLow { .. } => 1003,

            // Liquidation / auction errors: 2xxx
            Error::AuctionNotFound(_) => 2001,
            Error::AuctionFinished(_) => 2002,
            Error::AuctionOverfill { .. } => 2003,

            // Market / oracle errors: 3xxx
            Error::UnknownAsset(_) => 3001,
            Error::UnknownMarket(_) => 3002,
            Error::AssetNotInMarket { .. } => 3003,
            Error::PriceUnavailable(_) => 3004,

            // Pool errors: 4xxx
            Error::InsufficientLiquidity { .. } => 4001,

            // Validation errors: 5xxx
            Error::InvalidParameter { .. } => 5001,
            Error::ZeroAmount => 5002,
            Error::Overflow { .. } => 5003,
            Error::Underflow { .. } => 5004,
            Error::Config(_) => 5005,

            // Serialization errors: 7xxx
            Error::Serialization(_) => 7001,
            Error::Deserialization(_) => 7002,

            // Internal errors: 9xxx
            Error::InvariantViolation(_) => 9001,
        }
    }
}
