//! Input validation utilities.
//!
//! These run before any state is touched so a rejected request never
//! leaves a partial effect behind.

use rust_decimal::Decimal;

use crate::error::{Error, Result};
use crate::utils::constants::*;

// ═══════════════════════════════════════════════════════════════════════════════
// AMOUNT VALIDATION
// ═══════════════════════════════════════════════════════════════════════════════

/// Validate that an amount is strictly positive
pub fn validate_amount(amount: Decimal, name: &str) -> Result<()> {
    if amount.is_zero() {
        return Err(Error::ZeroAmount);
    }
    if amount.is_sign_negative() {
        return Err(Error::InvalidParameter {
            name: name.into(),
            reason: format!("amount {} is negative", amount),
        });
    }
    Ok(())
}

/// Validate that an amount has no more precision than the asset supports
pub fn validate_precision(amount: Decimal, decimals: u32, name: &str) -> Result<()> {
    if amount.scale() > decimals && amount.normalize().scale() > decimals {
        return Err(Error::InvalidParameter {
            name: name.into(),
            reason: format!("amount {} exceeds {} decimals", amount, decimals),
        });
    }
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════════════
// PRICE VALIDATION
// ═══════════════════════════════════════════════════════════════════════════════

/// Validate an oracle price (zero is allowed, negative is not)
pub fn validate_price(price: Decimal) -> Result<()> {
    if price.is_sign_negative() && !price.is_zero() {
        return Err(Error::InvalidParameter {
            name: "price".into(),
            reason: format!("price {} is negative", price),
        });
    }
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════════════
// MARKET VALIDATION
// ═══════════════════════════════════════════════════════════════════════════════

/// Validate liquidation / withdrawal thresholds of a market
pub fn validate_market_rates(liquidate_rate: Decimal, withdraw_rate: Decimal) -> Result<()> {
    if liquidate_rate < RATE_PRECISION {
        return Err(Error::InvalidParameter {
            name: "liquidate_rate".into(),
            reason: format!("{} is below {}", liquidate_rate, RATE_PRECISION),
        });
    }
    if withdraw_rate < liquidate_rate {
        return Err(Error::InvalidParameter {
            name: "withdraw_rate".into(),
            reason: format!("{} is below liquidate rate {}", withdraw_rate, liquidate_rate),
        });
    }
    Ok(())
}

/// Validate a ratio that must lie within [0, 1]
pub fn validate_unit_ratio(value: Decimal, name: &str) -> Result<()> {
    if (value.is_sign_negative() && !value.is_zero()) || value > Decimal::ONE {
        return Err(Error::InvalidParameter {
            name: name.into(),
            reason: format!("{} is outside [0, 1]", value),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_amount() {
        assert!(validate_amount(Decimal::ONE, "amount").is_ok());
        assert_eq!(validate_amount(Decimal::ZERO, "amount"), Err(Error::ZeroAmount));
        assert!(validate_amount(Decimal::NEGATIVE_ONE, "amount").is_err());
    }

    #[test]
    fn test_validate_precision() {
        assert!(validate_precision(Decimal::new(123, 2), 2, "amount").is_ok());
        assert!(validate_precision(Decimal::new(1230, 3), 2, "amount").is_ok());
        assert!(validate_precision(Decimal::new(1234, 3), 2, "amount").is_err());
    }

    #[test]
    fn test_validate_market_rates() {
        assert!(validate_market_rates(Decimal::from(120), Decimal::from(200)).is_ok());
        assert!(validate_market_rates(Decimal::from(90), Decimal::from(200)).is_err());
        assert!(validate_market_rates(Decimal::from(150), Decimal::from(120)).is_err());
    }

    #[test]
    fn test_validate_unit_ratio() {
        assert!(validate_unit_ratio(Decimal::new(1, 1), "r").is_ok());
        assert!(validate_unit_ratio(Decimal::TWO, "r").is_err());
        assert!(validate_unit_ratio(Decimal::NEGATIVE_ONE, "r").is_err());
    }
}
