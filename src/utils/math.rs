//! Decimal arithmetic and valuation helpers.
//!
//! Amounts, prices and ratios are `Decimal` values in whole units. These
//! helpers wrap the checked operations so overflow and division by zero
//! surface as engine errors instead of panics.

use rust_decimal::{Decimal, RoundingStrategy};

use crate::error::{Error, Result};
use crate::utils::constants::RATE_PRECISION;

// ═══════════════════════════════════════════════════════════════════════════════
// SAFE ARITHMETIC OPERATIONS
// ═══════════════════════════════════════════════════════════════════════════════

/// Safe addition with overflow check
pub fn safe_add(a: Decimal, b: Decimal) -> Result<Decimal> {
    a.checked_add(b).ok_or(Error::Overflow {
        operation: format!("{} + {}", a, b),
    })
}

/// Safe subtraction; a negative result is an underflow
pub fn safe_sub(a: Decimal, b: Decimal) -> Result<Decimal> {
    match a.checked_sub(b) {
        Some(result) if !result.is_sign_negative() || result.is_zero() => Ok(result),
        _ => Err(Error::Underflow {
            operation: format!("{} - {}", a, b),
        }),
    }
}

/// Safe multiplication with overflow check
pub fn safe_mul(a: Decimal, b: Decimal) -> Result<Decimal> {
    a.checked_mul(b).ok_or(Error::Overflow {
        operation: format!("{} * {}", a, b),
    })
}

/// Safe division with zero check
pub fn safe_div(a: Decimal, b: Decimal) -> Result<Decimal> {
    if b.is_zero() {
        return Err(Error::InvalidParameter {
            name: "divisor".into(),
            reason: "division by zero".into(),
        });
    }
    a.checked_div(b).ok_or(Error::Overflow {
        operation: format!("{} / {}", a, b),
    })
}

/// Computes (a * b) / c
pub fn mul_div(a: Decimal, b: Decimal, c: Decimal) -> Result<Decimal> {
    safe_div(safe_mul(a, b)?, c)
}

/// Truncate an amount to the given number of decimal places
pub fn truncate(amount: Decimal, decimals: u32) -> Decimal {
    amount.round_dp_with_strategy(decimals, RoundingStrategy::ToZero)
}

/// Round an amount up to the given number of decimal places
pub fn round_up(amount: Decimal, decimals: u32) -> Decimal {
    amount.round_dp_with_strategy(decimals, RoundingStrategy::AwayFromZero)
}

// ═══════════════════════════════════════════════════════════════════════════════
// VALUATION
// ═══════════════════════════════════════════════════════════════════════════════

/// USD value of `amount` units priced at `price`
pub fn usd_value(amount: Decimal, price: Decimal) -> Result<Decimal> {
    safe_mul(amount, price)
}

/// Collateral/debt ratio as a percentage (150 = 150%)
///
/// Returns `None` when there is no debt (infinite ratio).
pub fn collateral_ratio_pct(balances_usd: Decimal, debts_usd: Decimal) -> Result<Option<Decimal>> {
    if debts_usd.is_zero() {
        return Ok(None);
    }
    mul_div(balances_usd, RATE_PRECISION, debts_usd).map(Some)
}

/// Whether `balances * 100 >= debts * rate`
pub fn meets_rate(balances_usd: Decimal, debts_usd: Decimal, rate: Decimal) -> Result<bool> {
    Ok(safe_mul(balances_usd, RATE_PRECISION)? >= safe_mul(debts_usd, rate)?)
}

/// Split `total` into parts proportional to `weights`.
///
/// Each part is truncated to `decimals`; the last non-zero weight takes
/// the remainder so the parts always sum to `total`. Zero weights get zero.
/// When every weight is zero the split is even.
pub fn split_proportional(total: Decimal, weights: &[Decimal], decimals: u32) -> Result<Vec<Decimal>> {
    if weights.is_empty() {
        return Ok(Vec::new());
    }

    let weight_sum = weights.iter().try_fold(Decimal::ZERO, |acc, w| safe_add(acc, *w))?;
    let effective: Vec<Decimal> = if weight_sum.is_zero() {
        vec![Decimal::ONE; weights.len()]
    } else {
        weights.to_vec()
    };
    let effective_sum = if weight_sum.is_zero() {
        Decimal::from(weights.len())
    } else {
        weight_sum
    };

    let last = effective
        .iter()
        .rposition(|w| !w.is_zero())
        .unwrap_or(effective.len() - 1);

    let mut parts = Vec::with_capacity(effective.len());
    let mut allocated = Decimal::ZERO;
    for (index, weight) in effective.iter().enumerate() {
        let part = if index == last {
            safe_sub(total, allocated)?
        } else if weight.is_zero() {
            Decimal::ZERO
        } else {
            truncate(mul_div(total, *weight, effective_sum)?, decimals)
        };
        allocated = safe_add(allocated, part)?;
        parts.push(part);
    }

    Ok(parts)
}
