//! Borrow interest rate model.
//!
//! Annual borrow rate is a polynomial of pool utilization:
//! `rate(u) = linear * u + quadratic * u^2`, with `u` clamped to `[0, 1]`.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::utils::constants::{RATE_LINEAR_COEFFICIENT, RATE_QUADRATIC_COEFFICIENT, SECONDS_PER_YEAR};
use crate::utils::math::{mul_div, safe_add, safe_mul};

/// Polynomial utilization-based rate model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateModel {
    /// Coefficient of `u`
    pub linear: Decimal,
    /// Coefficient of `u^2`
    pub quadratic: Decimal,
}

impl Default for RateModel {
    fn default() -> Self {
        Self {
            linear: RATE_LINEAR_COEFFICIENT,
            quadratic: RATE_QUADRATIC_COEFFICIENT,
        }
    }
}

impl RateModel {
    /// Create a model from its coefficients
    pub fn new(linear: Decimal, quadratic: Decimal) -> Self {
        Self { linear, quadratic }
    }

    /// Coefficients must be non-negative
    pub fn check_model(&self) -> bool {
        !self.linear.is_sign_negative() && !self.quadratic.is_sign_negative()
    }

    /// Annual borrow rate at the given utilization
    pub fn borrow_rate(&self, utilization: Decimal) -> Result<Decimal> {
        let u = utilization.max(Decimal::ZERO).min(Decimal::ONE);
        safe_add(safe_mul(self.linear, u)?, safe_mul(self.quadratic, safe_mul(u, u)?)?)
    }
}

/// Interest factor accrued at `annual_rate` over `elapsed_secs`
pub fn accrual_factor(annual_rate: Decimal, elapsed_secs: u64) -> Result<Decimal> {
    mul_div(annual_rate, Decimal::from(elapsed_secs), Decimal::from(SECONDS_PER_YEAR))
}

/// Index after accruing `factor` on top of `index`
pub fn increment_index(index: Decimal, factor: Decimal) -> Result<Decimal> {
    safe_add(index, safe_mul(index, factor)?)
}
