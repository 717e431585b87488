//! Utility modules for the margin engine.
//!
//! This module contains shared utilities used across the engine:
//! - User addresses
//! - Decimal arithmetic and valuation helpers
//! - Validation helpers
//! - Constants
//! - Tracing setup

pub mod address;
pub mod constants;
pub mod logging;
pub mod math;
pub mod validation;

pub use address::*;
pub use constants::*;
pub use math::*;
pub use validation::*;
