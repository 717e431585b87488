//! Core modules for the margin engine.
//!
//! This module contains the fundamental building blocks:
//! - Assets and markets
//! - Collateral accounts, wallet balances and the account lock
//! - Engine configuration

pub mod account;
pub mod asset;
pub mod config;
pub mod market;

pub use account::*;
pub use asset::*;
pub use config::*;
pub use market::*;
