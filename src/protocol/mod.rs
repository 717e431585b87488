//! Protocol module - ledger orchestration and events.
//!
//! This module provides the ledger that applies every margin operation
//! atomically, and the events it records.

pub mod events;
pub mod ledger;

pub use events::*;
pub use ledger::*;
