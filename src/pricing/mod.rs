//! Shared pricing primitives.
//!
//! - `price_source`: ordered fallback chain for reference prices
//! - `inventory`: inventory ratio and bounded quote skew

mod inventory;
mod price_source;

pub use inventory::{skew, InventoryState};
pub use price_source::{estimate_notional, PriceSource, PriceSourceKind, SLIPPAGE_BUFFER};
