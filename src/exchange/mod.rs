//! Exchange access for the strategy engine.
//!
//! ## Gateway
//! Strategies talk to the exchange only through [`ExchangeGateway`]:
//! - Market registry and oracle prices
//! - Subaccount balances and open spot orders
//! - Spot limit/market orders and cancellation
//! - Perpetual orders, positions and funding data
//!
//! ## Implementations
//! - [`RestGateway`]: JSON client for the gateway service
//! - [`MockGateway`]: in-memory paper exchange for dry runs and tests

mod client;
pub mod mock;
mod traits;
mod types;

pub use client::RestGateway;
pub use mock::{GatewayCall, MockGateway};
pub use traits::ExchangeGateway;
#[cfg(test)]
pub use traits::MockExchangeGateway;
pub use types::*;
