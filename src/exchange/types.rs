//! Domain types exchanged with the gateway.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Decimal places of oracle prices, including the perp market oracle price.
pub const ORACLE_PRICE_DECIMALS: u32 = 6;

/// Scale of perpetual funding rates (1e18).
pub const PERP_DECIMALS: u32 = 18;

/// A token as the market registry describes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub symbol: String,
    pub decimals: u32,
}

impl Token {
    pub fn new(symbol: impl Into<String>, decimals: u32) -> Self {
        Self {
            symbol: symbol.into(),
            decimals,
        }
    }
}

/// Trading pair metadata. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketPair {
    /// Human identifier, e.g. "BTC/USDC"
    pub id: String,
    pub base: Token,
    pub quote: Token,
    #[serde(with = "rust_decimal::serde::str")]
    pub tick_size: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub step_size: Decimal,
    #[serde(default)]
    pub is_perp: bool,
    /// Identifier the exchange contracts use for this pair
    pub external_id: String,
    /// Last reference price the registry knows about
    #[serde(default, with = "rust_decimal::serde::str_option")]
    pub reference_price: Option<Decimal>,
}

/// Order side (buy or sell).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn is_buy(self) -> bool {
        self == OrderSide::Buy
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "buy"),
            OrderSide::Sell => write!(f, "sell"),
        }
    }
}

/// Order status as reported by the exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Open,
    PartiallyFilled,
    Filled,
    Cancelled,
}

/// An order the exchange reports as resting on the book.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenOrder {
    pub id: String,
    pub side: OrderSide,
    #[serde(with = "rust_decimal::serde::str")]
    pub price: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub size: Decimal,
    pub status: OrderStatus,
}

/// An order a strategy wants on the book this tick. Never reused across ticks.
#[derive(Debug, Clone, PartialEq)]
pub struct DesiredOrder {
    pub side: OrderSide,
    /// Quantized to the pair's tick size
    pub price: Decimal,
    /// Quantized to the pair's step size
    pub size: Decimal,
    pub post_only: bool,
    pub reduce_only: bool,
}

impl DesiredOrder {
    pub fn post_only(side: OrderSide, price: Decimal, size: Decimal) -> Self {
        Self {
            side,
            price,
            size,
            post_only: true,
            reduce_only: false,
        }
    }

    pub fn notional(&self) -> Decimal {
        self.price * self.size
    }
}

/// Oracle price entry (fixed point, 6 decimals).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OraclePrice {
    pub symbol: String,
    pub price: u128,
}

/// Limit order submission. Price is implied by `quote_amount / base_amount`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitOrderRequest {
    pub subaccount: String,
    pub pair_id: String,
    pub is_buy: bool,
    pub quote_amount: u128,
    pub base_amount: u128,
    pub post_only: bool,
    pub reduce_only: bool,
}

/// Market order submission. A quote-only buy leaves `base_amount` empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketOrderRequest {
    pub subaccount: String,
    pub pair_id: String,
    pub is_buy: bool,
    pub quote_amount: Option<u128>,
    pub base_amount: Option<u128>,
    pub auto_cancel: bool,
    pub reduce_only: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PerpOrderType {
    Market,
    Limit,
}

/// Perpetual order submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerpOrderRequest {
    pub subaccount: String,
    pub market_id: String,
    pub is_long: bool,
    #[serde(with = "rust_decimal::serde::str")]
    pub size: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub price: Decimal,
    pub order_type: PerpOrderType,
    pub leverage: u32,
    #[serde(default, with = "rust_decimal::serde::str_option")]
    pub take_profit: Option<Decimal>,
    #[serde(default, with = "rust_decimal::serde::str_option")]
    pub stop_loss: Option<Decimal>,
    pub reduce_only: bool,
    pub post_only: bool,
}

/// Request to flatten a perpetual position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClosePerpRequest {
    pub subaccount: String,
    pub market_id: String,
    #[serde(with = "rust_decimal::serde::str")]
    pub price: Decimal,
    pub slippage_bps: u32,
}

/// Perpetual position as reported by the exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerpPosition {
    pub market_id: String,
    #[serde(with = "rust_decimal::serde::str")]
    pub size: Decimal,
    pub is_long: bool,
    #[serde(with = "rust_decimal::serde::str")]
    pub entry_price: Decimal,
    pub leverage: u32,
}

impl PerpPosition {
    pub fn is_open(&self) -> bool {
        !self.size.is_zero()
    }
}

/// Perpetual market state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerpMarketInfo {
    pub market_id: String,
    /// Funding rate per period, 1e18 scale ([`PERP_DECIMALS`])
    pub funding_rate: i128,
    /// Oracle price, 6 decimals like the spot feed ([`ORACLE_PRICE_DECIMALS`])
    pub oracle_price: u128,
}

impl PerpMarketInfo {
    /// Oracle price as a decimal.
    pub fn oracle_price_decimal(&self) -> crate::error::Result<Decimal> {
        crate::utils::decimal::from_fixed_point(self.oracle_price, ORACLE_PRICE_DECIMALS)
    }
}

/// Owner identity derived from the signing key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SigningIdentity {
    pub address: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subaccount {
    pub name: String,
    pub address: String,
}

/// Handle returned for every submitted transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxHandle {
    pub id: String,
}
