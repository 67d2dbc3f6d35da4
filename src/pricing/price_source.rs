//! Reference price resolution.
//!
//! Sources are consulted in order and the first positive price wins. When
//! every source is empty the caller gets `PriceUnavailable`, never a zero.

use crate::error::{EngineError, Result};
use crate::exchange::{ExchangeGateway, MarketPair, OraclePrice, OrderSide, ORACLE_PRICE_DECIMALS};
use crate::utils::decimal::from_fixed_point;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::fmt;
use tracing::{debug, warn};

/// Buffer applied to market-order notionals when no fill price is known.
pub const SLIPPAGE_BUFFER: Decimal = dec!(0.05);

/// Where a reference price can come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceSourceKind {
    /// Live oracle feed, 6 decimal fixed point
    Oracle,
    /// Last reference price recorded in the market registry
    MarketReference,
}

impl fmt::Display for PriceSourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PriceSourceKind::Oracle => write!(f, "oracle"),
            PriceSourceKind::MarketReference => write!(f, "market_reference"),
        }
    }
}

/// Ordered list of price sources.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceSource {
    chain: Vec<PriceSourceKind>,
}

impl Default for PriceSource {
    fn default() -> Self {
        Self {
            chain: vec![PriceSourceKind::Oracle, PriceSourceKind::MarketReference],
        }
    }
}

impl PriceSource {
    pub fn new(chain: Vec<PriceSourceKind>) -> Self {
        Self { chain }
    }

    /// Sources in precedence order.
    pub fn chain(&self) -> &[PriceSourceKind] {
        &self.chain
    }

    /// Resolve the reference price for `market`'s base asset.
    ///
    /// An oracle request that errors counts as a miss and falls through to
    /// the next source.
    pub async fn resolve(&self, gateway: &dyn ExchangeGateway, market: &MarketPair) -> Result<Decimal> {
        let symbol = &market.base.symbol;

        for kind in &self.chain {
            let price = match kind {
                PriceSourceKind::Oracle => match gateway.oracle_prices().await {
                    Ok(prices) => oracle_price_for(&prices, symbol)?,
                    Err(e) => {
                        warn!(%symbol, error = %e, "Oracle price feed unavailable");
                        None
                    }
                },
                PriceSourceKind::MarketReference => market.reference_price,
            };

            if let Some(price) = price.filter(|p| *p > Decimal::ZERO) {
                debug!(%symbol, source = %kind, %price, "Resolved reference price");
                return Ok(price);
            }
        }

        Err(EngineError::PriceUnavailable {
            symbol: symbol.clone(),
            tried: self
                .chain
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", "),
        })
    }
}

/// Find `symbol` in an oracle snapshot (case-insensitive).
fn oracle_price_for(prices: &[OraclePrice], symbol: &str) -> Result<Option<Decimal>> {
    prices
        .iter()
        .find(|p| p.symbol.eq_ignore_ascii_case(symbol))
        .map(|p| from_fixed_point(p.price, ORACLE_PRICE_DECIMALS))
        .transpose()
}

/// Estimate the quote notional of a market order with a slippage buffer.
///
/// Buys are padded up, sells are padded down.
pub fn estimate_notional(amount: Decimal, price: Decimal, side: OrderSide, buffer: Decimal) -> Decimal {
    let notional = amount * price;
    match side {
        OrderSide::Buy => notional * (Decimal::ONE + buffer),
        OrderSide::Sell => notional * (Decimal::ONE - buffer),
    }
}
