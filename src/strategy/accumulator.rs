//! Scheduled accumulation (dollar-cost averaging).
//!
//! Buys a fixed amount at every interval. A failed tick is not retried; the
//! next purchase happens at the next scheduled interval.

use super::reconciler::{OrderReconciler, ReconcileReport};
use super::{Strategy, TickOutcome};
use crate::config::{AmountType, DcaConfig};
use crate::context::EngineContext;
use crate::error::Result;
use crate::exchange::{MarketPair, OrderSide};
use crate::pricing::{estimate_notional, SLIPPAGE_BUFFER};
use crate::utils::decimal::quantize_size;
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::time::Duration;
use tracing::info;

/// The market order one accumulation tick submits.
#[derive(Debug, Clone, PartialEq)]
pub enum AccumulationOrder {
    /// Spend a fixed quote notional
    QuoteBuy { quote: Decimal },
    /// Buy a fixed base size, bounded by a slippage-padded quote estimate
    BaseBuy { base: Decimal, quote: Decimal },
}

/// Decide the order for a tick. `price` is only consulted for base amounts.
pub fn plan_accumulation(config: &DcaConfig, market: &MarketPair, price: Decimal) -> AccumulationOrder {
    match config.amount_type {
        AmountType::Quote => AccumulationOrder::QuoteBuy {
            quote: config.amount,
        },
        AmountType::Base => {
            let base = quantize_size(config.amount, market.step_size);
            AccumulationOrder::BaseBuy {
                base,
                quote: estimate_notional(base, price, OrderSide::Buy, SLIPPAGE_BUFFER),
            }
        }
    }
}

/// DCA bot bound to one pair and subaccount.
pub struct AccumulatorStrategy {
    config: DcaConfig,
    market: MarketPair,
    subaccount: String,
}

impl AccumulatorStrategy {
    pub fn new(config: DcaConfig, market: MarketPair, subaccount: impl Into<String>) -> Self {
        Self {
            config,
            market,
            subaccount: subaccount.into(),
        }
    }
}

#[async_trait]
impl Strategy for AccumulatorStrategy {
    fn name(&self) -> &'static str {
        "dca"
    }

    fn interval(&self) -> Duration {
        self.config.interval.as_duration()
    }

    async fn tick(&mut self, ctx: &EngineContext) -> Result<TickOutcome> {
        let order = match self.config.amount_type {
            AmountType::Quote => plan_accumulation(&self.config, &self.market, Decimal::ZERO),
            AmountType::Base => {
                let price = ctx.prices.resolve(ctx.gateway(), &self.market).await?;
                plan_accumulation(&self.config, &self.market, price)
            }
        };

        let reconciler = OrderReconciler::new(ctx, &self.market, &self.subaccount);
        let handle = match &order {
            AccumulationOrder::QuoteBuy { quote } => reconciler.market_buy_quote(*quote).await?,
            AccumulationOrder::BaseBuy { base, quote } => {
                reconciler.market_order(true, *base, Some(*quote)).await?
            }
        };

        info!(
            pair = %self.market.id,
            order = ?order,
            tx = %handle.id,
            next_in = %self.config.interval,
            "Accumulation order submitted"
        );
        Ok(TickOutcome::Submitted(ReconcileReport {
            placed: 1,
            ..Default::default()
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::RecordingSleeper;
    use crate::config::TradingConfig;
    use crate::error::EngineError;
    use crate::exchange::{GatewayCall, MockGateway, SigningIdentity, Token};
    use crate::utils::Interval;
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    fn market() -> MarketPair {
        MarketPair {
            id: "BTC/USDC".to_string(),
            base: Token::new("BTC", 8),
            quote: Token::new("USDC", 6),
            tick_size: dec!(0.1),
            step_size: dec!(0.00001),
            is_perp: false,
            external_id: "0xbtc".to_string(),
            reference_price: None,
        }
    }

    fn config(amount: Decimal, amount_type: AmountType) -> DcaConfig {
        DcaConfig {
            pair: "BTC/USDC".to_string(),
            amount,
            interval: Interval::try_from("1h".to_string()).unwrap(),
            amount_type,
        }
    }

    fn context(gw: &MockGateway) -> EngineContext {
        EngineContext::new(
            Arc::new(gw.clone()),
            SigningIdentity {
                address: "0xowner".to_string(),
            },
            TradingConfig::default(),
        )
        .with_sleeper(Arc::new(RecordingSleeper::new()))
    }

    #[test]
    fn test_base_plan_pads_quote_by_five_percent() {
        let order = plan_accumulation(&config(dec!(0.01), AmountType::Base), &market(), dec!(60000));
        assert_eq!(
            order,
            AccumulationOrder::BaseBuy {
                base: dec!(0.01),
                quote: dec!(630)
            }
        );
    }

    #[test]
    fn test_quote_plan_ignores_price() {
        let order = plan_accumulation(&config(dec!(25), AmountType::Quote), &market(), Decimal::ZERO);
        assert_eq!(order, AccumulationOrder::QuoteBuy { quote: dec!(25) });
    }

    #[tokio::test]
    async fn test_quote_tick_submits_without_price() {
        let gw = MockGateway::new("0xowner");
        gw.add_market(MarketPair {
            reference_price: Some(dec!(50000)),
            ..market()
        })
        .await;
        gw.set_balance("0xsub", &Token::new("USDC", 6), dec!(100)).await.unwrap();
        let ctx = context(&gw);

        let mut strategy = AccumulatorStrategy::new(config(dec!(25), AmountType::Quote), market(), "0xsub");
        strategy.tick(&ctx).await.unwrap();

        let calls = gw.calls().await;
        assert_eq!(calls.len(), 1);
        match &calls[0] {
            GatewayCall::PlaceMarket(req) => {
                assert!(req.is_buy);
                assert_eq!(req.quote_amount, Some(25_000_000));
                assert_eq!(req.base_amount, None);
            }
            other => panic!("unexpected call {other:?}"),
        }
        assert_eq!(strategy.interval(), Duration::from_millis(3_600_000));
    }

    #[tokio::test]
    async fn test_base_tick_sends_base_and_quote() {
        let gw = MockGateway::new("0xowner");
        gw.add_market(market()).await;
        gw.set_oracle_price("BTC", dec!(60000)).await.unwrap();
        gw.set_balance("0xsub", &Token::new("USDC", 6), dec!(1000)).await.unwrap();
        let ctx = context(&gw);

        let mut strategy = AccumulatorStrategy::new(config(dec!(0.01), AmountType::Base), market(), "0xsub");
        strategy.tick(&ctx).await.unwrap();

        match &gw.calls().await[0] {
            GatewayCall::PlaceMarket(req) => {
                assert_eq!(req.base_amount, Some(1_000_000));
                assert_eq!(req.quote_amount, Some(630_000_000));
            }
            other => panic!("unexpected call {other:?}"),
        }
        assert_eq!(gw.balance("0xsub", "BTC").await, 1_000_000);
    }

    #[tokio::test]
    async fn test_base_tick_fails_without_price() {
        let gw = MockGateway::new("0xowner");
        gw.add_market(market()).await;
        let ctx = context(&gw);

        let mut strategy = AccumulatorStrategy::new(config(dec!(0.01), AmountType::Base), market(), "0xsub");
        let err = strategy.tick(&ctx).await.unwrap_err();
        assert!(matches!(err, EngineError::PriceUnavailable { .. }));
        assert!(gw.calls().await.is_empty());
    }
}
