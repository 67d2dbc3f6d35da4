//! Grid strategy: a ladder of post-only orders between two bounds.
//!
//! A full grid is placed only when the subaccount has no open orders on the
//! pair. Filled or partially filled levels are not replenished individually;
//! the next grid goes down once the book is empty again.

use super::reconciler::OrderReconciler;
use super::{Strategy, TickOutcome};
use crate::config::GridConfig;
use crate::context::EngineContext;
use crate::error::{GatewayResultExt, Result};
use crate::exchange::{DesiredOrder, MarketPair, OrderSide};
use crate::pricing::skew;
use crate::utils::decimal::{
    from_fixed_point, quantize_decimal, quantize_size, relative_diff, safe_div,
};
use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::time::Duration;
use tracing::{debug, info};

const TICK_INTERVAL: Duration = Duration::from_secs(10);
const ORDER_SPACING: Duration = Duration::from_millis(500);

const SKEW_TARGET: Decimal = dec!(0.5);
const SKEW_INTENSITY: Decimal = dec!(0.05);
const MAX_SKEW: Decimal = dec!(0.05);
/// Levels closer than this to the reference price would take liquidity.
const TAKER_GUARD: Decimal = dec!(0.005);

/// `grids + 1` evenly spaced levels from `lower` to `upper` inclusive.
pub fn grid_levels(lower: Decimal, upper: Decimal, grids: u32) -> Vec<Decimal> {
    if grids == 0 {
        return vec![lower];
    }
    let step = (upper - lower) / Decimal::from(grids);
    (0..=grids)
        .map(|i| {
            if i == grids {
                upper
            } else {
                lower + step * Decimal::from(i)
            }
        })
        .collect()
}

/// Share of the full grid size currently held as base, clamped to `[0, 1]`.
pub fn grid_inventory_ratio(base_balance: Decimal, grids: u32, size_per_grid: Decimal) -> Decimal {
    safe_div(base_balance, Decimal::from(grids) * size_per_grid).clamp(Decimal::ZERO, Decimal::ONE)
}

/// Desired orders for a fresh grid.
pub fn plan_grid(
    config: &GridConfig,
    market: &MarketPair,
    price: Decimal,
    base_balance: Decimal,
) -> Vec<DesiredOrder> {
    let ratio = grid_inventory_ratio(base_balance, config.grids, config.size_per_grid);
    let skew = skew(ratio, SKEW_TARGET, MAX_SKEW, SKEW_INTENSITY);
    let size = quantize_size(config.size_per_grid, market.step_size);

    debug!(pair = %market.id, %ratio, %skew, %price, "Planning grid");

    grid_levels(config.lower, config.upper, config.grids)
        .into_iter()
        .filter_map(|level| {
            let adjusted = level * (Decimal::ONE - skew);
            if relative_diff(adjusted, price) < TAKER_GUARD {
                return None;
            }
            let side = if adjusted < price {
                OrderSide::Buy
            } else {
                OrderSide::Sell
            };
            Some(DesiredOrder::post_only(
                side,
                quantize_decimal(adjusted, market.tick_size),
                size,
            ))
        })
        .collect()
}

/// Grid bot bound to one pair and subaccount.
pub struct GridStrategy {
    config: GridConfig,
    market: MarketPair,
    subaccount: String,
}

impl GridStrategy {
    pub fn new(config: GridConfig, market: MarketPair, subaccount: impl Into<String>) -> Self {
        Self {
            config,
            market,
            subaccount: subaccount.into(),
        }
    }
}

#[async_trait]
impl Strategy for GridStrategy {
    fn name(&self) -> &'static str {
        "grid"
    }

    fn interval(&self) -> Duration {
        TICK_INTERVAL
    }

    async fn tick(&mut self, ctx: &EngineContext) -> Result<TickOutcome> {
        let gateway = ctx.gateway();
        let open = gateway
            .open_spot_orders(&self.subaccount, &self.market.id)
            .await
            .during("open_spot_orders")?;
        if !open.is_empty() {
            debug!(pair = %self.market.id, open = open.len(), "Grid already live, leaving it alone");
            return Ok(TickOutcome::Idle);
        }

        let price = ctx.prices.resolve(gateway, &self.market).await?;
        let raw_base = gateway
            .subaccount_balance(&self.subaccount, &self.market.base.symbol)
            .await
            .during("subaccount_balance")?;
        let base_balance = from_fixed_point(raw_base, self.market.base.decimals)?;

        let orders = plan_grid(&self.config, &self.market, price, base_balance);
        info!(
            pair = %self.market.id,
            %price,
            %base_balance,
            orders = orders.len(),
            "Placing grid"
        );

        let report = OrderReconciler::new(ctx, &self.market, &self.subaccount)
            .place_all(&orders, Some(ORDER_SPACING))
            .await;
        Ok(TickOutcome::Submitted(report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::RecordingSleeper;
    use crate::config::TradingConfig;
    use crate::error::EngineError;
    use crate::exchange::{MockGateway, SigningIdentity, Token};
    use crate::exchange::ExchangeGateway;
    use std::sync::Arc;

    fn config() -> GridConfig {
        GridConfig {
            pair: "BTC/USDC".to_string(),
            lower: dec!(60000),
            upper: dec!(70000),
            grids: 10,
            size_per_grid: dec!(0.001),
        }
    }

    fn market(reference_price: Option<Decimal>) -> MarketPair {
        MarketPair {
            id: "BTC/USDC".to_string(),
            base: Token::new("BTC", 8),
            quote: Token::new("USDC", 6),
            tick_size: dec!(0.1),
            step_size: dec!(0.0001),
            is_perp: false,
            external_id: "0xbtc".to_string(),
            reference_price,
        }
    }

    #[test]
    fn test_grid_levels() {
        let levels = grid_levels(dec!(60000), dec!(70000), 10);
        assert_eq!(levels.len(), 11);
        assert_eq!(levels[0], dec!(60000));
        assert_eq!(levels[5], dec!(65000));
        assert_eq!(levels[10], dec!(70000));
    }

    #[test]
    fn test_grid_levels_keep_exact_upper_bound() {
        let levels = grid_levels(dec!(1), dec!(2), 3);
        assert_eq!(levels.len(), 4);
        assert_eq!(levels[3], dec!(2));
    }

    #[test]
    fn test_inventory_ratio_is_clamped() {
        assert_eq!(grid_inventory_ratio(dec!(0.005), 10, dec!(0.001)), dec!(0.5));
        assert_eq!(grid_inventory_ratio(dec!(1), 10, dec!(0.001)), Decimal::ONE);
        assert_eq!(grid_inventory_ratio(Decimal::ZERO, 10, dec!(0.001)), Decimal::ZERO);
    }

    #[test]
    fn test_balanced_grid_skips_level_at_price() {
        let orders = plan_grid(&config(), &market(None), dec!(65000), dec!(0.005));

        assert_eq!(orders.len(), 10);
        let buys: Vec<_> = orders.iter().filter(|o| o.side == OrderSide::Buy).collect();
        let sells: Vec<_> = orders.iter().filter(|o| o.side == OrderSide::Sell).collect();
        assert_eq!(buys.len(), 5);
        assert_eq!(sells.len(), 5);
        assert!(buys.iter().all(|o| o.price < dec!(65000)));
        assert!(sells.iter().all(|o| o.price > dec!(65000)));
        assert!(orders.iter().all(|o| o.post_only && o.size == dec!(0.0010)));
        assert!(!orders.iter().any(|o| o.price == dec!(65000)));
    }

    #[test]
    fn test_heavy_inventory_shifts_grid_down() {
        // all base held: skew hits the 5% bound
        let orders = plan_grid(&config(), &market(None), dec!(65000), dec!(0.02));
        let lowest = orders.iter().map(|o| o.price).min().unwrap();
        let highest = orders.iter().map(|o| o.price).max().unwrap();
        assert_eq!(lowest, dec!(57000));
        assert_eq!(highest, dec!(66500));
    }

    #[test]
    fn test_grid_prices_are_on_tick() {
        let cfg = GridConfig {
            lower: dec!(60000.03),
            upper: dec!(70000.07),
            grids: 7,
            ..config()
        };
        for order in plan_grid(&cfg, &market(None), dec!(65000), dec!(0.003)) {
            assert_eq!(order.price % dec!(0.1), Decimal::ZERO);
        }
    }

    async fn context(gw: &MockGateway) -> (EngineContext, Arc<RecordingSleeper>) {
        let sleeper = Arc::new(RecordingSleeper::new());
        let ctx = EngineContext::new(
            Arc::new(gw.clone()),
            SigningIdentity {
                address: "0xowner".to_string(),
            },
            TradingConfig::default(),
        )
        .with_sleeper(sleeper.clone());
        (ctx, sleeper)
    }

    #[tokio::test]
    async fn test_tick_places_full_grid_into_empty_book_once() {
        let gw = MockGateway::new("0xowner");
        gw.add_market(market(None)).await;
        gw.set_oracle_price("BTC", dec!(65000)).await.unwrap();
        gw.set_balance("0xsub", &Token::new("BTC", 8), dec!(0.005))
            .await
            .unwrap();
        let (ctx, sleeper) = context(&gw).await;

        let mut strategy = GridStrategy::new(config(), market(None), "0xsub");
        let outcome = strategy.tick(&ctx).await.unwrap();
        match outcome {
            TickOutcome::Submitted(report) => {
                assert_eq!(report.placed, 10);
                assert_eq!(report.failed, 0);
            }
            other => panic!("expected submission, got {other:?}"),
        }
        assert_eq!(sleeper.recorded().len(), 9);

        // orders are resting now, so the next tick does nothing
        assert_eq!(strategy.tick(&ctx).await.unwrap(), TickOutcome::Idle);
        assert_eq!(gw.open_spot_orders("0xsub", "BTC/USDC").await.unwrap().len(), 10);
    }

    #[tokio::test]
    async fn test_tick_without_price_is_a_hard_stop() {
        let gw = MockGateway::new("0xowner");
        gw.add_market(market(None)).await;
        let (ctx, _sleeper) = context(&gw).await;

        let mut strategy = GridStrategy::new(config(), market(None), "0xsub");
        let err = strategy.tick(&ctx).await.unwrap_err();
        assert!(matches!(err, EngineError::PriceUnavailable { .. }));
        assert!(gw.calls().await.is_empty());
    }
}
