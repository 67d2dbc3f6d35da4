//! Inventory-aware market making.
//!
//! Every refresh cycle cancels all open orders on the pair, waits for the
//! cancellations to settle, then quotes `levels` bid/ask pairs around the
//! mid price. Quotes shift down when the account is long base and up when
//! it is short, bounded by `max_skew`.

use super::reconciler::{OrderReconciler, ReconcileReport};
use super::{Strategy, TickOutcome};
use crate::config::MarketMakerConfig;
use crate::context::EngineContext;
use crate::error::{GatewayResultExt, Result};
use crate::exchange::{DesiredOrder, MarketPair, OrderSide};
use crate::pricing::{skew, InventoryState};
use crate::utils::decimal::{from_fixed_point, quantize_decimal, quantize_size};
use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::time::Duration;
use tracing::{debug, info, warn};

const CANCEL_SETTLE: Duration = Duration::from_secs(1);

/// Skew intensity; with the `* 2` in [`skew`] the deviation is doubled.
const SKEW_INTENSITY: Decimal = Decimal::ONE;

/// Unquantized bid and ask for one level.
pub fn quote_prices(
    mid: Decimal,
    spread: Decimal,
    level_spacing: Decimal,
    skew: Decimal,
    level: u32,
) -> (Decimal, Decimal) {
    let half_spread = spread / dec!(2);
    let offset = Decimal::from(level) * level_spacing;
    let shift = Decimal::ONE - skew;
    let bid = mid * (Decimal::ONE - half_spread - offset) * shift;
    let ask = mid * (Decimal::ONE + half_spread + offset) * shift;
    (bid, ask)
}

/// Quotes for one refresh cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct QuotePlan {
    pub inventory: InventoryState,
    pub skew: Decimal,
    /// Bid then ask for each level, innermost level first
    pub orders: Vec<DesiredOrder>,
}

/// Build the quote ladder from a mid price and inventory snapshot.
pub fn plan_quotes(
    config: &MarketMakerConfig,
    market: &MarketPair,
    mid: Decimal,
    base_balance: Decimal,
    quote_balance: Decimal,
) -> QuotePlan {
    let inventory = InventoryState::from_balances(base_balance, quote_balance, mid);
    let skew = skew(
        inventory.ratio,
        config.inventory_target,
        config.max_skew,
        SKEW_INTENSITY,
    );
    let size = quantize_size(config.order_size, market.step_size);

    let mut orders: Vec<DesiredOrder> = Vec::with_capacity(config.levels as usize * 2);
    for level in 0..config.levels {
        let (bid, ask) = quote_prices(mid, config.spread, config.level_spacing, skew, level);
        for (side, raw) in [(OrderSide::Buy, bid), (OrderSide::Sell, ask)] {
            let price = quantize_decimal(raw, market.tick_size);
            // levels closer together than one tick collapse onto the same price
            if orders.iter().any(|o| o.side == side && o.price == price) {
                warn!(pair = %market.id, %side, %price, level, "Quote level collapses onto an existing one, skipping");
                continue;
            }
            orders.push(DesiredOrder::post_only(side, price, size));
        }
    }

    QuotePlan {
        inventory,
        skew,
        orders,
    }
}

/// Market maker bound to one pair and subaccount.
pub struct MarketMakerStrategy {
    config: MarketMakerConfig,
    market: MarketPair,
    subaccount: String,
}

impl MarketMakerStrategy {
    pub fn new(config: MarketMakerConfig, market: MarketPair, subaccount: impl Into<String>) -> Self {
        Self {
            config,
            market,
            subaccount: subaccount.into(),
        }
    }

    async fn balances(&self, ctx: &EngineContext) -> Result<(Decimal, Decimal)> {
        let gateway = ctx.gateway();
        let base = gateway
            .subaccount_balance(&self.subaccount, &self.market.base.symbol)
            .await
            .during("subaccount_balance")?;
        let quote = gateway
            .subaccount_balance(&self.subaccount, &self.market.quote.symbol)
            .await
            .during("subaccount_balance")?;
        Ok((
            from_fixed_point(base, self.market.base.decimals)?,
            from_fixed_point(quote, self.market.quote.decimals)?,
        ))
    }
}

#[async_trait]
impl Strategy for MarketMakerStrategy {
    fn name(&self) -> &'static str {
        "market_maker"
    }

    fn interval(&self) -> Duration {
        self.config.refresh_interval.as_duration()
    }

    async fn tick(&mut self, ctx: &EngineContext) -> Result<TickOutcome> {
        let mid = ctx.prices.resolve(ctx.gateway(), &self.market).await?;
        let (base, quote) = self.balances(ctx).await?;
        let plan = plan_quotes(&self.config, &self.market, mid, base, quote);

        info!(
            pair = %self.market.id,
            %mid,
            ratio = %plan.inventory.ratio,
            skew = %plan.skew,
            "Refreshing quotes"
        );

        // Without the current book we cannot guarantee a clean slate, so a
        // failed fetch aborts the cycle instead of stacking duplicate quotes.
        let open = ctx
            .gateway()
            .open_spot_orders(&self.subaccount, &self.market.id)
            .await
            .during("open_spot_orders")?;

        let reconciler = OrderReconciler::new(ctx, &self.market, &self.subaccount);
        let mut report = ReconcileReport::default();
        if !open.is_empty() {
            report.merge(&reconciler.cancel_all(&open).await);
            debug!(
                pair = %self.market.id,
                cancelled = report.cancelled,
                failed = report.cancel_failed,
                "Cancelled previous quotes"
            );
        }
        ctx.sleeper.sleep(CANCEL_SETTLE).await;

        report.merge(&reconciler.place_all(&plan.orders, None).await);
        Ok(TickOutcome::Submitted(report))
    }
}
