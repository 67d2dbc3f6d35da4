//! Funding-rate arbitrage between a spot pair and its perpetual.
//!
//! While funding pays shorts, hold spot long and an equal 1x perp short so the
//! book is delta neutral and collects funding. The pair is unwound as soon as
//! funding turns negative.

use super::reconciler::{OrderReconciler, ReconcileReport};
use super::{Strategy, TickOutcome};
use crate::config::FundingArbConfig;
use crate::context::EngineContext;
use crate::error::{EngineError, GatewayResultExt, Result};
use crate::exchange::{
    ClosePerpRequest, MarketPair, PerpMarketInfo, PerpOrderRequest, PerpOrderType, PerpPosition,
    PERP_DECIMALS,
};
use crate::utils::decimal::{
    from_fixed_point, from_fixed_point_signed, percent_to_bps, quantize_decimal, quantize_size,
    round_down_to_lot, safe_div,
};
use async_trait::async_trait;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::time::Duration;
use tracing::{debug, info, warn};

const TICK_INTERVAL: Duration = Duration::from_secs(60);
const HEDGE_LEVERAGE: u32 = 1;

/// Convert a raw 1e18-scaled funding rate into percent per period.
pub fn funding_rate_percent(raw: i128) -> Result<Decimal> {
    Ok(from_fixed_point_signed(raw, PERP_DECIMALS)? * dec!(100))
}

/// Last known state of the perp leg.
#[derive(Debug, Clone, PartialEq)]
pub struct PerpPositionState {
    pub size: Decimal,
    pub is_long: bool,
    pub entry_price: Decimal,
    pub leverage: u32,
    /// Funding rate in percent at the time of the snapshot
    pub funding_rate_pct: Decimal,
}

impl PerpPositionState {
    pub fn from_position(position: &PerpPosition, funding_rate_pct: Decimal) -> Self {
        Self {
            size: position.size,
            is_long: position.is_long,
            entry_price: position.entry_price,
            leverage: position.leverage,
            funding_rate_pct,
        }
    }
}

/// Decision for one arbitrage tick.
#[derive(Debug, Clone, PartialEq)]
pub enum ArbAction {
    Hold,
    /// Buy spot for `spot_quote` and short `perp_size` at `perp_price`
    Enter {
        spot_quote: Decimal,
        perp_size: Decimal,
        perp_price: Decimal,
    },
    /// Close the perp short, then sell the spot leg
    Exit,
}

/// Decide what to do given the current funding rate and position.
///
/// Entry needs the rate strictly above the threshold with no open position;
/// exit needs a strictly negative rate with a position held.
pub fn plan_funding_arb(
    config: &FundingArbConfig,
    perp: &MarketPair,
    funding_rate_pct: Decimal,
    position: Option<&PerpPositionState>,
    oracle_price: Decimal,
) -> ArbAction {
    match position {
        None if funding_rate_pct > config.min_funding_rate => {
            let half = config.amount / dec!(2);
            ArbAction::Enter {
                spot_quote: half,
                perp_size: quantize_size(safe_div(half, oracle_price), perp.step_size),
                perp_price: quantize_decimal(oracle_price, perp.tick_size),
            }
        }
        Some(_) if funding_rate_pct < Decimal::ZERO => ArbAction::Exit,
        _ => ArbAction::Hold,
    }
}

/// Funding arbitrage bot over one spot pair and one perp market.
pub struct FundingArbStrategy {
    config: FundingArbConfig,
    spot: MarketPair,
    perp: MarketPair,
    subaccount: String,
}

impl FundingArbStrategy {
    pub fn new(
        config: FundingArbConfig,
        spot: MarketPair,
        perp: MarketPair,
        subaccount: impl Into<String>,
    ) -> Self {
        Self {
            config,
            spot,
            perp,
            subaccount: subaccount.into(),
        }
    }

    /// Oracle price carried by the perp market, falling back to the price chain.
    async fn perp_price(&self, ctx: &EngineContext, info: &PerpMarketInfo) -> Result<Decimal> {
        let price = info.oracle_price_decimal()?;
        if price > Decimal::ZERO {
            return Ok(price);
        }
        ctx.prices.resolve(ctx.gateway(), &self.perp).await
    }

    async fn open_position(&self, ctx: &EngineContext, funding_pct: Decimal) -> Result<Option<PerpPositionState>> {
        let positions = ctx
            .gateway()
            .perp_positions(&self.subaccount, std::slice::from_ref(&self.perp.external_id))
            .await
            .during("perp_positions")?;
        Ok(positions
            .iter()
            .find(|p| p.market_id == self.perp.external_id && p.is_open())
            .map(|p| PerpPositionState::from_position(p, funding_pct)))
    }

    async fn enter(
        &self,
        ctx: &EngineContext,
        spot_quote: Decimal,
        perp_size: Decimal,
        perp_price: Decimal,
    ) -> Result<TickOutcome> {
        if perp_size.is_zero() {
            warn!(
                perp = %self.perp.id,
                amount = %self.config.amount,
                price = %perp_price,
                "Hedge size rounds to zero, not entering"
            );
            return Ok(TickOutcome::Idle);
        }

        let reconciler = OrderReconciler::new(ctx, &self.spot, &self.subaccount);
        let spot_tx = reconciler.market_buy_quote(spot_quote).await?;
        info!(pair = %self.spot.id, quote = %spot_quote, tx = %spot_tx.id, "Spot leg bought");

        let perp_tx = ctx
            .gateway()
            .place_perp_order(PerpOrderRequest {
                subaccount: self.subaccount.clone(),
                market_id: self.perp.external_id.clone(),
                is_long: false,
                size: perp_size,
                price: perp_price,
                order_type: PerpOrderType::Market,
                leverage: HEDGE_LEVERAGE,
                take_profit: None,
                stop_loss: None,
                reduce_only: false,
                post_only: false,
            })
            .await
            .during("place_perp_order")?;
        info!(
            perp = %self.perp.id,
            size = %perp_size,
            price = %perp_price,
            tx = %perp_tx.id,
            "Perp short opened"
        );

        Ok(TickOutcome::Submitted(ReconcileReport {
            placed: 2,
            ..Default::default()
        }))
    }

    async fn exit(&self, ctx: &EngineContext, price: Decimal) -> Result<TickOutcome> {
        // rounded up so a fractional tolerance never collapses to 0 bp
        let slippage_bps = percent_to_bps(ctx.trading.max_slippage_percent)
            .ceil()
            .to_u32()
            .ok_or_else(|| {
                EngineError::Configuration(format!(
                    "max_slippage_percent {} is out of range",
                    ctx.trading.max_slippage_percent
                ))
            })?;

        let gateway = ctx.gateway();
        let close_tx = gateway
            .close_perp_position(ClosePerpRequest {
                subaccount: self.subaccount.clone(),
                market_id: self.perp.external_id.clone(),
                price: quantize_decimal(price, self.perp.tick_size),
                slippage_bps,
            })
            .await
            .during("close_perp_position")?;
        info!(perp = %self.perp.id, slippage_bps, tx = %close_tx.id, "Perp short closed");

        let mut report = ReconcileReport {
            placed: 1,
            ..Default::default()
        };

        let raw_base = gateway
            .subaccount_balance(&self.subaccount, &self.spot.base.symbol)
            .await
            .during("subaccount_balance")?;
        let base = round_down_to_lot(
            from_fixed_point(raw_base, self.spot.base.decimals)?,
            self.spot.step_size,
        );
        if base.is_zero() {
            warn!(pair = %self.spot.id, "No spot balance left to sell");
            return Ok(TickOutcome::Submitted(report));
        }

        let sell_tx = OrderReconciler::new(ctx, &self.spot, &self.subaccount)
            .market_order(false, base, None)
            .await?;
        info!(pair = %self.spot.id, %base, tx = %sell_tx.id, "Spot leg sold");
        report.placed += 1;
        Ok(TickOutcome::Submitted(report))
    }
}

#[async_trait]
impl Strategy for FundingArbStrategy {
    fn name(&self) -> &'static str {
        "funding_arb"
    }

    fn interval(&self) -> Duration {
        TICK_INTERVAL
    }

    async fn tick(&mut self, ctx: &EngineContext) -> Result<TickOutcome> {
        let info = ctx
            .gateway()
            .perp_market(&self.perp.external_id)
            .await
            .during("perp_market")?;
        let funding_pct = funding_rate_percent(info.funding_rate)?;
        let position = self.open_position(ctx, funding_pct).await?;

        debug!(
            perp = %self.perp.id,
            funding_pct = %funding_pct,
            threshold = %self.config.min_funding_rate,
            has_position = position.is_some(),
            "Funding snapshot"
        );

        // price is only needed when something is about to be submitted
        let wants_action = match &position {
            None => funding_pct > self.config.min_funding_rate,
            Some(_) => funding_pct < Decimal::ZERO,
        };
        if !wants_action {
            return Ok(TickOutcome::Idle);
        }

        let price = self.perp_price(ctx, &info).await?;
        match plan_funding_arb(&self.config, &self.perp, funding_pct, position.as_ref(), price) {
            ArbAction::Hold => Ok(TickOutcome::Idle),
            ArbAction::Enter {
                spot_quote,
                perp_size,
                perp_price,
            } => {
                info!(perp = %self.perp.id, funding_pct = %funding_pct, "Funding above threshold, entering");
                self.enter(ctx, spot_quote, perp_size, perp_price).await
            }
            ArbAction::Exit => {
                info!(perp = %self.perp.id, funding_pct = %funding_pct, "Funding turned negative, exiting");
                self.exit(ctx, price).await
            }
        }
    }
}
