//! Order submission and cancellation against the gateway.
//!
//! Each order is submitted on its own: one failed placement or cancel is
//! logged and counted, and its siblings are still attempted.

use crate::context::EngineContext;
use crate::error::{EngineError, GatewayResultExt, Result};
use crate::exchange::{
    DesiredOrder, LimitOrderRequest, MarketOrderRequest, MarketPair, OpenOrder, TxHandle,
};
use crate::utils::decimal::{quantize_decimal, quantize_size, to_fixed_point, truncate_to_decimals};
use rust_decimal::Decimal;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// What happened to the orders of one tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub placed: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub cancel_failed: usize,
}

impl ReconcileReport {
    pub fn merge(&mut self, other: &ReconcileReport) {
        self.placed += other.placed;
        self.failed += other.failed;
        self.cancelled += other.cancelled;
        self.cancel_failed += other.cancel_failed;
    }

    /// `PartialSubmission` if any placement failed.
    pub fn partial_failure(&self, pair: &str) -> Option<EngineError> {
        (self.failed > 0).then(|| EngineError::PartialSubmission {
            pair: pair.to_string(),
            attempted: self.placed + self.failed,
            failed: self.failed,
        })
    }
}

/// Places and cancels orders for one subaccount on one pair.
pub struct OrderReconciler<'a> {
    ctx: &'a EngineContext,
    market: &'a MarketPair,
    subaccount: &'a str,
}

impl<'a> OrderReconciler<'a> {
    pub fn new(ctx: &'a EngineContext, market: &'a MarketPair, subaccount: &'a str) -> Self {
        Self {
            ctx,
            market,
            subaccount,
        }
    }

    /// Build the gateway request for a desired order.
    ///
    /// Price and size are re-quantized so nothing off-tick ever leaves the
    /// engine; the quote amount is truncated to the quote token's precision.
    pub fn limit_request(&self, order: &DesiredOrder) -> Result<LimitOrderRequest> {
        let price = quantize_decimal(order.price, self.market.tick_size);
        let size = quantize_size(order.size, self.market.step_size);
        if price <= Decimal::ZERO || size.is_zero() {
            return Err(EngineError::Configuration(format!(
                "order on {} quantizes to price {price} size {size}",
                self.market.id
            )));
        }
        let quote = truncate_to_decimals(price * size, self.market.quote.decimals);

        Ok(LimitOrderRequest {
            subaccount: self.subaccount.to_string(),
            pair_id: self.market.id.clone(),
            is_buy: order.side.is_buy(),
            quote_amount: to_fixed_point(quote, self.market.quote.decimals)?,
            base_amount: to_fixed_point(size, self.market.base.decimals)?,
            post_only: order.post_only,
            reduce_only: order.reduce_only,
        })
    }

    async fn place(&self, order: &DesiredOrder) -> Result<TxHandle> {
        let request = self.limit_request(order)?;
        self.ctx
            .gateway()
            .place_limit_order(request)
            .await
            .during("place_limit_order")
    }

    /// Submit every order, pausing `spacing` between submissions.
    pub async fn place_all(&self, orders: &[DesiredOrder], spacing: Option<Duration>) -> ReconcileReport {
        let mut report = ReconcileReport::default();

        for (i, order) in orders.iter().enumerate() {
            if i > 0 {
                if let Some(delay) = spacing {
                    self.ctx.sleeper.sleep(delay).await;
                }
            }

            match self.place(order).await {
                Ok(handle) => {
                    report.placed += 1;
                    info!(
                        pair = %self.market.id,
                        side = %order.side,
                        price = %order.price,
                        size = %order.size,
                        tx = %handle.id,
                        "Order placed"
                    );
                }
                Err(e) => {
                    report.failed += 1;
                    error!(
                        pair = %self.market.id,
                        side = %order.side,
                        price = %order.price,
                        error = %e,
                        "Order placement failed"
                    );
                }
            }
        }

        if let Some(partial) = report.partial_failure(&self.market.id) {
            warn!("{partial}");
        }
        report
    }

    /// Cancel every listed order. Failures are logged and skipped.
    pub async fn cancel_all(&self, orders: &[OpenOrder]) -> ReconcileReport {
        let mut report = ReconcileReport::default();

        for order in orders {
            let result = self
                .ctx
                .gateway()
                .cancel_order(self.subaccount, &self.market.id, &order.id, order.side.is_buy())
                .await
                .during("cancel_order");

            match result {
                Ok(_) => {
                    report.cancelled += 1;
                    debug!(pair = %self.market.id, order_id = %order.id, "Order cancelled");
                }
                Err(e) => {
                    report.cancel_failed += 1;
                    warn!(pair = %self.market.id, order_id = %order.id, error = %e, "Cancel failed");
                }
            }
        }
        report
    }

    /// Market buy spending a fixed quote notional.
    pub async fn market_buy_quote(&self, quote: Decimal) -> Result<TxHandle> {
        let quote = truncate_to_decimals(quote, self.market.quote.decimals);
        let request = MarketOrderRequest {
            subaccount: self.subaccount.to_string(),
            pair_id: self.market.id.clone(),
            is_buy: true,
            quote_amount: Some(to_fixed_point(quote, self.market.quote.decimals)?),
            base_amount: None,
            auto_cancel: true,
            reduce_only: false,
        };
        info!(pair = %self.market.id, %quote, "Submitting market buy by quote");
        self.ctx
            .gateway()
            .place_market_order(request)
            .await
            .during("place_market_order")
    }

    /// Market order for a base size, with an estimated quote bound.
    pub async fn market_order(
        &self,
        is_buy: bool,
        base: Decimal,
        quote: Option<Decimal>,
    ) -> Result<TxHandle> {
        let quote_amount = match quote {
            Some(q) => Some(to_fixed_point(
                truncate_to_decimals(q, self.market.quote.decimals),
                self.market.quote.decimals,
            )?),
            None => None,
        };
        let request = MarketOrderRequest {
            subaccount: self.subaccount.to_string(),
            pair_id: self.market.id.clone(),
            is_buy,
            quote_amount,
            base_amount: Some(to_fixed_point(base, self.market.base.decimals)?),
            auto_cancel: true,
            reduce_only: false,
        };
        info!(pair = %self.market.id, is_buy, %base, quote = ?quote, "Submitting market order");
        self.ctx
            .gateway()
            .place_market_order(request)
            .await
            .during("place_market_order")
    }
}
