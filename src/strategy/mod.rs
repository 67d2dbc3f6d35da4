//! Trading strategy implementation.
//!
//! Each strategy splits into a pure planning function (snapshot in, desired
//! orders out) and a `tick` that gathers the snapshot from the gateway and
//! hands the plan to the [`OrderReconciler`]:
//! - Grid: full ladder between two bounds, placed only into an empty book
//! - Market maker: inventory-skewed quotes, cancelled and replaced each cycle
//! - Accumulator: scheduled market buys (DCA)
//! - Funding arbitrage: long spot / short perp while funding pays shorts

mod accumulator;
mod funding_arb;
mod grid;
mod market_maker;
mod reconciler;

pub use accumulator::{plan_accumulation, AccumulationOrder, AccumulatorStrategy};
pub use funding_arb::{
    funding_rate_percent, plan_funding_arb, ArbAction, FundingArbStrategy, PerpPositionState,
};
pub use grid::{grid_inventory_ratio, grid_levels, plan_grid, GridStrategy};
pub use market_maker::{plan_quotes, quote_prices, MarketMakerStrategy, QuotePlan};
pub use reconciler::{OrderReconciler, ReconcileReport};

use crate::context::EngineContext;
use crate::error::Result;
use async_trait::async_trait;
use std::time::Duration;

/// Result of a single tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Nothing to do this tick
    Idle,
    /// Orders were submitted or cancelled
    Submitted(ReconcileReport),
}

/// A strategy driven by the runner's polling loop.
#[async_trait]
pub trait Strategy: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Delay between the end of one tick and the start of the next.
    fn interval(&self) -> Duration;

    /// Gather fresh state, decide, and execute. Errors abort only this tick.
    async fn tick(&mut self, ctx: &EngineContext) -> Result<TickOutcome>;
}
