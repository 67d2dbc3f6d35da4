//! Strategy runner: one sequential polling loop per bot.
//!
//! Startup is all-or-nothing: the bot config is validated and the subaccount
//! and markets are resolved before the first tick, and any failure there is
//! fatal. Once the loop runs, a failed tick is logged and counted, and the
//! loop simply carries on after the strategy's interval.

use crate::config::{AmountType, BotConfig, StrategyConfig};
use crate::context::EngineContext;
use crate::error::{EngineError, GatewayResultExt, Result};
use crate::exchange::MarketPair;
use crate::strategy::{
    AccumulatorStrategy, FundingArbStrategy, GridStrategy, MarketMakerStrategy, Strategy,
    TickOutcome,
};
use crate::utils::decimal::{quantize_size, truncate_to_decimals};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::convert::Infallible;
use tracing::{debug, error, info, warn};

/// Log a stats summary every this many ticks.
const STATS_EVERY: u64 = 10;

/// Counters for one bot's loop.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunnerStats {
    pub ticks: u64,
    pub failed_ticks: u64,
    pub consecutive_failures: u64,
    pub last_error: Option<String>,
    pub last_tick_at: Option<DateTime<Utc>>,
    pub orders_placed: u64,
    pub orders_failed: u64,
}

impl RunnerStats {
    fn record(&mut self, result: &Result<TickOutcome>) {
        self.ticks += 1;
        self.last_tick_at = Some(Utc::now());
        match result {
            Ok(outcome) => {
                self.consecutive_failures = 0;
                if let TickOutcome::Submitted(report) = outcome {
                    self.orders_placed += report.placed as u64;
                    self.orders_failed += report.failed as u64;
                }
            }
            Err(e) => {
                self.failed_ticks += 1;
                self.consecutive_failures += 1;
                self.last_error = Some(e.to_string());
            }
        }
    }
}

/// A prepared bot: a strategy plus the context it trades through.
pub struct StrategyRunner {
    strategy: Box<dyn Strategy>,
    ctx: EngineContext,
    stats: RunnerStats,
}

impl StrategyRunner {
    /// Validate the config and resolve everything the loop needs.
    pub async fn prepare(bot: &BotConfig, ctx: EngineContext) -> Result<Self> {
        bot.validate()?;
        let subaccount = resolve_subaccount(&ctx, &bot.subaccount).await?;

        let strategy: Box<dyn Strategy> = match &bot.strategy {
            StrategyConfig::Grid(config) => {
                let market = resolve_market(&ctx, &config.pair).await?;
                ensure_tradable_size("size_per_grid", config.size_per_grid, &market)?;
                Box::new(GridStrategy::new(config.clone(), market, subaccount))
            }
            StrategyConfig::MarketMaker(config) => {
                let market = resolve_market(&ctx, &config.pair).await?;
                ensure_tradable_size("order_size", config.order_size, &market)?;
                Box::new(MarketMakerStrategy::new(config.clone(), market, subaccount))
            }
            StrategyConfig::Dca(config) => {
                let market = resolve_market(&ctx, &config.pair).await?;
                match config.amount_type {
                    AmountType::Base => ensure_tradable_size("amount", config.amount, &market)?,
                    AmountType::Quote => ensure_tradable_quote("amount", config.amount, &market)?,
                }
                Box::new(AccumulatorStrategy::new(config.clone(), market, subaccount))
            }
            StrategyConfig::FundingArb(config) => {
                let spot = resolve_market(&ctx, &config.spot_pair).await?;
                let perp = resolve_market(&ctx, &config.perp_pair).await?;
                if !perp.is_perp {
                    return Err(EngineError::Configuration(format!(
                        "{} is not a perpetual market",
                        perp.id
                    )));
                }
                Box::new(FundingArbStrategy::new(config.clone(), spot, perp, subaccount))
            }
        };

        info!(
            strategy = strategy.name(),
            subaccount = %bot.subaccount,
            interval_ms = strategy.interval().as_millis() as u64,
            "Bot prepared"
        );
        Ok(Self::new(strategy, ctx))
    }

    /// Wrap an already built strategy.
    pub fn new(strategy: Box<dyn Strategy>, ctx: EngineContext) -> Self {
        Self {
            strategy,
            ctx,
            stats: RunnerStats::default(),
        }
    }

    pub fn stats(&self) -> &RunnerStats {
        &self.stats
    }

    /// Run one tick and fold its result into the stats. Never fails.
    pub async fn run_tick(&mut self) -> &RunnerStats {
        let result = self.strategy.tick(&self.ctx).await;
        match &result {
            Ok(TickOutcome::Idle) => debug!(strategy = self.strategy.name(), "Tick idle"),
            Ok(TickOutcome::Submitted(report)) => info!(
                strategy = self.strategy.name(),
                placed = report.placed,
                failed = report.failed,
                cancelled = report.cancelled,
                cancel_failed = report.cancel_failed,
                "Tick complete"
            ),
            Err(e) => error!(
                strategy = self.strategy.name(),
                error = %e,
                consecutive = self.stats.consecutive_failures + 1,
                "Tick failed"
            ),
        }
        self.stats.record(&result);

        if self.stats.ticks % STATS_EVERY == 0 {
            self.log_stats();
        }
        &self.stats
    }

    /// Run `n` ticks with the strategy's interval between them.
    pub async fn run_ticks(&mut self, n: u64) -> &RunnerStats {
        for i in 0..n {
            if i > 0 {
                self.ctx.sleeper.sleep(self.strategy.interval()).await;
            }
            self.run_tick().await;
        }
        &self.stats
    }

    /// Tick forever. Only process termination stops the loop.
    pub async fn run_forever(&mut self) -> Infallible {
        info!(strategy = self.strategy.name(), "Starting loop");
        loop {
            self.run_tick().await;
            self.ctx.sleeper.sleep(self.strategy.interval()).await;
        }
    }

    fn log_stats(&self) {
        let s = &self.stats;
        info!(
            strategy = self.strategy.name(),
            ticks = s.ticks,
            failed = s.failed_ticks,
            consecutive_failures = s.consecutive_failures,
            orders_placed = s.orders_placed,
            orders_failed = s.orders_failed,
            last_error = s.last_error.as_deref().unwrap_or("-"),
            "Runner stats"
        );
    }
}

/// Validate, resolve, and run a bot until the process exits.
///
/// Returns only if startup fails.
pub async fn run(bot: &BotConfig, ctx: EngineContext) -> Result<Infallible> {
    let mut runner = StrategyRunner::prepare(bot, ctx).await?;
    Ok(runner.run_forever().await)
}

/// Map a subaccount name (or address) owned by the signer to its address.
async fn resolve_subaccount(ctx: &EngineContext, name: &str) -> Result<String> {
    let subaccounts = ctx
        .gateway()
        .subaccounts(&ctx.signer.address)
        .await
        .during("subaccounts")?;
    subaccounts
        .into_iter()
        .find(|s| s.name == name || s.address == name)
        .map(|s| {
            debug!(%name, address = %s.address, "Resolved subaccount");
            s.address
        })
        .ok_or_else(|| EngineError::SubaccountNotFound(name.to_string()))
}

async fn resolve_market(ctx: &EngineContext, pair: &str) -> Result<MarketPair> {
    ctx.gateway()
        .find_market(pair)
        .await
        .during("find_market")?
        .ok_or_else(|| EngineError::MarketNotFound(pair.to_string()))
}

fn ensure_tradable_size(field: &str, size: Decimal, market: &MarketPair) -> Result<()> {
    if quantize_size(size, market.step_size).is_zero() {
        warn!(pair = %market.id, %size, step = %market.step_size, "Size below step");
        return Err(EngineError::Configuration(format!(
            "{field} {size} rounds to zero at step size {} on {}",
            market.step_size, market.id
        )));
    }
    Ok(())
}

fn ensure_tradable_quote(field: &str, amount: Decimal, market: &MarketPair) -> Result<()> {
    if truncate_to_decimals(amount, market.quote.decimals).is_zero() {
        warn!(pair = %market.id, %amount, decimals = market.quote.decimals, "Amount below quote precision");
        return Err(EngineError::Configuration(format!(
            "{field} {amount} truncates to zero at {} {} decimals on {}",
            market.quote.decimals, market.quote.symbol, market.id
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::RecordingSleeper;
    use crate::config::{AmountType, DcaConfig, FundingArbConfig, GridConfig, TradingConfig};
    use crate::exchange::{MockGateway, SigningIdentity, Token};
    use crate::exchange::ExchangeGateway;
    use crate::utils::Interval;
    use rust_decimal_macros::dec;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio_test::assert_ok;

    fn btc() -> MarketPair {
        MarketPair {
            id: "BTC/USDC".to_string(),
            base: Token::new("BTC", 8),
            quote: Token::new("USDC", 6),
            tick_size: dec!(0.1),
            step_size: dec!(0.0001),
            is_perp: false,
            external_id: "0xbtc".to_string(),
            reference_price: None,
        }
    }

    fn grid_bot(size_per_grid: Decimal) -> BotConfig {
        BotConfig {
            subaccount: "main".to_string(),
            strategy: StrategyConfig::Grid(GridConfig {
                pair: "BTC/USDC".to_string(),
                lower: dec!(60000),
                upper: dec!(70000),
                grids: 4,
                size_per_grid,
            }),
        }
    }

    fn dca_bot() -> BotConfig {
        BotConfig {
            subaccount: "main".to_string(),
            strategy: StrategyConfig::Dca(DcaConfig {
                pair: "BTC/USDC".to_string(),
                amount: dec!(10),
                interval: Interval::from_secs(3600),
                amount_type: AmountType::Quote,
            }),
        }
    }

    async fn setup() -> (MockGateway, Arc<RecordingSleeper>, EngineContext) {
        let gw = MockGateway::new("0xowner");
        gw.add_market(btc()).await;
        gw.add_subaccount("main", "0xsub").await;
        let sleeper = Arc::new(RecordingSleeper::new());
        let ctx = EngineContext::new(
            Arc::new(gw.clone()),
            SigningIdentity {
                address: "0xowner".to_string(),
            },
            TradingConfig::default(),
        )
        .with_sleeper(sleeper.clone());
        (gw, sleeper, ctx)
    }

    #[tokio::test]
    async fn test_unknown_subaccount_is_fatal() {
        let (_gw, _sleeper, ctx) = setup().await;
        let bot = BotConfig {
            subaccount: "other".to_string(),
            ..grid_bot(dec!(0.001))
        };
        let err = StrategyRunner::prepare(&bot, ctx).await.err().unwrap();
        assert!(matches!(err, EngineError::SubaccountNotFound(ref n) if n == "other"));
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_unknown_market_is_fatal() {
        let (_gw, _sleeper, ctx) = setup().await;
        let mut bot = grid_bot(dec!(0.001));
        if let StrategyConfig::Grid(ref mut c) = bot.strategy {
            c.pair = "DOGE/USDC".to_string();
        }
        let err = StrategyRunner::prepare(&bot, ctx).await.err().unwrap();
        assert!(matches!(err, EngineError::MarketNotFound(_)));
    }

    #[tokio::test]
    async fn test_size_below_step_is_rejected_before_loop() {
        let (gw, _sleeper, ctx) = setup().await;
        let err = StrategyRunner::prepare(&grid_bot(dec!(0.00004)), ctx)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, EngineError::Configuration(_)));
        assert!(gw.calls().await.is_empty());
    }

    #[tokio::test]
    async fn test_dca_amounts_that_round_to_zero_are_rejected() {
        let (gw, _sleeper, ctx) = setup().await;

        let below_step = BotConfig {
            subaccount: "main".to_string(),
            strategy: StrategyConfig::Dca(DcaConfig {
                pair: "BTC/USDC".to_string(),
                amount: dec!(0.00003),
                interval: Interval::from_secs(3600),
                amount_type: AmountType::Base,
            }),
        };
        let err = StrategyRunner::prepare(&below_step, ctx.clone()).await.err().unwrap();
        assert!(matches!(err, EngineError::Configuration(ref m) if m.contains("amount")));

        let below_quote_precision = BotConfig {
            subaccount: "main".to_string(),
            strategy: StrategyConfig::Dca(DcaConfig {
                pair: "BTC/USDC".to_string(),
                amount: dec!(0.0000004),
                interval: Interval::from_secs(3600),
                amount_type: AmountType::Quote,
            }),
        };
        let err = StrategyRunner::prepare(&below_quote_precision, ctx.clone()).await.err().unwrap();
        assert!(matches!(err, EngineError::Configuration(_)));
        assert!(gw.calls().await.is_empty());

        // exactly one step is fine
        let one_step = BotConfig {
            subaccount: "main".to_string(),
            strategy: StrategyConfig::Dca(DcaConfig {
                pair: "BTC/USDC".to_string(),
                amount: dec!(0.0001),
                interval: Interval::from_secs(3600),
                amount_type: AmountType::Base,
            }),
        };
        assert_ok!(StrategyRunner::prepare(&one_step, ctx).await);
    }

    #[tokio::test]
    async fn test_funding_arb_requires_perp_market() {
        let (gw, _sleeper, ctx) = setup().await;
        gw.add_market(MarketPair {
            id: "BTC-PERP".to_string(),
            ..btc()
        })
        .await;
        let bot = BotConfig {
            subaccount: "main".to_string(),
            strategy: StrategyConfig::FundingArb(FundingArbConfig {
                spot_pair: "BTC/USDC".to_string(),
                perp_pair: "BTC-PERP".to_string(),
                min_funding_rate: dec!(0.01),
                amount: dec!(1000),
            }),
        };
        let err = StrategyRunner::prepare(&bot, ctx).await.err().unwrap();
        assert!(matches!(err, EngineError::Configuration(ref m) if m.contains("perpetual")));
    }

    #[tokio::test]
    async fn test_failed_ticks_do_not_stop_the_loop() {
        let (gw, sleeper, ctx) = setup().await;
        gw.set_balance("0xsub", &Token::new("USDC", 6), dec!(100)).await.unwrap();
        gw.fail_next("place_market_order", 2).await;

        let mut runner = assert_ok!(StrategyRunner::prepare(&dca_bot(), ctx).await);
        gw.set_oracle_price("BTC", dec!(50000)).await.unwrap();

        let stats = runner.run_ticks(4).await.clone();
        assert_eq!(stats.ticks, 4);
        assert_eq!(stats.failed_ticks, 2);
        assert_eq!(stats.consecutive_failures, 0);
        assert_eq!(stats.orders_placed, 2);
        assert!(stats.last_error.unwrap().contains("place_market_order"));
        assert!(stats.last_tick_at.is_some());

        // one interval between consecutive ticks
        assert_eq!(sleeper.recorded(), vec![Duration::from_secs(3600); 3]);
        assert_eq!(gw.balance("0xsub", "USDC").await, 80_000_000);
    }

    #[tokio::test]
    async fn test_consecutive_failures_accumulate() {
        let (gw, _sleeper, ctx) = setup().await;
        gw.fail_next("open_spot_orders", 3).await;

        let mut runner = assert_ok!(StrategyRunner::prepare(&grid_bot(dec!(0.001)), ctx).await);
        let stats = runner.run_ticks(3).await;
        assert_eq!(stats.failed_ticks, 3);
        assert_eq!(stats.consecutive_failures, 3);
        assert_eq!(stats.orders_placed, 0);
    }

    #[tokio::test]
    async fn test_grid_bot_places_once_then_idles() {
        let (gw, _sleeper, ctx) = setup().await;
        gw.set_oracle_price("BTC", dec!(65000)).await.unwrap();
        // half the grid held as base keeps the ladder unskewed
        gw.set_balance("0xsub", &Token::new("BTC", 8), dec!(0.002)).await.unwrap();

        let mut runner = assert_ok!(StrategyRunner::prepare(&grid_bot(dec!(0.001)), ctx).await);
        let stats = runner.run_ticks(3).await;
        assert_eq!(stats.failed_ticks, 0);
        // 60000, 62500, 67500, 70000; 65000 sits on the price
        assert_eq!(stats.orders_placed, 4);
        assert_eq!(gw.open_spot_orders("0xsub", "BTC/USDC").await.unwrap().len(), 4);
    }
}
