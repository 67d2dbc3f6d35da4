//! Configuration management for the strategy engine.
//!
//! Loads settings from an optional config file and `BOT__`-prefixed
//! environment variables. The bot section is a tagged union with one variant
//! per strategy, validated once before any loop starts.

use crate::error::{EngineError, Result};
use crate::exchange::MarketPair;
use crate::utils::Interval;
use anyhow::Context;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Upper bound on market-maker quote levels per side.
pub const MAX_QUOTE_LEVELS: u32 = 50;

/// Smallest slippage tolerance the perp engine can express (1 bp).
const MIN_SLIPPAGE_PERCENT: Decimal = dec!(0.01);

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Gateway service connection
    #[serde(default)]
    pub gateway: GatewayConfig,
    /// Exchange-wide trading settings
    #[serde(default)]
    pub trading: TradingConfig,
    /// The bot to run
    pub bot: BotConfig,
    /// Seed state for the paper gateway (`--paper`)
    #[serde(default)]
    pub paper: PaperConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// API key sent with every request
    #[serde(default)]
    pub api_key: String,
    /// Secret for request signing
    #[serde(default)]
    pub secret_key: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradingConfig {
    /// Slippage tolerance for closing perp positions, in percent (1.0 = 1%)
    #[serde(default = "default_max_slippage_percent")]
    pub max_slippage_percent: Decimal,
}

/// Markets, prices and balances the paper gateway starts with.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PaperConfig {
    #[serde(default)]
    pub markets: Vec<MarketPair>,
    /// Base symbol -> oracle price
    #[serde(default)]
    pub oracle_prices: HashMap<String, Decimal>,
    /// Token symbol -> starting balance of the bot's subaccount
    #[serde(default)]
    pub balances: HashMap<String, Decimal>,
    /// Perp external id -> funding rate in percent
    #[serde(default)]
    pub funding_rates: HashMap<String, Decimal>,
}

/// One bot: a subaccount plus the strategy it runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BotConfig {
    /// Subaccount name, resolved against the signer's subaccounts at startup
    pub subaccount: String,
    #[serde(flatten)]
    pub strategy: StrategyConfig,
}

/// Strategy-specific parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum StrategyConfig {
    Grid(GridConfig),
    MarketMaker(MarketMakerConfig),
    Dca(DcaConfig),
    FundingArb(FundingArbConfig),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridConfig {
    pub pair: String,
    pub lower: Decimal,
    pub upper: Decimal,
    pub grids: u32,
    pub size_per_grid: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketMakerConfig {
    pub pair: String,
    /// Full bid/ask spread as a fraction of mid (0.002 = 0.2%)
    pub spread: Decimal,
    pub order_size: Decimal,
    #[serde(default = "default_levels")]
    pub levels: u32,
    /// Extra distance per level as a fraction of mid
    #[serde(default)]
    pub level_spacing: Decimal,
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval: Interval,
    #[serde(default = "default_inventory_target")]
    pub inventory_target: Decimal,
    #[serde(default = "default_max_skew")]
    pub max_skew: Decimal,
}

/// How a DCA amount is denominated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AmountType {
    #[default]
    Base,
    Quote,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DcaConfig {
    pub pair: String,
    pub amount: Decimal,
    pub interval: Interval,
    #[serde(default)]
    pub amount_type: AmountType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FundingArbConfig {
    pub spot_pair: String,
    pub perp_pair: String,
    /// Entry threshold in percent per funding period (0.01 = 0.01%)
    pub min_funding_rate: Decimal,
    /// Total notional in quote units, split evenly between the two legs
    pub amount: Decimal,
}

// Default value functions
fn default_base_url() -> String {
    "http://127.0.0.1:8080".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_slippage_percent() -> Decimal {
    dec!(1.0)
}

fn default_levels() -> u32 {
    1
}

fn default_refresh_interval() -> Interval {
    Interval::from_secs(30)
}

fn default_inventory_target() -> Decimal {
    dec!(0.5)
}

fn default_max_skew() -> Decimal {
    dec!(0.03)
}

fn config_error(msg: impl Into<String>) -> EngineError {
    EngineError::Configuration(msg.into())
}

fn ensure(condition: bool, msg: &str) -> Result<()> {
    if condition {
        Ok(())
    } else {
        Err(config_error(msg))
    }
}

impl EngineConfig {
    /// Load configuration from an optional file plus environment variables.
    pub fn load(path: Option<&str>) -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let mut builder = config::Config::builder();
        builder = match path {
            Some(p) => builder.add_source(config::File::with_name(p).required(true)),
            None => builder.add_source(config::File::with_name("bot").required(false)),
        };

        let config = builder
            .add_source(config::Environment::with_prefix("BOT").separator("__"))
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        ensure(
            !self.gateway.base_url.is_empty(),
            "gateway.base_url must be set",
        )?;
        ensure(
            self.trading.max_slippage_percent >= MIN_SLIPPAGE_PERCENT
                && self.trading.max_slippage_percent < dec!(100),
            "trading.max_slippage_percent must be at least 0.01 (1 bp) and below 100",
        )?;
        self.bot.validate()
    }
}

impl BotConfig {
    /// Check every required field before the loop starts.
    pub fn validate(&self) -> Result<()> {
        ensure(!self.subaccount.trim().is_empty(), "subaccount must be set")?;
        match &self.strategy {
            StrategyConfig::Grid(c) => c.validate(),
            StrategyConfig::MarketMaker(c) => c.validate(),
            StrategyConfig::Dca(c) => c.validate(),
            StrategyConfig::FundingArb(c) => c.validate(),
        }
    }

    /// Strategy tag as written in config.
    pub fn kind(&self) -> &'static str {
        match self.strategy {
            StrategyConfig::Grid(_) => "grid",
            StrategyConfig::MarketMaker(_) => "market_maker",
            StrategyConfig::Dca(_) => "dca",
            StrategyConfig::FundingArb(_) => "funding_arb",
        }
    }
}

impl GridConfig {
    fn validate(&self) -> Result<()> {
        ensure(!self.pair.is_empty(), "grid: pair must be set")?;
        ensure(self.lower > Decimal::ZERO, "grid: lower must be positive")?;
        ensure(self.upper > self.lower, "grid: upper must be above lower")?;
        ensure(self.grids >= 1, "grid: grids must be at least 1")?;
        ensure(
            self.size_per_grid > Decimal::ZERO,
            "grid: size_per_grid must be positive",
        )
    }
}

impl MarketMakerConfig {
    fn validate(&self) -> Result<()> {
        ensure(!self.pair.is_empty(), "market_maker: pair must be set")?;
        ensure(
            self.spread > Decimal::ZERO && self.spread < Decimal::ONE,
            "market_maker: spread must be between 0 and 1",
        )?;
        ensure(
            self.order_size > Decimal::ZERO,
            "market_maker: order_size must be positive",
        )?;
        ensure(
            (1..=MAX_QUOTE_LEVELS).contains(&self.levels),
            "market_maker: levels must be between 1 and 50",
        )?;
        ensure(
            self.level_spacing >= Decimal::ZERO,
            "market_maker: level_spacing must not be negative",
        )?;
        // the deepest bid has to stay above zero
        let deepest = self.spread / dec!(2) + Decimal::from(self.levels - 1) * self.level_spacing;
        ensure(
            deepest < Decimal::ONE,
            "market_maker: spread and level_spacing push the deepest bid below zero",
        )?;
        ensure(
            self.refresh_interval.as_millis() > 0,
            "market_maker: refresh_interval must be positive",
        )?;
        ensure(
            self.inventory_target >= Decimal::ZERO && self.inventory_target <= Decimal::ONE,
            "market_maker: inventory_target must be between 0 and 1",
        )?;
        ensure(
            self.max_skew >= Decimal::ZERO && self.max_skew < Decimal::ONE,
            "market_maker: max_skew must be in [0, 1)",
        )
    }
}

impl DcaConfig {
    fn validate(&self) -> Result<()> {
        ensure(!self.pair.is_empty(), "dca: pair must be set")?;
        ensure(self.amount > Decimal::ZERO, "dca: amount must be positive")?;
        ensure(
            self.interval.as_millis() > 0,
            "dca: interval must be positive",
        )
    }
}

impl FundingArbConfig {
    fn validate(&self) -> Result<()> {
        ensure(!self.spot_pair.is_empty(), "funding_arb: spot_pair must be set")?;
        ensure(!self.perp_pair.is_empty(), "funding_arb: perp_pair must be set")?;
        ensure(
            self.spot_pair != self.perp_pair,
            "funding_arb: spot_pair and perp_pair must differ",
        )?;
        ensure(self.amount > Decimal::ZERO, "funding_arb: amount must be positive")
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: String::new(),
            secret_key: String::new(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            max_slippage_percent: default_max_slippage_percent(),
        }
    }
}
