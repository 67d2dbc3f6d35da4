//! # Strategy Bot
//!
//! Automated trading strategies for a hybrid spot/perpetual exchange, driven
//! through an exchange gateway service.
//!
//! ## Architecture
//!
//! - `config`: Configuration loading and validation
//! - `exchange`: Gateway trait, REST client and in-memory paper gateway
//! - `pricing`: Reference price resolution and inventory skew
//! - `strategy`: Grid, market maker, DCA and funding arbitrage
//! - `runner`: Per-bot polling loop and statistics
//! - `utils`: Decimal quantization, fixed-point conversion, intervals

pub mod clock;
pub mod config;
pub mod context;
pub mod error;
pub mod exchange;
pub mod pricing;
pub mod runner;
pub mod strategy;
pub mod utils;

pub use config::EngineConfig;
pub use context::EngineContext;
pub use error::{EngineError, Result};
pub use runner::{run, RunnerStats, StrategyRunner};
