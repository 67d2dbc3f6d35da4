//! Strategy Bot - Main Entry Point
//!
//! Runs one configured bot against the gateway service, or against the
//! in-memory paper gateway with `--paper`.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use std::sync::Arc;
use strategy_bot::config::EngineConfig;
use strategy_bot::exchange::{ExchangeGateway, MockGateway, RestGateway};
use strategy_bot::strategy::grid_levels;
use strategy_bot::{runner, EngineContext};
use tracing::{error, info, warn, Level};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

const PAPER_OWNER: &str = "paper-owner";

/// Strategy Bot CLI
#[derive(Parser)]
#[command(name = "strategy-bot")]
#[command(version, about = "Grid, market-making, DCA and funding-arbitrage bots")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the configured bot until interrupted
    Run {
        /// Path to the config file (TOML, YAML or JSON)
        #[arg(short, long)]
        config: Option<String>,

        /// Trade against the in-memory paper gateway
        #[arg(long)]
        paper: bool,
    },

    /// Load and validate a config file without trading
    Validate {
        #[arg(short, long)]
        config: Option<String>,
    },

    /// Print the price levels of a grid
    Levels {
        #[arg(long)]
        lower: Decimal,

        #[arg(long)]
        upper: Decimal,

        #[arg(long)]
        grids: u32,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging()?;

    match cli.command {
        Commands::Run { config, paper } => run_bot(config.as_deref(), paper).await,
        Commands::Validate { config } => validate(config.as_deref()),
        Commands::Levels {
            lower,
            upper,
            grids,
        } => {
            for (i, level) in grid_levels(lower, upper, grids).iter().enumerate() {
                println!("{i:>4}  {level}");
            }
            Ok(())
        }
    }
}

fn load_config(path: Option<&str>) -> Result<EngineConfig> {
    let config = EngineConfig::load(path)?;
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn validate(path: Option<&str>) -> Result<()> {
    let config = load_config(path)?;
    info!(
        strategy = config.bot.kind(),
        subaccount = %config.bot.subaccount,
        "Configuration is valid"
    );
    Ok(())
}

async fn run_bot(path: Option<&str>, paper: bool) -> Result<()> {
    let config = load_config(path)?;

    info!(
        "Strategy Bot v{} starting ({} on {})",
        env!("CARGO_PKG_VERSION"),
        config.bot.kind(),
        config.bot.subaccount
    );

    let gateway: Arc<dyn ExchangeGateway> = if paper {
        info!("PAPER TRADING MODE - orders go to the in-memory gateway");
        Arc::new(MockGateway::seeded(PAPER_OWNER, &config.bot.subaccount, &config.paper).await?)
    } else {
        warn!(base_url = %config.gateway.base_url, "LIVE TRADING MODE - real funds at risk");
        Arc::new(RestGateway::new(&config.gateway)?)
    };

    let ctx = EngineContext::connect(gateway, config.trading.clone()).await?;

    match runner::run(&config.bot, ctx).await {
        Ok(never) => match never {},
        Err(e) => {
            error!(error = %e, fatal = e.is_fatal(), "Bot failed to start");
            Err(e.into())
        }
    }
}

/// Initialize logging to stdout and an hourly rolling file.
fn init_logging() -> Result<()> {
    use tracing_subscriber::fmt::writer::MakeWriterExt;

    std::fs::create_dir_all("logs")?;

    let file_appender = tracing_appender::rolling::hourly("logs", "strategy-bot.log");
    let (file_writer, _guard) = tracing_appender::non_blocking(file_appender);

    // Leak the guard to keep it alive for the program duration
    Box::leak(Box::new(_guard));

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("strategy_bot=debug".parse()?)
                .add_directive(Level::INFO.into()),
        )
        .with_writer(std::io::stdout.and(file_writer))
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .init();

    Ok(())
}
