//! Explicit per-bot context handed to every strategy call.

use crate::clock::{Sleeper, TokioSleeper};
use crate::config::TradingConfig;
use crate::error::{GatewayResultExt, Result};
use crate::exchange::{ExchangeGateway, SigningIdentity};
use crate::pricing::PriceSource;
use std::sync::Arc;
use tracing::info;

/// Gateway handle, signer identity and configuration for one bot.
#[derive(Clone)]
pub struct EngineContext {
    pub gateway: Arc<dyn ExchangeGateway>,
    pub signer: SigningIdentity,
    pub trading: TradingConfig,
    pub prices: PriceSource,
    pub sleeper: Arc<dyn Sleeper>,
}

impl EngineContext {
    pub fn new(
        gateway: Arc<dyn ExchangeGateway>,
        signer: SigningIdentity,
        trading: TradingConfig,
    ) -> Self {
        Self {
            gateway,
            signer,
            trading,
            prices: PriceSource::default(),
            sleeper: Arc::new(TokioSleeper),
        }
    }

    /// Ask the gateway who is signing and build a context around it.
    pub async fn connect(gateway: Arc<dyn ExchangeGateway>, trading: TradingConfig) -> Result<Self> {
        let signer = gateway.signing_account().await.during("signing_account")?;
        info!(owner = %signer.address, "Connected to gateway");
        Ok(Self::new(gateway, signer, trading))
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn with_price_source(mut self, prices: PriceSource) -> Self {
        self.prices = prices;
        self
    }

    pub fn gateway(&self) -> &dyn ExchangeGateway {
        self.gateway.as_ref()
    }
}
