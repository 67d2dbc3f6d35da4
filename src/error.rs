//! Error taxonomy for the strategy engine.
//!
//! Startup errors (`Configuration`, `MarketNotFound`, `SubaccountNotFound`) are
//! fatal and surface to the operator. Everything raised inside a tick is logged
//! by the runner and the loop carries on at the next interval.

use thiserror::Error;

/// Errors produced by the engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Missing or invalid strategy parameters.
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("market not found: {0}")]
    MarketNotFound(String),

    #[error("subaccount not found: {0}")]
    SubaccountNotFound(String),

    /// Every price source in the fallback chain came back empty or zero.
    #[error("no usable price for {symbol} (tried: {tried})")]
    PriceUnavailable { symbol: String, tried: String },

    /// A network or contract call failed. Never escalated to a fatal stop.
    #[error("gateway call `{operation}` failed: {cause:#}")]
    Gateway {
        operation: &'static str,
        cause: anyhow::Error,
    },

    /// Some orders of a multi-order submission failed.
    #[error("{failed} of {attempted} order submissions failed on {pair}")]
    PartialSubmission {
        pair: String,
        attempted: usize,
        failed: usize,
    },

    #[error("invalid interval `{0}`: expected <number><s|m|h|d>")]
    InvalidInterval(String),

    #[error("fixed-point conversion failed: {0}")]
    FixedPoint(String),
}

impl EngineError {
    /// Whether this error must stop the bot before its loop starts.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            EngineError::Configuration(_)
                | EngineError::MarketNotFound(_)
                | EngineError::SubaccountNotFound(_)
                | EngineError::InvalidInterval(_)
        )
    }

    pub fn gateway(operation: &'static str, cause: anyhow::Error) -> Self {
        EngineError::Gateway { operation, cause }
    }
}

/// Attach the gateway operation name to an `anyhow` result.
pub trait GatewayResultExt<T> {
    fn during(self, operation: &'static str) -> Result<T>;
}

impl<T> GatewayResultExt<T> for anyhow::Result<T> {
    fn during(self, operation: &'static str) -> Result<T> {
        self.map_err(|cause| EngineError::gateway(operation, cause))
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
