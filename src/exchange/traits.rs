//! Venue-agnostic gateway trait consumed by every strategy.
//!
//! The engine never talks to an exchange directly. Implementations cover the
//! REST gateway service ([`super::RestGateway`]) and the in-memory paper
//! gateway ([`super::MockGateway`]).

use super::types::*;
use async_trait::async_trait;

/// Everything the strategy engine needs from the exchange side.
///
/// All amounts crossing this boundary are fixed-point integers in the token's
/// own decimals, except perpetual sizes and prices which the perp engine
/// takes as decimals.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ExchangeGateway: Send + Sync {
    /// Look up a pair by its human identifier.
    async fn find_market(&self, pair_id: &str) -> anyhow::Result<Option<MarketPair>>;

    /// Current oracle prices (6 decimals).
    async fn oracle_prices(&self) -> anyhow::Result<Vec<OraclePrice>>;

    /// Token balance held by a subaccount (fixed point, token decimals).
    async fn subaccount_balance(&self, subaccount: &str, token: &str) -> anyhow::Result<u128>;

    async fn open_spot_orders(
        &self,
        subaccount: &str,
        pair_id: &str,
    ) -> anyhow::Result<Vec<OpenOrder>>;

    async fn place_limit_order(&self, order: LimitOrderRequest) -> anyhow::Result<TxHandle>;

    async fn place_market_order(&self, order: MarketOrderRequest) -> anyhow::Result<TxHandle>;

    async fn cancel_order(
        &self,
        subaccount: &str,
        pair_id: &str,
        order_id: &str,
        is_buy: bool,
    ) -> anyhow::Result<TxHandle>;

    async fn place_perp_order(&self, order: PerpOrderRequest) -> anyhow::Result<TxHandle>;

    async fn close_perp_position(&self, request: ClosePerpRequest) -> anyhow::Result<TxHandle>;

    async fn perp_positions(
        &self,
        subaccount: &str,
        market_ids: &[String],
    ) -> anyhow::Result<Vec<PerpPosition>>;

    async fn perp_market(&self, market_id: &str) -> anyhow::Result<PerpMarketInfo>;

    /// Identity of the key the gateway signs with.
    async fn signing_account(&self) -> anyhow::Result<SigningIdentity>;

    /// Subaccounts owned by `owner`.
    async fn subaccounts(&self, owner: &str) -> anyhow::Result<Vec<Subaccount>>;
}
