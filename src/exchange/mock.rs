//! In-memory paper gateway for dry runs and tests.
//!
//! Limit orders rest on a simulated book until cancelled, market orders fill
//! immediately at the oracle price (falling back to the pair's reference
//! price), and perp orders open or grow a position. Every mutating call is
//! recorded so tests can assert on exactly what a strategy submitted.

use super::traits::ExchangeGateway;
use super::types::*;
use crate::config::PaperConfig;
use crate::utils::decimal::{from_fixed_point, to_fixed_point, truncate_to_decimals};
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// A mutating call made against the mock.
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayCall {
    PlaceLimit(LimitOrderRequest),
    PlaceMarket(MarketOrderRequest),
    Cancel { pair_id: String, order_id: String, is_buy: bool },
    PlacePerp(PerpOrderRequest),
    ClosePerp(ClosePerpRequest),
}

#[derive(Debug, Clone)]
struct FailureRule {
    operation: &'static str,
    /// Calls to let through before failing
    skip: usize,
    /// Failures left to inject
    remaining: usize,
}

/// Simulated exchange state.
#[derive(Debug, Default)]
pub struct MockExchangeState {
    pub markets: HashMap<String, MarketPair>,
    /// symbol -> price (6 decimals)
    pub oracle_prices: HashMap<String, u128>,
    /// (subaccount, token) -> fixed-point balance
    pub balances: HashMap<(String, String), u128>,
    /// (subaccount, pair) -> resting orders
    pub open_orders: HashMap<(String, String), Vec<OpenOrder>>,
    /// (subaccount, market) -> position
    pub perp_positions: HashMap<(String, String), PerpPosition>,
    pub perp_markets: HashMap<String, PerpMarketInfo>,
    pub subaccounts: HashMap<String, Vec<Subaccount>>,
    pub calls: Vec<GatewayCall>,
    failures: Vec<FailureRule>,
}

/// Paper-trading gateway.
#[derive(Clone)]
pub struct MockGateway {
    state: Arc<RwLock<MockExchangeState>>,
    signer: SigningIdentity,
    order_id_counter: Arc<AtomicU64>,
}

impl MockGateway {
    /// Create an empty mock owned by `owner`.
    pub fn new(owner: impl Into<String>) -> Self {
        Self {
            state: Arc::new(RwLock::new(MockExchangeState::default())),
            signer: SigningIdentity {
                address: owner.into(),
            },
            order_id_counter: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Build a paper exchange from config, with `subaccount` funded by the
    /// configured balances.
    pub async fn seeded(owner: &str, subaccount: &str, paper: &PaperConfig) -> Result<Self> {
        let gateway = Self::new(owner);
        let address = format!("paper-{subaccount}");
        gateway.add_subaccount(subaccount, &address).await;

        let tokens: Vec<Token> = paper
            .markets
            .iter()
            .flat_map(|m| [m.base.clone(), m.quote.clone()])
            .collect();
        let canonical = |symbol: &str| {
            tokens
                .iter()
                .find(|t| t.symbol.eq_ignore_ascii_case(symbol))
                .map(|t| t.symbol.clone())
                .unwrap_or_else(|| symbol.to_string())
        };

        for market in &paper.markets {
            gateway.add_market(market.clone()).await;
        }
        for (symbol, price) in &paper.oracle_prices {
            gateway.set_oracle_price(&canonical(symbol), *price).await?;
        }
        for (symbol, amount) in &paper.balances {
            let token = tokens
                .iter()
                .find(|t| t.symbol.eq_ignore_ascii_case(symbol))
                .with_context(|| format!("paper balance for unknown token {symbol}"))?;
            gateway.set_balance(&address, token, *amount).await?;
        }
        for (market_id, rate_pct) in &paper.funding_rates {
            let oracle_price = match paper.markets.iter().find(|m| &m.external_id == market_id) {
                Some(m) => paper
                    .oracle_prices
                    .iter()
                    .find(|(s, _)| s.eq_ignore_ascii_case(&m.base.symbol))
                    .map(|(_, p)| to_fixed_point(*p, ORACLE_PRICE_DECIMALS))
                    .transpose()?
                    .unwrap_or(0),
                None => 0,
            };
            let funding_rate = (*rate_pct / dec!(100) * Decimal::from(10u64.pow(PERP_DECIMALS)))
                .trunc()
                .to_i128()
                .with_context(|| format!("funding rate {rate_pct} out of range"))?;
            gateway
                .set_perp_market(PerpMarketInfo {
                    market_id: market_id.clone(),
                    funding_rate,
                    oracle_price,
                })
                .await;
        }

        info!(
            %owner,
            %subaccount,
            markets = paper.markets.len(),
            balances = paper.balances.len(),
            "Paper gateway seeded"
        );
        Ok(gateway)
    }

    pub async fn add_market(&self, pair: MarketPair) {
        self.state.write().await.markets.insert(pair.id.clone(), pair);
    }

    pub async fn add_subaccount(&self, name: &str, address: &str) {
        let owner = self.signer.address.clone();
        self.state
            .write()
            .await
            .subaccounts
            .entry(owner)
            .or_default()
            .push(Subaccount {
                name: name.to_string(),
                address: address.to_string(),
            });
    }

    pub async fn set_oracle_price(&self, symbol: &str, price: Decimal) -> Result<()> {
        let raw = to_fixed_point(price, ORACLE_PRICE_DECIMALS)?;
        self.state
            .write()
            .await
            .oracle_prices
            .insert(symbol.to_string(), raw);
        Ok(())
    }

    pub async fn clear_oracle_prices(&self) {
        self.state.write().await.oracle_prices.clear();
    }

    /// Set a balance in human units using the token's decimals.
    pub async fn set_balance(&self, subaccount: &str, token: &Token, amount: Decimal) -> Result<()> {
        let raw = to_fixed_point(amount, token.decimals)?;
        self.state
            .write()
            .await
            .balances
            .insert((subaccount.to_string(), token.symbol.clone()), raw);
        Ok(())
    }

    pub async fn set_perp_market(&self, info: PerpMarketInfo) {
        self.state
            .write()
            .await
            .perp_markets
            .insert(info.market_id.clone(), info);
    }

    pub async fn set_perp_position(&self, subaccount: &str, position: PerpPosition) {
        self.state.write().await.perp_positions.insert(
            (subaccount.to_string(), position.market_id.clone()),
            position,
        );
    }

    pub async fn add_open_order(&self, subaccount: &str, pair_id: &str, order: OpenOrder) {
        self.state
            .write()
            .await
            .open_orders
            .entry((subaccount.to_string(), pair_id.to_string()))
            .or_default()
            .push(order);
    }

    /// Fail the next `count` calls of `operation`.
    pub async fn fail_next(&self, operation: &'static str, count: usize) {
        self.fail_after(operation, 0, count).await;
    }

    /// Let `skip` calls of `operation` through, then fail the following `count`.
    pub async fn fail_after(&self, operation: &'static str, skip: usize, count: usize) {
        self.state.write().await.failures.push(FailureRule {
            operation,
            skip,
            remaining: count,
        });
    }

    /// Mutating calls recorded so far.
    pub async fn calls(&self) -> Vec<GatewayCall> {
        self.state.read().await.calls.clone()
    }

    pub async fn clear_calls(&self) {
        self.state.write().await.calls.clear();
    }

    pub async fn balance(&self, subaccount: &str, token: &str) -> u128 {
        self.state
            .read()
            .await
            .balances
            .get(&(subaccount.to_string(), token.to_string()))
            .copied()
            .unwrap_or(0)
    }

    fn next_order_id(&self) -> String {
        format!("mock-{}", self.order_id_counter.fetch_add(1, Ordering::SeqCst))
    }

    fn check_failure(state: &mut MockExchangeState, operation: &'static str) -> Result<()> {
        if let Some(rule) = state
            .failures
            .iter_mut()
            .find(|r| r.operation == operation && (r.skip > 0 || r.remaining > 0))
        {
            if rule.skip > 0 {
                rule.skip -= 1;
                return Ok(());
            }
            rule.remaining -= 1;
            bail!("injected failure in {operation}");
        }
        Ok(())
    }

    fn market<'a>(state: &'a MockExchangeState, pair_id: &str) -> Result<&'a MarketPair> {
        state
            .markets
            .get(pair_id)
            .ok_or_else(|| anyhow!("unknown pair {pair_id}"))
    }

    fn fill_price(state: &MockExchangeState, pair: &MarketPair) -> Result<Decimal> {
        if let Some(raw) = state.oracle_prices.get(&pair.base.symbol) {
            let price = from_fixed_point(*raw, ORACLE_PRICE_DECIMALS)?;
            if !price.is_zero() {
                return Ok(price);
            }
        }
        pair.reference_price
            .filter(|p| !p.is_zero())
            .ok_or_else(|| anyhow!("no fill price for {}", pair.id))
    }

    fn adjust_balance(
        state: &mut MockExchangeState,
        subaccount: &str,
        token: &str,
        delta: i128,
    ) -> Result<()> {
        let entry = state
            .balances
            .entry((subaccount.to_string(), token.to_string()))
            .or_insert(0);
        let current = i128::try_from(*entry)?;
        let next = current + delta;
        if next < 0 {
            bail!("insufficient {token} balance in {subaccount}");
        }
        *entry = u128::try_from(next)?;
        Ok(())
    }
}

#[async_trait]
impl ExchangeGateway for MockGateway {
    async fn find_market(&self, pair_id: &str) -> Result<Option<MarketPair>> {
        let mut state = self.state.write().await;
        Self::check_failure(&mut state, "find_market")?;
        Ok(state.markets.get(pair_id).cloned())
    }

    async fn oracle_prices(&self) -> Result<Vec<OraclePrice>> {
        let mut state = self.state.write().await;
        Self::check_failure(&mut state, "oracle_prices")?;
        Ok(state
            .oracle_prices
            .iter()
            .map(|(symbol, price)| OraclePrice {
                symbol: symbol.clone(),
                price: *price,
            })
            .collect())
    }

    async fn subaccount_balance(&self, subaccount: &str, token: &str) -> Result<u128> {
        let mut state = self.state.write().await;
        Self::check_failure(&mut state, "subaccount_balance")?;
        Ok(state
            .balances
            .get(&(subaccount.to_string(), token.to_string()))
            .copied()
            .unwrap_or(0))
    }

    async fn open_spot_orders(&self, subaccount: &str, pair_id: &str) -> Result<Vec<OpenOrder>> {
        let mut state = self.state.write().await;
        Self::check_failure(&mut state, "open_spot_orders")?;
        Ok(state
            .open_orders
            .get(&(subaccount.to_string(), pair_id.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    async fn place_limit_order(&self, order: LimitOrderRequest) -> Result<TxHandle> {
        let mut state = self.state.write().await;
        state.calls.push(GatewayCall::PlaceLimit(order.clone()));
        Self::check_failure(&mut state, "place_limit_order")?;

        let pair = Self::market(&state, &order.pair_id)?.clone();
        if order.base_amount == 0 {
            bail!("limit order with zero size on {}", pair.id);
        }
        let base = from_fixed_point(order.base_amount, pair.base.decimals)?;
        let quote = from_fixed_point(order.quote_amount, pair.quote.decimals)?;
        let price = quote / base;

        let id = self.next_order_id();
        debug!(%id, pair = %pair.id, is_buy = order.is_buy, %price, size = %base, "Mock limit order resting");

        state
            .open_orders
            .entry((order.subaccount.clone(), order.pair_id.clone()))
            .or_default()
            .push(OpenOrder {
                id: id.clone(),
                side: if order.is_buy { OrderSide::Buy } else { OrderSide::Sell },
                price,
                size: base,
                status: OrderStatus::Open,
            });

        Ok(TxHandle { id })
    }

    async fn place_market_order(&self, order: MarketOrderRequest) -> Result<TxHandle> {
        let mut state = self.state.write().await;
        state.calls.push(GatewayCall::PlaceMarket(order.clone()));
        Self::check_failure(&mut state, "place_market_order")?;

        let pair = Self::market(&state, &order.pair_id)?.clone();
        let price = Self::fill_price(&state, &pair)?;

        let base = match (order.base_amount, order.quote_amount) {
            (Some(base), _) => from_fixed_point(base, pair.base.decimals)?,
            (None, Some(quote)) => truncate_to_decimals(
                from_fixed_point(quote, pair.quote.decimals)? / price,
                pair.base.decimals,
            ),
            (None, None) => bail!("market order without amount on {}", pair.id),
        };
        let quote = truncate_to_decimals(base * price, pair.quote.decimals);

        let base_raw = i128::try_from(to_fixed_point(base, pair.base.decimals)?)?;
        let quote_raw = i128::try_from(to_fixed_point(quote, pair.quote.decimals)?)?;
        let sign = if order.is_buy { 1 } else { -1 };

        Self::adjust_balance(&mut state, &order.subaccount, &pair.base.symbol, sign * base_raw)?;
        Self::adjust_balance(&mut state, &order.subaccount, &pair.quote.symbol, -sign * quote_raw)?;

        let id = self.next_order_id();
        info!(%id, pair = %pair.id, is_buy = order.is_buy, %price, %base, %quote, "Mock market order filled");
        Ok(TxHandle { id })
    }

    async fn cancel_order(
        &self,
        subaccount: &str,
        pair_id: &str,
        order_id: &str,
        is_buy: bool,
    ) -> Result<TxHandle> {
        let mut state = self.state.write().await;
        state.calls.push(GatewayCall::Cancel {
            pair_id: pair_id.to_string(),
            order_id: order_id.to_string(),
            is_buy,
        });
        Self::check_failure(&mut state, "cancel_order")?;

        let orders = state
            .open_orders
            .get_mut(&(subaccount.to_string(), pair_id.to_string()))
            .ok_or_else(|| anyhow!("no orders on {pair_id}"))?;
        let before = orders.len();
        orders.retain(|o| o.id != order_id);
        if orders.len() == before {
            bail!("order {order_id} not found on {pair_id}");
        }
        Ok(TxHandle {
            id: format!("cancel-{order_id}"),
        })
    }

    async fn place_perp_order(&self, order: PerpOrderRequest) -> Result<TxHandle> {
        let mut state = self.state.write().await;
        state.calls.push(GatewayCall::PlacePerp(order.clone()));
        Self::check_failure(&mut state, "place_perp_order")?;

        let key = (order.subaccount.clone(), order.market_id.clone());
        let position = state.perp_positions.entry(key).or_insert_with(|| PerpPosition {
            market_id: order.market_id.clone(),
            size: Decimal::ZERO,
            is_long: order.is_long,
            entry_price: order.price,
            leverage: order.leverage,
        });
        if order.reduce_only {
            position.size = (position.size - order.size).max(Decimal::ZERO);
        } else {
            position.size += order.size;
            position.is_long = order.is_long;
            position.entry_price = order.price;
            position.leverage = order.leverage;
        }

        Ok(TxHandle {
            id: self.next_order_id(),
        })
    }

    async fn close_perp_position(&self, request: ClosePerpRequest) -> Result<TxHandle> {
        let mut state = self.state.write().await;
        state.calls.push(GatewayCall::ClosePerp(request.clone()));
        Self::check_failure(&mut state, "close_perp_position")?;

        state
            .perp_positions
            .remove(&(request.subaccount.clone(), request.market_id.clone()))
            .ok_or_else(|| anyhow!("no position on {}", request.market_id))?;
        Ok(TxHandle {
            id: self.next_order_id(),
        })
    }

    async fn perp_positions(&self, subaccount: &str, market_ids: &[String]) -> Result<Vec<PerpPosition>> {
        let mut state = self.state.write().await;
        Self::check_failure(&mut state, "perp_positions")?;
        Ok(market_ids
            .iter()
            .filter_map(|m| {
                state
                    .perp_positions
                    .get(&(subaccount.to_string(), m.clone()))
                    .cloned()
            })
            .collect())
    }

    async fn perp_market(&self, market_id: &str) -> Result<PerpMarketInfo> {
        let mut state = self.state.write().await;
        Self::check_failure(&mut state, "perp_market")?;
        state
            .perp_markets
            .get(market_id)
            .cloned()
            .ok_or_else(|| anyhow!("unknown perp market {market_id}"))
    }

    async fn signing_account(&self) -> Result<SigningIdentity> {
        Ok(self.signer.clone())
    }

    async fn subaccounts(&self, owner: &str) -> Result<Vec<Subaccount>> {
        let mut state = self.state.write().await;
        Self::check_failure(&mut state, "subaccounts")?;
        Ok(state.subaccounts.get(owner).cloned().unwrap_or_default())
    }
}
