//! REST client for the exchange gateway service.
//!
//! The gateway service owns key custody, ABI encoding and RPC transport; this
//! client only speaks its JSON API. Mutating requests are signed with
//! HMAC-SHA256 over `timestamp + method + path + body`.

use crate::config::GatewayConfig;
use crate::exchange::traits::ExchangeGateway;
use crate::exchange::types::*;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::{Client, Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, instrument};

/// JSON client for the gateway service.
pub struct RestGateway {
    http: Client,
    base_url: String,
    api_key: String,
    secret_key: String,
}

#[derive(Debug, Deserialize)]
struct BalanceResponse {
    amount: u128,
}

#[derive(Debug, Serialize)]
struct CancelRequest<'a> {
    subaccount: &'a str,
    pair_id: &'a str,
    order_id: &'a str,
    is_buy: bool,
}

impl RestGateway {
    /// Create a new client from configuration.
    pub fn new(config: &GatewayConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            secret_key: config.secret_key.clone(),
        })
    }

    /// Generate HMAC-SHA256 signature for a request.
    fn sign(&self, payload: &str) -> Result<String> {
        let mut mac = Hmac::<Sha256>::new_from_slice(self.secret_key.as_bytes())
            .context("Invalid HMAC key")?;
        mac.update(payload.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    /// Get current timestamp in milliseconds.
    fn timestamp() -> Result<u64> {
        Ok(SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .context("System clock before UNIX epoch")?
            .as_millis() as u64)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.send::<(), T>(Method::GET, path, None).await
    }

    async fn post<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        self.send(Method::POST, path, Some(body)).await
    }

    async fn send<B: Serialize, T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<T> {
        let response = self.signed_request(method.clone(), path, body).await?;
        Self::parse(method, path, response).await
    }

    /// Build, sign and send a request, returning the raw response.
    async fn signed_request<B: Serialize>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<Response> {
        let body = match body {
            Some(b) => serde_json::to_string(b).context("Failed to encode request body")?,
            None => String::new(),
        };
        let timestamp = Self::timestamp()?;
        let signature = self.sign(&format!("{timestamp}{method}{path}{body}"))?;
        let url = format!("{}{}", self.base_url, path);

        debug!(%method, %path, "Gateway request");

        let mut request = self
            .http
            .request(method.clone(), &url)
            .header("X-Api-Key", &self.api_key)
            .header("X-Timestamp", timestamp.to_string())
            .header("X-Signature", signature);
        if !body.is_empty() {
            request = request
                .header("Content-Type", "application/json")
                .body(body);
        }

        request
            .send()
            .await
            .with_context(|| format!("Failed to send {method} {path}"))
    }

    async fn parse<T: DeserializeOwned>(method: Method, path: &str, response: Response) -> Result<T> {
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            bail!("{method} {path} returned {status}: {text}");
        }

        response
            .json()
            .await
            .with_context(|| format!("Failed to parse {method} {path} response"))
    }
}

#[async_trait]
impl ExchangeGateway for RestGateway {
    #[instrument(skip(self))]
    async fn find_market(&self, pair_id: &str) -> Result<Option<MarketPair>> {
        let path = format!("/v1/markets/{}", urlencoding::encode(pair_id));
        let response = self
            .signed_request::<()>(Method::GET, &path, None)
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Self::parse(Method::GET, &path, response).await.map(Some)
    }

    #[instrument(skip(self))]
    async fn oracle_prices(&self) -> Result<Vec<OraclePrice>> {
        self.get("/v1/oracle/prices").await
    }

    #[instrument(skip(self))]
    async fn subaccount_balance(&self, subaccount: &str, token: &str) -> Result<u128> {
        let path = format!(
            "/v1/subaccounts/{}/balances/{}",
            urlencoding::encode(subaccount),
            urlencoding::encode(token)
        );
        let balance: BalanceResponse = self.get(&path).await?;
        Ok(balance.amount)
    }

    #[instrument(skip(self))]
    async fn open_spot_orders(&self, subaccount: &str, pair_id: &str) -> Result<Vec<OpenOrder>> {
        let path = format!(
            "/v1/subaccounts/{}/orders?pair={}",
            urlencoding::encode(subaccount),
            urlencoding::encode(pair_id)
        );
        self.get(&path).await
    }

    #[instrument(skip(self))]
    async fn place_limit_order(&self, order: LimitOrderRequest) -> Result<TxHandle> {
        self.post("/v1/orders/limit", &order).await
    }

    #[instrument(skip(self))]
    async fn place_market_order(&self, order: MarketOrderRequest) -> Result<TxHandle> {
        self.post("/v1/orders/market", &order).await
    }

    #[instrument(skip(self))]
    async fn cancel_order(
        &self,
        subaccount: &str,
        pair_id: &str,
        order_id: &str,
        is_buy: bool,
    ) -> Result<TxHandle> {
        let body = CancelRequest {
            subaccount,
            pair_id,
            order_id,
            is_buy,
        };
        self.post("/v1/orders/cancel", &body).await
    }

    #[instrument(skip(self))]
    async fn place_perp_order(&self, order: PerpOrderRequest) -> Result<TxHandle> {
        self.post("/v1/perp/orders", &order).await
    }

    #[instrument(skip(self))]
    async fn close_perp_position(&self, request: ClosePerpRequest) -> Result<TxHandle> {
        self.post("/v1/perp/close", &request).await
    }

    #[instrument(skip(self))]
    async fn perp_positions(&self, subaccount: &str, market_ids: &[String]) -> Result<Vec<PerpPosition>> {
        let path = format!(
            "/v1/perp/positions?subaccount={}&markets={}",
            urlencoding::encode(subaccount),
            urlencoding::encode(&market_ids.join(","))
        );
        self.get(&path).await
    }

    #[instrument(skip(self))]
    async fn perp_market(&self, market_id: &str) -> Result<PerpMarketInfo> {
        let path = format!("/v1/perp/markets/{}", urlencoding::encode(market_id));
        self.get(&path).await
    }

    #[instrument(skip(self))]
    async fn signing_account(&self) -> Result<SigningIdentity> {
        self.get("/v1/account").await
    }

    #[instrument(skip(self))]
    async fn subaccounts(&self, owner: &str) -> Result<Vec<Subaccount>> {
        let path = format!("/v1/accounts/{}/subaccounts", urlencoding::encode(owner));
        self.get(&path).await
    }
}
