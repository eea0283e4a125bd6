//! REST client for Binance USDⓈ-M futures

use async_trait::async_trait;
use reqwest::{Client, Method, Response, StatusCode};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use super::auth::{signed_query, API_KEY_HEADER};
use super::messages::*;
use crate::common::errors::{BotError, Result};
use crate::common::traits::ExchangeClient;
use crate::common::types::{
    Candle, ExchangePosition, OpenOrder, OrderResult, PositionMode, SymbolFilters,
};
use crate::config::types::{ApiCredentials, BinanceConfig};
use crate::gateway::OrderParams;

/// Binance futures REST client
#[derive(Debug, Clone)]
pub struct BinanceFuturesClient {
    /// HTTP client
    client: Client,
    /// Base URL, e.g. `https://fapi.binance.com`
    base_url: String,
    /// Credentials for signed endpoints
    credentials: Option<ApiCredentials>,
    recv_window_ms: u64,
    /// Asset whose balance sizes new positions
    quote_asset: String,
}

impl BinanceFuturesClient {
    /// Create a client against `base_url` with the default 10 second timeout
    pub fn new(base_url: &str) -> Result<Self> {
        Self::with_timeout(base_url, Duration::from_secs(10))
    }

    /// Create a client with a custom request timeout
    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BotError::Internal(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            credentials: None,
            recv_window_ms: 5000,
            quote_asset: "USDT".to_string(),
        })
    }

    /// Build a client from the `[binance]` config section
    pub fn from_config(config: &BinanceConfig) -> Result<Self> {
        let mut client = Self::with_timeout(
            &config.rest_url,
            Duration::from_secs(config.request_timeout_seconds),
        )?;
        client.recv_window_ms = config.recv_window_ms;
        client.quote_asset = config.quote_asset.clone();
        if let Some(credentials) = config.credentials() {
            client = client.with_credentials(credentials);
        }
        Ok(client)
    }

    /// Set API credentials for signed requests
    pub fn with_credentials(mut self, credentials: ApiCredentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn with_quote_asset(mut self, asset: &str) -> Self {
        self.quote_asset = asset.to_string();
        self
    }

    async fn public_get<T: DeserializeOwned>(&self, path: &str, params: &[(&str, String)]) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        debug!("GET {}", url);

        let response = self
            .client
            .get(&url)
            .query(params)
            .send()
            .await
            .map_err(map_transport_error)?;
        parse_response(response).await
    }

    async fn signed<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T> {
        let creds = self.credentials.as_ref().ok_or_else(|| {
            BotError::Authentication("API credentials required for signed endpoint".to_string())
        })?;

        let timestamp = chrono::Utc::now().timestamp_millis();
        let query = signed_query(&creds.api_secret, params, self.recv_window_ms, timestamp)?;
        let url = format!("{}{}?{}", self.base_url, path, query);
        debug!("{} {}", method, path);

        let response = self
            .client
            .request(method, &url)
            .header(API_KEY_HEADER, &creds.api_key)
            .send()
            .await
            .map_err(map_transport_error)?;
        parse_response(response).await
    }
}

fn map_transport_error(err: reqwest::Error) -> BotError {
    if err.is_timeout() {
        BotError::Timeout(err.to_string())
    } else if err.is_connect() || err.is_request() {
        BotError::Network(err.to_string())
    } else {
        BotError::HttpRequest(err)
    }
}

/// Classify a non-2xx response
///
/// 429 and 418 are rate limits, 5xx is transient, anything carrying a
/// Binance `{code, msg}` body is an exchange rejection.
fn classify_error(status: StatusCode, retry_after: Option<u64>, body: &str) -> BotError {
    if status == StatusCode::TOO_MANY_REQUESTS || status.as_u16() == 418 {
        return BotError::RateLimit {
            message: body.to_string(),
            retry_after_seconds: retry_after,
        };
    }
    if status.is_server_error() {
        return BotError::Network(format!("Server returned status {}: {}", status, body));
    }
    match serde_json::from_str::<ApiErrorBody>(body) {
        Ok(api) if api.code == -2014 || api.code == -2015 || api.code == -1022 => {
            BotError::Authentication(api.msg)
        }
        Ok(api) => BotError::rejection(api.code, api.msg),
        Err(_) => BotError::InvalidResponse(format!("Server returned status {}: {}", status, body)),
    }
}

async fn parse_response<T: DeserializeOwned>(response: Response) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok());
        let body = response.text().await.unwrap_or_default();
        let err = classify_error(status, retry_after, &body);
        warn!(%status, error = %err, "request failed");
        return Err(err);
    }
    let body = response.text().await.map_err(map_transport_error)?;
    Ok(serde_json::from_str(&body)?)
}

#[async_trait]
impl ExchangeClient for BinanceFuturesClient {
    #[instrument(skip(self))]
    async fn get_price(&self, symbol: &str) -> Result<Decimal> {
        let ticker: TickerPrice = self
            .public_get("/fapi/v1/ticker/price", &[("symbol", symbol.to_string())])
            .await?;
        Ok(ticker.price)
    }

    #[instrument(skip(self))]
    async fn get_candles(&self, symbol: &str, interval: &str, limit: u32) -> Result<Vec<Candle>> {
        let rows: Vec<Vec<serde_json::Value>> = self
            .public_get(
                "/fapi/v1/klines",
                &[
                    ("symbol", symbol.to_string()),
                    ("interval", interval.to_string()),
                    ("limit", limit.to_string()),
                ],
            )
            .await?;
        rows.iter().map(|row| parse_kline(row)).collect()
    }

    #[instrument(skip(self))]
    async fn get_open_positions(&self) -> Result<Vec<ExchangePosition>> {
        let risks: Vec<PositionRisk> = self
            .signed(Method::GET, "/fapi/v2/positionRisk", &[])
            .await?;
        Ok(risks.into_iter().filter_map(PositionRisk::into_position).collect())
    }

    #[instrument(skip(self))]
    async fn get_open_orders(&self, symbol: &str) -> Result<Vec<OpenOrder>> {
        let orders: Vec<OpenOrderResponse> = self
            .signed(
                Method::GET,
                "/fapi/v1/openOrders",
                &[("symbol", symbol.to_string())],
            )
            .await?;
        Ok(orders.into_iter().map(OpenOrder::from).collect())
    }

    #[instrument(skip(self))]
    async fn get_position_mode(&self) -> Result<PositionMode> {
        let dual: DualSideResponse = self
            .signed(Method::GET, "/fapi/v1/positionSide/dual", &[])
            .await?;
        Ok(PositionMode::from_dual_side(dual.dual_side_position))
    }

    #[instrument(skip(self, params), fields(symbol = %params.symbol, side = %params.side, order_type = params.order_type.as_str()))]
    async fn place_order(&self, params: &OrderParams) -> Result<OrderResult> {
        let response: OrderResponse = self
            .signed(Method::POST, "/fapi/v1/order", &params.to_query_pairs())
            .await?;
        debug!(order_id = response.order_id, status = %response.status, "order accepted");
        Ok(response.into())
    }

    #[instrument(skip(self))]
    async fn cancel_order(&self, symbol: &str, order_id: u64) -> Result<()> {
        let _: serde_json::Value = self
            .signed(
                Method::DELETE,
                "/fapi/v1/order",
                &[
                    ("symbol", symbol.to_string()),
                    ("orderId", order_id.to_string()),
                ],
            )
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_balance(&self) -> Result<Decimal> {
        let balances: Vec<BalanceEntry> =
            self.signed(Method::GET, "/fapi/v2/balance", &[]).await?;
        balances
            .into_iter()
            .find(|b| b.asset == self.quote_asset)
            .map(|b| b.available_balance)
            .ok_or_else(|| {
                BotError::InvalidAccountState(format!("no {} balance on account", self.quote_asset))
            })
    }

    #[instrument(skip(self))]
    async fn get_symbol_filters(&self, symbol: &str) -> Result<SymbolFilters> {
        let info: ExchangeInfo = self.public_get("/fapi/v1/exchangeInfo", &[]).await?;
        info.symbols
            .iter()
            .find(|s| s.symbol == symbol)
            .map(SymbolInfo::to_filters)
            .ok_or_else(|| BotError::InvalidResponse(format!("symbol {} not in exchangeInfo", symbol)))
    }

    #[instrument(skip(self))]
    async fn set_leverage(&self, symbol: &str, leverage: u32) -> Result<()> {
        let response: LeverageResponse = self
            .signed(
                Method::POST,
                "/fapi/v1/leverage",
                &[
                    ("symbol", symbol.to_string()),
                    ("leverage", leverage.to_string()),
                ],
            )
            .await?;
        debug!(symbol = %response.symbol, leverage = response.leverage, "leverage set");
        Ok(())
    }

    fn exchange_name(&self) -> &'static str {
        "binance-futures"
    }
}
