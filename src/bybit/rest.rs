//! REST API client for Bybit v5

use reqwest::{Client, Response, StatusCode};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use super::auth::{generate_auth_headers, AuthHeaders};
use super::messages::*;
use crate::common::errors::{Result, TraderError};
use crate::config::types::ApiCredentials;

/// Leverage already at the requested value
const LEVERAGE_NOT_MODIFIED: i64 = 110043;

/// Margin mode already at the requested value
const MARGIN_MODE_NOT_MODIFIED: i64 = 110026;

/// REST API client for Bybit v5
#[derive(Debug, Clone)]
pub struct BybitRestClient {
    /// HTTP client
    client: Client,
    /// Base URL for the v5 API
    base_url: String,
    /// Validity window sent with signed requests
    recv_window: u64,
    /// API credentials for signed endpoints
    credentials: Option<ApiCredentials>,
}

impl BybitRestClient {
    /// Create a new REST client (unauthenticated)
    pub fn new(base_url: &str) -> Result<Self> {
        Self::with_timeout(base_url, Duration::from_secs(30))
    }

    /// Create a new REST client with custom timeout
    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TraderError::Internal(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            recv_window: 5000,
            credentials: None,
        })
    }

    /// Set API credentials for signed requests
    pub fn with_credentials(mut self, credentials: ApiCredentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn with_recv_window(mut self, recv_window: u64) -> Self {
        self.recv_window = recv_window;
        self
    }

    pub fn has_credentials(&self) -> bool {
        self.credentials.is_some()
    }

    fn auth_headers(&self, payload: &str) -> Result<AuthHeaders> {
        let creds = self.credentials.as_ref().ok_or_else(|| {
            TraderError::Authentication("Bybit API credentials are not configured".to_string())
        })?;
        generate_auth_headers(&creds.api_key, &creds.api_secret, self.recv_window, payload)
    }

    // ========================================================================
    // Public Endpoints (No Authentication Required)
    // ========================================================================

    /// Close of the latest one-minute mark price candle
    #[instrument(skip(self))]
    pub async fn get_mark_price(&self, category: Category, symbol: &str) -> Result<Decimal> {
        let kline: KlineResult = self
            .public_get(
                "/v5/market/mark-price-kline",
                &[
                    ("category", category.as_str()),
                    ("symbol", symbol),
                    ("interval", "1"),
                    ("limit", "1"),
                ],
            )
            .await?;
        kline.last_close()
    }

    // ========================================================================
    // Signed Endpoints
    // ========================================================================

    /// Submit an order; the returned id still has to be polled for a fill
    #[instrument(
        skip(self, request),
        fields(symbol = %request.symbol, side = ?request.side, qty = %request.qty)
    )]
    pub async fn create_order(&self, request: &PlaceOrderRequest) -> Result<OrderCreateResult> {
        let created = self
            .signed_post::<OrderCreateResult, _>("/v5/order/create", request)
            .await?
            .into_result()?;
        if created.order_id.is_empty() {
            return Err(TraderError::InvalidResponse("order accepted without orderId".to_string()));
        }
        Ok(created)
    }

    /// Look up one order; `None` while the exchange does not list it yet
    #[instrument(skip(self))]
    pub async fn get_order(
        &self,
        category: Category,
        symbol: &str,
        order_id: &str,
    ) -> Result<Option<OrderDetails>> {
        let history: OrderHistoryResult = self
            .signed_get(
                "/v5/order/history",
                &[
                    ("category", category.as_str()),
                    ("symbol", symbol),
                    ("orderId", order_id),
                ],
            )
            .await?;
        Ok(history.list.into_iter().find(|order| order.order_id == order_id))
    }

    /// Unified account balance of one coin
    #[instrument(skip(self))]
    pub async fn get_wallet_balance(&self, coin: &str) -> Result<WalletBalanceResult> {
        self.signed_get(
            "/v5/account/wallet-balance",
            &[("accountType", "UNIFIED"), ("coin", coin)],
        )
        .await
    }

    /// Set buy and sell leverage; an unchanged value counts as success
    #[instrument(skip(self, request), fields(symbol = %request.symbol))]
    pub async fn set_leverage(&self, request: &SetLeverageRequest) -> Result<()> {
        let response = self
            .signed_post::<serde_json::Value, _>("/v5/position/set-leverage", request)
            .await?;
        accept_not_modified(response, LEVERAGE_NOT_MODIFIED)
    }

    /// Switch margin mode; an unchanged mode counts as success
    #[instrument(skip(self, request), fields(symbol = %request.symbol))]
    pub async fn switch_isolated(&self, request: &SwitchIsolatedRequest) -> Result<()> {
        let response = self
            .signed_post::<serde_json::Value, _>("/v5/position/switch-isolated", request)
            .await?;
        accept_not_modified(response, MARGIN_MODE_NOT_MODIFIED)
    }

    // ========================================================================
    // Helper Methods
    // ========================================================================

    async fn public_get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T> {
        let url = format!("{}{}?{}", self.base_url, path, encode_query(query));
        debug!("GET {}", url);

        let response = self.client.get(&url).send().await?;
        read_envelope::<T>(response).await?.into_result()
    }

    async fn signed_get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T> {
        let query = encode_query(query);
        let url = format!("{}{}?{}", self.base_url, path, query);
        debug!("GET {} (signed)", url);

        let headers = self.auth_headers(&query)?;
        let request = headers.apply_to_request(self.client.get(&url));
        let response = request.send().await?;
        read_envelope::<T>(response).await?.into_result()
    }

    /// The signature covers the exact body bytes, so the JSON is rendered once
    async fn signed_post<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<ApiResponse<T>> {
        let body = serde_json::to_string(body)?;
        let url = format!("{}{}", self.base_url, path);
        debug!("POST {} {}", url, body);

        let headers = self.auth_headers(&body)?;
        let request = headers
            .apply_to_request(self.client.post(&url))
            .header("Content-Type", "application/json")
            .body(body);
        let response = request.send().await?;
        read_envelope(response).await
    }
}

fn encode_query(query: &[(&str, &str)]) -> String {
    url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(query)
        .finish()
}

async fn read_envelope<T: DeserializeOwned>(response: Response) -> Result<ApiResponse<T>> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(TraderError::Authentication(format!(
                "Server returned status {}: {}",
                status, body
            )));
        }
        return Err(TraderError::InvalidResponse(format!(
            "Server returned status {}: {}",
            status, body
        )));
    }

    Ok(response.json().await?)
}

fn accept_not_modified(response: ApiResponse<serde_json::Value>, not_modified: i64) -> Result<()> {
    match response.ret_code {
        0 => Ok(()),
        code if code == not_modified => {
            warn!(code, message = %response.ret_msg, "setting already applied");
            Ok(())
        }
        code => Err(TraderError::ExchangeRejected {
            code,
            message: response.ret_msg,
        }),
    }
}
