//! Bybit implementation of the exchange capability

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::time::Duration;
use tracing::{info, instrument};

use super::messages::{
    Category, OrderDetails, OrderSide, PlaceOrderRequest, SetLeverageRequest, SwitchIsolatedRequest,
};
use super::rest::BybitRestClient;
use crate::common::errors::Result;
use crate::common::fill::{FillPoller, FillStatus};
use crate::common::traits::ExchangeClient;
use crate::common::types::{Coin, Direction, OrderResult, Transaction};
use crate::config::types::{ApiCredentials, BybitConfig};

/// Settlement coin of linear contracts and of the wallet balance
const QUOTE_COIN: &str = "USDT";

/// Bybit client placing market orders and waiting for their fills
#[derive(Debug, Clone)]
pub struct BybitClient {
    rest_client: BybitRestClient,
    fill_poller: FillPoller,
    commission_rate: Decimal,
}

impl BybitClient {
    /// Create a new Bybit client from configuration
    pub fn new(config: &BybitConfig, fill_poller: FillPoller, timeout: Duration) -> Result<Self> {
        let rest_client = BybitRestClient::with_timeout(&config.rest_url, timeout)?
            .with_recv_window(config.recv_window_ms);

        let rest_client = match (&config.api_key, &config.api_secret) {
            (Some(key), Some(secret)) => {
                rest_client.with_credentials(ApiCredentials::new(key.clone(), secret.clone()))
            }
            _ => rest_client,
        };

        Ok(Self::from_parts(rest_client, fill_poller, config.commission_rate))
    }

    pub fn from_parts(
        rest_client: BybitRestClient,
        fill_poller: FillPoller,
        commission_rate: Decimal,
    ) -> Self {
        Self {
            rest_client,
            fill_poller,
            commission_rate,
        }
    }

    /// Get a reference to the REST client
    pub fn rest(&self) -> &BybitRestClient {
        &self.rest_client
    }

    /// Submit a market order and block until it is filled
    async fn place_and_wait(&self, request: PlaceOrderRequest) -> Result<OrderResult> {
        let category = request.category;
        let symbol = request.symbol.clone();

        let created = self.rest_client.create_order(&request).await?;
        let order_id = created.order_id;
        info!(%order_id, %symbol, side = ?request.side, qty = %request.qty, "order submitted");

        let details = self
            .fill_poller
            .wait_for_fill(&order_id, || self.fill_status(category, &symbol, &order_id))
            .await?;

        let result = details.into_order_result(self.commission_rate)?;
        info!(
            %order_id,
            avg_price = %result.avg_price,
            amount = %result.amount,
            "order filled"
        );
        Ok(result)
    }

    async fn fill_status(
        &self,
        category: Category,
        symbol: &str,
        order_id: &str,
    ) -> Result<FillStatus<OrderDetails>> {
        Ok(self
            .rest_client
            .get_order(category, symbol, order_id)
            .await?
            .map(OrderDetails::fill_status)
            .unwrap_or(FillStatus::Pending))
    }
}

fn side_for(direction: Direction, opening: bool) -> OrderSide {
    match (direction, opening) {
        (Direction::Long, true) | (Direction::Short, false) => OrderSide::Buy,
        (Direction::Long, false) | (Direction::Short, true) => OrderSide::Sell,
    }
}

#[async_trait]
impl ExchangeClient for BybitClient {
    async fn get_current_price(&self, coin: &Coin) -> Result<Decimal> {
        self.rest_client.get_mark_price(Category::Linear, &coin.symbol).await
    }

    #[instrument(skip(self, coin), fields(symbol = %coin.symbol))]
    async fn open_futures_order(
        &self,
        coin: &Coin,
        amount: Decimal,
        _price: Decimal,
        direction: Direction,
        stop_loss_price: Option<Decimal>,
    ) -> Result<OrderResult> {
        let side = side_for(direction, true);
        let mut request = PlaceOrderRequest::market(Category::Linear, &coin.symbol, side, amount);
        if let Some(stop_loss) = stop_loss_price {
            request = request.with_stop_loss(stop_loss);
        }
        self.place_and_wait(request).await
    }

    #[instrument(skip(self, coin, open_transaction), fields(symbol = %coin.symbol))]
    async fn close_futures_order(
        &self,
        coin: &Coin,
        open_transaction: &Transaction,
        _price: Decimal,
    ) -> Result<OrderResult> {
        let request = PlaceOrderRequest::market(
            Category::Linear,
            &coin.symbol,
            side_for(open_transaction.direction, false),
            open_transaction.amount,
        )
        .reduce_only();
        self.place_and_wait(request).await
    }

    async fn buy_spot_by_market(
        &self,
        coin: &Coin,
        amount: Decimal,
        _price: Decimal,
    ) -> Result<OrderResult> {
        let request =
            PlaceOrderRequest::market(Category::Spot, &coin.symbol, OrderSide::Buy, amount);
        self.place_and_wait(request).await
    }

    async fn sell_spot_by_market(
        &self,
        coin: &Coin,
        amount: Decimal,
        _price: Decimal,
    ) -> Result<OrderResult> {
        let request =
            PlaceOrderRequest::market(Category::Spot, &coin.symbol, OrderSide::Sell, amount);
        self.place_and_wait(request).await
    }

    async fn get_wallet_available_balance(&self) -> Result<Decimal> {
        self.rest_client
            .get_wallet_balance(QUOTE_COIN)
            .await?
            .available_balance(QUOTE_COIN)
    }

    async fn set_futures_leverage(&self, coin: &Coin, leverage: u32) -> Result<()> {
        self.rest_client
            .set_leverage(&SetLeverageRequest::new(&coin.symbol, leverage))
            .await
    }

    async fn set_isolated_margin(&self, coin: &Coin, leverage: u32) -> Result<()> {
        self.rest_client
            .switch_isolated(&SwitchIsolatedRequest::isolated(&coin.symbol, leverage))
            .await
    }
}
