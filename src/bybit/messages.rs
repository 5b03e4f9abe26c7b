//! Bybit v5 request and response types
//!
//! Responses keep Bybit's string-encoded numbers; the conversion helpers at
//! the bottom turn them into the crate's normalized types.

use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::common::errors::{Result, TraderError};
use crate::common::fill::FillStatus;
use crate::common::types::OrderResult;

/// Product category of a v5 request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    /// USDT perpetuals
    Linear,
    Spot,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Linear => "linear",
            Category::Spot => "spot",
        }
    }
}

/// Order side as spelled by Bybit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

/// Envelope of every v5 response
#[derive(Debug, Clone, Deserialize)]
pub struct ApiResponse<T> {
    #[serde(rename = "retCode")]
    pub ret_code: i64,
    #[serde(rename = "retMsg", default)]
    pub ret_msg: String,
    #[serde(default = "Option::default")]
    pub result: Option<T>,
    #[serde(default)]
    pub time: Option<i64>,
}

impl<T> ApiResponse<T> {
    /// Unwrap the result, turning a non-zero return code into an error
    pub fn into_result(self) -> Result<T> {
        if self.ret_code != 0 {
            return Err(TraderError::ExchangeRejected {
                code: self.ret_code,
                message: self.ret_msg,
            });
        }
        self.result
            .ok_or_else(|| TraderError::InvalidResponse("response without result".to_string()))
    }
}

/// Kline list; each entry is `[start, open, high, low, close]`
#[derive(Debug, Clone, Deserialize)]
pub struct KlineResult {
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub list: Vec<Vec<String>>,
}

impl KlineResult {
    /// Close price of the newest candle
    pub fn last_close(&self) -> Result<Decimal> {
        let close = self
            .list
            .first()
            .and_then(|candle| candle.get(4))
            .ok_or_else(|| TraderError::InvalidResponse("empty kline list".to_string()))?;
        parse_decimal("close price", close)
    }
}

/// Body of `/v5/order/create`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceOrderRequest {
    pub category: Category,
    pub symbol: String,
    pub side: OrderSide,
    pub order_type: String,
    pub qty: String,
    /// 0 = one-way mode
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position_idx: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_loss: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reduce_only: Option<bool>,
    /// Spot market buys are quoted in the quote coin unless set to `baseCoin`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub market_unit: Option<String>,
}

impl PlaceOrderRequest {
    /// Market order for `qty` units
    pub fn market(category: Category, symbol: &str, side: OrderSide, qty: Decimal) -> Self {
        Self {
            category,
            symbol: symbol.to_string(),
            side,
            order_type: "Market".to_string(),
            qty: qty.normalize().to_string(),
            position_idx: match category {
                Category::Linear => Some(0),
                Category::Spot => None,
            },
            stop_loss: None,
            reduce_only: None,
            market_unit: match category {
                Category::Linear => None,
                Category::Spot => Some("baseCoin".to_string()),
            },
        }
    }

    /// Only reduce an existing position, never flip it
    pub fn reduce_only(mut self) -> Self {
        self.reduce_only = Some(true);
        self
    }

    pub fn with_stop_loss(mut self, price: Decimal) -> Self {
        self.stop_loss = Some(price.normalize().to_string());
        self
    }
}

/// Result of `/v5/order/create`
///
/// Rejections carry an empty `{}` result, hence the defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OrderCreateResult {
    pub order_id: String,
    pub order_link_id: String,
}

/// Result of `/v5/order/history`
#[derive(Debug, Clone, Deserialize)]
pub struct OrderHistoryResult {
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub list: Vec<OrderDetails>,
}

/// One order from the order history
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OrderDetails {
    pub order_id: String,
    pub symbol: String,
    pub side: String,
    pub order_status: String,
    pub avg_price: String,
    pub qty: String,
    pub cum_exec_qty: String,
    pub cum_exec_value: String,
    pub cum_exec_fee: String,
    pub created_time: String,
    pub updated_time: String,
}

impl OrderDetails {
    /// Map Bybit's order status to a poll outcome
    pub fn fill_status(self) -> FillStatus<OrderDetails> {
        let terminal = matches!(
            self.order_status.as_str(),
            "Rejected" | "Cancelled" | "Deactivated" | "PartiallyFilledCanceled"
        );
        if self.order_status == "Filled" {
            FillStatus::Filled(self)
        } else if terminal {
            FillStatus::Rejected(self.order_status)
        } else {
            FillStatus::Pending
        }
    }

    /// Normalize into the exchange-neutral fill record
    ///
    /// Commission is charged as `commission_rate` of the filled cost.
    pub fn into_order_result(self, commission_rate: Decimal) -> Result<OrderResult> {
        let avg_price = parse_decimal("avgPrice", &self.avg_price)?;
        let amount = match parse_optional_decimal(&self.cum_exec_qty)? {
            Some(executed) if executed > Decimal::ZERO => executed,
            _ => parse_decimal("qty", &self.qty)?,
        };
        let total_cost = avg_price * amount;

        Ok(OrderResult {
            avg_price,
            total_cost,
            commission: total_cost * commission_rate,
            amount,
            filled_at: parse_millis(&self.updated_time),
            order_id: (!self.order_id.is_empty()).then_some(self.order_id),
        })
    }
}

/// Body of `/v5/position/set-leverage`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetLeverageRequest {
    pub category: Category,
    pub symbol: String,
    pub buy_leverage: String,
    pub sell_leverage: String,
}

impl SetLeverageRequest {
    pub fn new(symbol: &str, leverage: u32) -> Self {
        Self {
            category: Category::Linear,
            symbol: symbol.to_string(),
            buy_leverage: leverage.to_string(),
            sell_leverage: leverage.to_string(),
        }
    }
}

/// Body of `/v5/position/switch-isolated`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SwitchIsolatedRequest {
    pub category: Category,
    pub symbol: String,
    /// 0 = cross margin, 1 = isolated margin
    pub trade_mode: u8,
    pub buy_leverage: String,
    pub sell_leverage: String,
}

impl SwitchIsolatedRequest {
    pub fn isolated(symbol: &str, leverage: u32) -> Self {
        Self {
            category: Category::Linear,
            symbol: symbol.to_string(),
            trade_mode: 1,
            buy_leverage: leverage.to_string(),
            sell_leverage: leverage.to_string(),
        }
    }
}

/// Result of `/v5/account/wallet-balance`
#[derive(Debug, Clone, Deserialize)]
pub struct WalletBalanceResult {
    #[serde(default)]
    pub list: Vec<WalletAccount>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WalletAccount {
    pub account_type: String,
    pub total_equity: String,
    pub total_available_balance: String,
    pub coin: Vec<WalletCoin>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WalletCoin {
    pub coin: String,
    pub usd_value: String,
    pub wallet_balance: String,
    #[serde(rename = "totalPositionIM")]
    pub total_position_im: String,
    #[serde(rename = "totalOrderIM")]
    pub total_order_im: String,
    pub locked: String,
}

impl WalletBalanceResult {
    /// Free balance of `coin`: value minus position margin, order margin and locked funds
    ///
    /// Unparseable or empty components count as zero.
    pub fn available_balance(&self, coin: &str) -> Result<Decimal> {
        let entry = self
            .list
            .first()
            .and_then(|account| account.coin.iter().find(|c| c.coin == coin))
            .ok_or_else(|| TraderError::InvalidResponse(format!("no {} balance in wallet", coin)))?;

        let value = |raw: &str| raw.parse::<Decimal>().unwrap_or_default();

        Ok(value(&entry.usd_value)
            - value(&entry.total_position_im)
            - value(&entry.total_order_im)
            - value(&entry.locked))
    }
}

fn parse_decimal(field: &str, raw: &str) -> Result<Decimal> {
    raw.parse()
        .map_err(|e| TraderError::InvalidResponse(format!("Invalid {} '{}': {}", field, raw, e)))
}

fn parse_optional_decimal(raw: &str) -> Result<Option<Decimal>> {
    if raw.is_empty() {
        return Ok(None);
    }
    parse_decimal("decimal", raw).map(Some)
}

fn parse_millis(raw: &str) -> Option<DateTime<Utc>> {
    raw.parse::<i64>()
        .ok()
        .and_then(|millis| Utc.timestamp_millis_opt(millis).single())
}
