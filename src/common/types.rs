//! Domain types shared by the exchange, store, order and worker layers

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::money::cents_to_usd;

/// Futures position orientation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    /// +1 for LONG, -1 for SHORT
    pub fn sign(&self) -> Decimal {
        match self {
            Direction::Long => Decimal::ONE,
            Direction::Short => Decimal::NEGATIVE_ONE,
        }
    }

    /// Map an alert side ("buy" / "sell") to a direction
    pub fn from_side(side: &str) -> Option<Self> {
        match side.trim().to_lowercase().as_str() {
            "buy" | "long" => Some(Direction::Long),
            "sell" | "short" => Some(Direction::Short),
            _ => None,
        }
    }

    /// Ledger type of the leg that opens a position in this direction
    pub fn opening_type(&self) -> TransactionType {
        match self {
            Direction::Long => TransactionType::Buy,
            Direction::Short => TransactionType::Sell,
        }
    }

    /// Ledger type of the leg that closes a position in this direction
    pub fn closing_type(&self) -> TransactionType {
        match self {
            Direction::Long => TransactionType::Sell,
            Direction::Short => TransactionType::Buy,
        }
    }

    /// Integer code used by the ledger table (0 = LONG, 1 = SHORT)
    pub fn code(&self) -> i16 {
        match self {
            Direction::Long => 0,
            Direction::Short => 1,
        }
    }

    pub fn from_code(code: i16) -> Option<Self> {
        match code {
            0 => Some(Direction::Long),
            1 => Some(Direction::Short),
            _ => None,
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Long => write!(f, "LONG"),
            Direction::Short => write!(f, "SHORT"),
        }
    }
}

/// Ledger leg type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransactionType {
    Buy,
    Sell,
}

impl TransactionType {
    /// Integer code used by the ledger table (0 = BUY, 1 = SELL)
    pub fn code(&self) -> i16 {
        match self {
            TransactionType::Buy => 0,
            TransactionType::Sell => 1,
        }
    }

    pub fn from_code(code: i16) -> Option<Self> {
        match code {
            0 => Some(TransactionType::Buy),
            1 => Some(TransactionType::Sell),
            _ => None,
        }
    }
}

impl std::fmt::Display for TransactionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionType::Buy => write!(f, "BUY"),
            TransactionType::Sell => write!(f, "SELL"),
        }
    }
}

/// Market the order is routed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradingType {
    Futures,
    Spot,
}

/// Tradable instrument
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coin {
    pub id: i64,
    pub name: String,
    /// Exchange ticker, e.g. BTCUSDT
    pub symbol: String,
}

impl Coin {
    pub fn new(id: i64, name: impl Into<String>, symbol: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            symbol: symbol.into(),
        }
    }
}

/// Named trading configuration addressed by alerts through its tag
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradingStrategy {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub tag: String,
    /// Alerts may only act on enabled strategies
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TradingStrategy {
    pub fn new(id: i64, tag: impl Into<String>, enabled: bool) -> Self {
        let tag = tag.into();
        let now = Utc::now();
        Self {
            id,
            name: tag.clone(),
            description: String::new(),
            tag,
            enabled,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Ledger record of one order leg
///
/// A row with no `related_transaction_id` is an open position. Closing it
/// inserts a second row pointing back at the open one and links the open
/// row forward to the close row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Assigned by the store on first save
    pub id: Option<i64>,
    pub coin_id: i64,
    pub transaction_type: TransactionType,
    pub amount: Decimal,
    pub price: Decimal,
    /// amount * price
    pub total_cost: Decimal,
    pub commission: Decimal,
    pub stop_loss_price: Option<Decimal>,
    pub take_profit_price: Option<Decimal>,
    pub created_at: DateTime<Utc>,
    /// Exchange order id
    pub client_order_id: Option<String>,
    pub api_error: Option<String>,
    pub related_transaction_id: Option<i64>,
    /// Realized profit in cents, close leg only
    pub profit: Option<i64>,
    pub percent_profit: Option<Decimal>,
    pub trading_strategy_id: i64,
    pub direction: Direction,
    /// Dry-run marker
    pub is_fake: bool,
    /// Empty when the position is not grouped
    pub trading_key: String,
}

impl Transaction {
    pub fn is_open(&self) -> bool {
        self.related_transaction_id.is_none()
    }

    /// Id of a persisted row; errors for rows that were never saved
    pub fn require_id(&self) -> super::errors::Result<i64> {
        self.id.ok_or_else(|| {
            super::errors::TraderError::InvalidInput("transaction has not been saved".to_string())
        })
    }
}

impl std::fmt::Display for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Transaction {{amount: {}, price: {:.2}, cost: {:.2}",
            self.amount.normalize(),
            self.price,
            self.total_cost
        )?;
        if let Some(profit) = self.profit {
            write!(f, ", profit: {}", cents_to_usd(profit))?;
        }
        write!(f, "}}")
    }
}

/// Normalized exchange fill
///
/// Every exchange adapter converts its native order payload into this shape;
/// the order manager never sees exchange-specific responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderResult {
    pub avg_price: Decimal,
    pub total_cost: Decimal,
    /// Commission in quote currency
    pub commission: Decimal,
    pub amount: Decimal,
    /// Falls back to the manager's clock when absent
    pub filled_at: Option<DateTime<Utc>>,
    pub order_id: Option<String>,
}

/// Inbound trading alert
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    /// Strategy tag
    pub tag: String,
    /// Coin symbol
    pub ticker: String,
    /// "buy" or "sell"
    pub side: String,
    /// Price quoted by the alert source
    #[serde(default)]
    pub price: Option<Decimal>,
    #[serde(default)]
    pub trading_key: Option<String>,
}

impl Signal {
    pub fn new(tag: impl Into<String>, ticker: impl Into<String>, side: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            ticker: ticker.into(),
            side: side.into(),
            price: None,
            trading_key: None,
        }
    }

    pub fn with_price(mut self, price: Decimal) -> Self {
        self.price = Some(price);
        self
    }

    pub fn with_trading_key(mut self, key: impl Into<String>) -> Self {
        self.trading_key = Some(key.into());
        self
    }
}

impl std::fmt::Display for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Signal{{tag: {}, ticker: {}, side: {}, price: {}, trading_key: {}}}",
            self.tag,
            self.ticker,
            self.side,
            self.price.map(|p| p.to_string()).unwrap_or_default(),
            self.trading_key.as_deref().unwrap_or_default()
        )
    }
}

/// What a signal did
#[derive(Debug, Clone, PartialEq)]
pub enum SignalOutcome {
    Opened(Transaction),
    Closed(Transaction),
    /// An open position existed but the close did not go through
    CloseFailed,
}
