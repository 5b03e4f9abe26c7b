//! Capability traits consumed by the order manager and the profit worker
//!
//! Concrete adapters live in `bybit`, `store` and `notify`. The core only
//! depends on these traits, so tests swap in fakes.

use async_trait::async_trait;
use rust_decimal::Decimal;

use super::errors::{Result, TraderError};
use super::types::{Coin, Direction, OrderResult, TradingStrategy, Transaction};

/// Exchange operations needed to run futures positions
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    /// Current mark price of the coin
    async fn get_current_price(&self, coin: &Coin) -> Result<Decimal>;

    /// Place a market order opening a position and wait for its fill
    async fn open_futures_order(
        &self,
        coin: &Coin,
        amount: Decimal,
        price: Decimal,
        direction: Direction,
        stop_loss_price: Option<Decimal>,
    ) -> Result<OrderResult>;

    /// Place a market order closing the full amount of `open_transaction`
    async fn close_futures_order(
        &self,
        coin: &Coin,
        open_transaction: &Transaction,
        price: Decimal,
    ) -> Result<OrderResult>;

    /// Spot market buy
    async fn buy_spot_by_market(
        &self,
        coin: &Coin,
        _amount: Decimal,
        _price: Decimal,
    ) -> Result<OrderResult> {
        Err(TraderError::Unsupported(format!("spot buy of {}", coin.symbol)))
    }

    /// Spot market sell
    async fn sell_spot_by_market(
        &self,
        coin: &Coin,
        _amount: Decimal,
        _price: Decimal,
    ) -> Result<OrderResult> {
        Err(TraderError::Unsupported(format!("spot sell of {}", coin.symbol)))
    }

    /// Quote-currency balance free for new positions
    async fn get_wallet_available_balance(&self) -> Result<Decimal>;

    async fn set_futures_leverage(&self, coin: &Coin, leverage: u32) -> Result<()>;

    async fn set_isolated_margin(&self, coin: &Coin, leverage: u32) -> Result<()>;
}

/// Ledger persistence
#[async_trait]
pub trait TransactionStore: Send + Sync {
    /// Newest open transaction for the strategy and coin
    ///
    /// With `trading_key` set only rows carrying that key match.
    async fn find_open_transaction(
        &self,
        strategy_id: i64,
        coin_id: i64,
        trading_key: Option<&str>,
    ) -> Result<Option<Transaction>>;

    /// Insert when `id` is `None` (assigning it), otherwise update by id
    async fn save_transaction(&self, transaction: &mut Transaction) -> Result<()>;

    /// All open transactions of a strategy, oldest first
    async fn find_all_open_transactions(
        &self,
        strategy: &TradingStrategy,
    ) -> Result<Vec<Transaction>>;

    async fn find_by_id(&self, id: i64) -> Result<Option<Transaction>>;

    /// Insert the close leg and link the open leg to it as one unit of work
    ///
    /// On success `close.id` is assigned and
    /// `open.related_transaction_id == close.id`. On failure neither row is
    /// changed in the store.
    async fn record_close(&self, open: &mut Transaction, close: &mut Transaction) -> Result<()>;

    /// Realized profit in cents of a strategy, optionally for one coin
    /// (dry-run rows excluded when per coin)
    async fn sum_of_profit(&self, strategy_id: i64, coin_id: Option<i64>) -> Result<i64>;
}

/// Read-only coin and strategy lookups
#[async_trait]
pub trait ReferenceStore: Send + Sync {
    async fn find_coin_by_id(&self, id: i64) -> Result<Option<Coin>>;

    async fn find_coin_by_symbol(&self, symbol: &str) -> Result<Option<Coin>>;

    async fn find_strategy_by_tag(&self, tag: &str) -> Result<Option<TradingStrategy>>;

    async fn list_strategies(&self) -> Result<Vec<TradingStrategy>>;
}

/// Human-facing notification channel
///
/// Delivery is fire-and-forget: implementations log their own failures.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, text: &str);
}
