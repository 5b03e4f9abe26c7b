//! Common test utilities and fixtures
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use futures_webhook_bot::common::clock::FixedClock;
use futures_webhook_bot::common::clock::Sleeper;
use futures_webhook_bot::common::errors::{Result, TraderError};
use futures_webhook_bot::common::traits::{
    ExchangeClient, Notifier, ReferenceStore, TransactionStore,
};
use futures_webhook_bot::common::types::{
    Coin, Direction, OrderResult, TradingStrategy, Transaction,
};
use futures_webhook_bot::orders::OrderManager;
use futures_webhook_bot::store::{InMemoryReferenceStore, InMemoryTransactionStore};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

pub const STRATEGY_TAG: &str = "alpha";
pub const IDLE_STRATEGY_TAG: &str = "beta";
pub const DISABLED_STRATEGY_TAG: &str = "paused";

/// Commission charged by [`FakeExchange`] on every fill
pub const FAKE_COMMISSION_RATE: Decimal = dec!(0.001);

/// Wall clock pinned by [`Harness`]
pub fn test_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
}

pub fn btc() -> Coin {
    Coin::new(1, "Bitcoin", "BTCUSDT")
}

pub fn eth() -> Coin {
    Coin::new(2, "Ethereum", "ETHUSDT")
}

pub fn strategies() -> Vec<TradingStrategy> {
    vec![
        TradingStrategy::new(1, STRATEGY_TAG, true),
        TradingStrategy::new(2, IDLE_STRATEGY_TAG, true),
        TradingStrategy::new(3, DISABLED_STRATEGY_TAG, false),
    ]
}

// ============================================================================
// Exchange fake
// ============================================================================

/// How a scripted exchange call fails
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Failure {
    Rejected,
    FillTimeout,
}

impl Failure {
    fn error(self, order_id: &str) -> TraderError {
        match self {
            Failure::Rejected => TraderError::ExchangeRejected {
                code: 10001,
                message: "params error".to_string(),
            },
            Failure::FillTimeout => TraderError::FillTimeout {
                order_id: order_id.to_string(),
                attempts: 60,
            },
        }
    }
}

/// Scripted exchange that fills at the configured price of each symbol
#[derive(Default)]
pub struct FakeExchange {
    prices: Mutex<HashMap<String, Decimal>>,
    balance: Mutex<Option<Decimal>>,
    open_failure: Mutex<Option<Failure>>,
    close_failure: Mutex<Option<Failure>>,
    fill_delay: Mutex<Duration>,
    order_seq: AtomicU32,
    pub price_calls: AtomicUsize,
    pub balance_calls: AtomicUsize,
    pub open_calls: AtomicUsize,
    pub close_calls: AtomicUsize,
    pub leverage_calls: AtomicUsize,
}

impl FakeExchange {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_price(&self, symbol: &str, price: Decimal) {
        self.prices.lock().unwrap().insert(symbol.to_string(), price);
    }

    /// Make price lookups for `symbol` fail
    pub fn clear_price(&self, symbol: &str) {
        self.prices.lock().unwrap().remove(symbol);
    }

    pub fn set_balance(&self, balance: Decimal) {
        *self.balance.lock().unwrap() = Some(balance);
    }

    pub fn fail_balance(&self) {
        *self.balance.lock().unwrap() = None;
    }

    pub fn fail_open(&self, failure: Failure) {
        *self.open_failure.lock().unwrap() = Some(failure);
    }

    pub fn fail_close(&self, failure: Failure) {
        *self.close_failure.lock().unwrap() = Some(failure);
    }

    pub fn heal(&self) {
        *self.open_failure.lock().unwrap() = None;
        *self.close_failure.lock().unwrap() = None;
    }

    /// Delay every fill, to let concurrent callers overlap
    pub fn set_fill_delay(&self, delay: Duration) {
        *self.fill_delay.lock().unwrap() = delay;
    }

    /// Every exchange call made so far
    pub fn total_calls(&self) -> usize {
        self.price_calls.load(Ordering::SeqCst)
            + self.balance_calls.load(Ordering::SeqCst)
            + self.open_calls.load(Ordering::SeqCst)
            + self.close_calls.load(Ordering::SeqCst)
            + self.leverage_calls.load(Ordering::SeqCst)
    }

    fn price_of(&self, symbol: &str) -> Result<Decimal> {
        self.prices
            .lock()
            .unwrap()
            .get(symbol)
            .copied()
            .ok_or_else(|| TraderError::InvalidResponse(format!("no price for {}", symbol)))
    }

    async fn fill(
        &self,
        symbol: &str,
        amount: Decimal,
        failure: Option<Failure>,
    ) -> Result<OrderResult> {
        let order_id = format!("order-{}", self.order_seq.fetch_add(1, Ordering::SeqCst) + 1);

        let delay = *self.fill_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if let Some(failure) = failure {
            return Err(failure.error(&order_id));
        }

        let price = self.price_of(symbol)?;
        let total_cost = price * amount;
        Ok(OrderResult {
            avg_price: price,
            total_cost,
            commission: total_cost * FAKE_COMMISSION_RATE,
            amount,
            filled_at: None,
            order_id: Some(order_id),
        })
    }
}

#[async_trait]
impl ExchangeClient for FakeExchange {
    async fn get_current_price(&self, coin: &Coin) -> Result<Decimal> {
        self.price_calls.fetch_add(1, Ordering::SeqCst);
        self.price_of(&coin.symbol)
    }

    async fn open_futures_order(
        &self,
        coin: &Coin,
        amount: Decimal,
        _price: Decimal,
        _direction: Direction,
        _stop_loss_price: Option<Decimal>,
    ) -> Result<OrderResult> {
        self.open_calls.fetch_add(1, Ordering::SeqCst);
        let failure = *self.open_failure.lock().unwrap();
        self.fill(&coin.symbol, amount, failure).await
    }

    async fn close_futures_order(
        &self,
        coin: &Coin,
        open_transaction: &Transaction,
        _price: Decimal,
    ) -> Result<OrderResult> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        let failure = *self.close_failure.lock().unwrap();
        self.fill(&coin.symbol, open_transaction.amount, failure).await
    }

    async fn get_wallet_available_balance(&self) -> Result<Decimal> {
        self.balance_calls.fetch_add(1, Ordering::SeqCst);
        (*self.balance.lock().unwrap())
            .ok_or_else(|| TraderError::InvalidResponse("wallet unavailable".to_string()))
    }

    async fn set_futures_leverage(&self, _coin: &Coin, _leverage: u32) -> Result<()> {
        self.leverage_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn set_isolated_margin(&self, _coin: &Coin, _leverage: u32) -> Result<()> {
        self.leverage_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ============================================================================
// Store and notifier fakes
// ============================================================================

/// In-memory ledger whose writes can be switched to fail
#[derive(Default)]
pub struct FlakyTransactionStore {
    pub inner: InMemoryTransactionStore,
    fail_find_open: AtomicBool,
    fail_save: AtomicBool,
    fail_record_close: AtomicBool,
}

impl FlakyTransactionStore {
    pub fn fail_find_open(&self, fail: bool) {
        self.fail_find_open.store(fail, Ordering::SeqCst);
    }

    pub fn fail_save(&self, fail: bool) {
        self.fail_save.store(fail, Ordering::SeqCst);
    }

    pub fn fail_record_close(&self, fail: bool) {
        self.fail_record_close.store(fail, Ordering::SeqCst);
    }

    pub async fn all(&self) -> Vec<Transaction> {
        self.inner.all().await
    }
}

#[async_trait]
impl TransactionStore for FlakyTransactionStore {
    async fn find_open_transaction(
        &self,
        strategy_id: i64,
        coin_id: i64,
        trading_key: Option<&str>,
    ) -> Result<Option<Transaction>> {
        if self.fail_find_open.load(Ordering::SeqCst) {
            return Err(TraderError::Internal("connection reset".to_string()));
        }
        self.inner.find_open_transaction(strategy_id, coin_id, trading_key).await
    }

    async fn save_transaction(&self, transaction: &mut Transaction) -> Result<()> {
        if self.fail_save.load(Ordering::SeqCst) {
            return Err(TraderError::Internal("connection reset".to_string()));
        }
        self.inner.save_transaction(transaction).await
    }

    async fn find_all_open_transactions(
        &self,
        strategy: &TradingStrategy,
    ) -> Result<Vec<Transaction>> {
        self.inner.find_all_open_transactions(strategy).await
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Transaction>> {
        self.inner.find_by_id(id).await
    }

    async fn record_close(&self, open: &mut Transaction, close: &mut Transaction) -> Result<()> {
        if self.fail_record_close.load(Ordering::SeqCst) {
            return Err(TraderError::Internal("connection reset".to_string()));
        }
        self.inner.record_close(open, close).await
    }

    async fn sum_of_profit(&self, strategy_id: i64, coin_id: Option<i64>) -> Result<i64> {
        self.inner.sum_of_profit(strategy_id, coin_id).await
    }
}

/// Reference data whose strategy listing can fail or be held open
pub struct GatedReferenceStore {
    pub inner: InMemoryReferenceStore,
    fail_list: AtomicBool,
    hold_list: AtomicBool,
    /// Signalled when a held listing has started
    pub entered: Notify,
    /// Lets one held listing finish
    pub release: Notify,
}

impl GatedReferenceStore {
    pub fn new() -> Self {
        Self {
            inner: InMemoryReferenceStore::new(vec![btc(), eth()], strategies()),
            fail_list: AtomicBool::new(false),
            hold_list: AtomicBool::new(false),
            entered: Notify::new(),
            release: Notify::new(),
        }
    }

    pub fn fail_list(&self, fail: bool) {
        self.fail_list.store(fail, Ordering::SeqCst);
    }

    pub fn hold_list(&self, hold: bool) {
        self.hold_list.store(hold, Ordering::SeqCst);
    }
}

#[async_trait]
impl ReferenceStore for GatedReferenceStore {
    async fn find_coin_by_id(&self, id: i64) -> Result<Option<Coin>> {
        self.inner.find_coin_by_id(id).await
    }

    async fn find_coin_by_symbol(&self, symbol: &str) -> Result<Option<Coin>> {
        self.inner.find_coin_by_symbol(symbol).await
    }

    async fn find_strategy_by_tag(&self, tag: &str) -> Result<Option<TradingStrategy>> {
        self.inner.find_strategy_by_tag(tag).await
    }

    async fn list_strategies(&self) -> Result<Vec<TradingStrategy>> {
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(TraderError::Internal("relation does not exist".to_string()));
        }
        if self.hold_list.load(Ordering::SeqCst) {
            self.entered.notify_one();
            self.release.notified().await;
        }
        self.inner.list_strategies().await
    }
}

/// Keeps every message it is asked to send
#[derive(Default)]
pub struct RecordingNotifier {
    messages: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.messages().iter().any(|m| m.contains(needle))
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, text: &str) {
        self.messages.lock().unwrap().push(text.to_string());
    }
}

/// Returns immediately and counts calls
#[derive(Default)]
pub struct InstantSleeper {
    pub calls: AtomicU32,
}

#[async_trait]
impl Sleeper for InstantSleeper {
    async fn sleep(&self, _duration: Duration) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

// ============================================================================
// Harness
// ============================================================================

/// Order manager wired to fakes, with BTC and ETH priced at 100 and 2000
pub struct Harness {
    pub exchange: Arc<FakeExchange>,
    pub transactions: Arc<FlakyTransactionStore>,
    pub references: Arc<InMemoryReferenceStore>,
    pub notifier: Arc<RecordingNotifier>,
    pub clock: Arc<FixedClock>,
    pub manager: Arc<OrderManager>,
}

impl Harness {
    /// Leverage 1, safety buffer 50, wallet balance 1050
    pub fn new() -> Self {
        Self::with_leverage(1)
    }

    pub fn with_leverage(leverage: u32) -> Self {
        let exchange = Arc::new(FakeExchange::new());
        exchange.set_price("BTCUSDT", dec!(100));
        exchange.set_price("ETHUSDT", dec!(2000));
        exchange.set_balance(dec!(1050));

        let transactions = Arc::new(FlakyTransactionStore::default());
        let references = Arc::new(InMemoryReferenceStore::new(vec![btc(), eth()], strategies()));
        let notifier = Arc::new(RecordingNotifier::default());
        let clock = Arc::new(FixedClock::new(test_now()));

        let manager = Arc::new(OrderManager::new(
            exchange.clone(),
            transactions.clone(),
            references.clone(),
            notifier.clone(),
            clock.clone(),
            leverage,
            dec!(50),
        ));

        Self {
            exchange,
            transactions,
            references,
            notifier,
            clock,
            manager,
        }
    }

    pub async fn strategy(&self, tag: &str) -> TradingStrategy {
        self.references
            .find_strategy_by_tag(tag)
            .await
            .unwrap()
            .expect("fixture strategy")
    }
}

/// Open ledger row written straight to a store, bypassing the exchange
pub fn open_row(strategy_id: i64, coin_id: i64, price: Decimal, amount: Decimal) -> Transaction {
    Transaction {
        id: None,
        coin_id,
        transaction_type: Direction::Long.opening_type(),
        amount,
        price,
        total_cost: price * amount,
        commission: Decimal::ZERO,
        stop_loss_price: None,
        take_profit_price: None,
        created_at: test_now(),
        client_order_id: None,
        api_error: None,
        related_transaction_id: None,
        profit: None,
        percent_profit: None,
        trading_strategy_id: strategy_id,
        direction: Direction::Long,
        is_fake: false,
        trading_key: String::new(),
    }
}
