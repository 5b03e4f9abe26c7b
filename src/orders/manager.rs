//! Order lifecycle manager
//!
//! Turns decisions into exchange orders and keeps the ledger in step with
//! them. Every lookup-then-act sequence for a strategy/coin pair runs under
//! that pair's lock, so two concurrent signals cannot both open a position.

use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::locks::{KeyedLocks, PositionKey};
use crate::common::clock::Clock;
use crate::common::errors::{Result, TraderError};
use crate::common::money::{
    amount_for_cost, profit_percent, profit_percent_with_leverage, round2, stop_loss_price,
    take_profit_by_ratio, take_profit_price, to_cents,
};
use crate::common::traits::{ExchangeClient, Notifier, ReferenceStore, TransactionStore};
use crate::common::types::{
    Coin, Direction, OrderResult, Signal, SignalOutcome, TradingStrategy, TradingType, Transaction,
};

/// How the cost of a new position is chosen
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Sizing {
    /// Free balance minus the safety buffer, times leverage
    AllIn,
    /// Fixed quote-currency cost
    FixedCost(Decimal),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StopLoss {
    Price(Decimal),
    /// Percent away from the current price
    Percent(Decimal),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TakeProfit {
    Price(Decimal),
    /// Percent away from the current price
    Percent(Decimal),
    /// Multiple of the stop-loss distance; ignored without a stop loss
    RiskRatio(Decimal),
}

/// Parameters of one position open
#[derive(Debug, Clone, PartialEq)]
pub struct OpenRequest {
    pub direction: Direction,
    pub sizing: Sizing,
    pub stop_loss: Option<StopLoss>,
    pub take_profit: Option<TakeProfit>,
    pub trading_key: Option<String>,
    pub trading_type: TradingType,
}

impl OpenRequest {
    pub fn all_in(direction: Direction) -> Self {
        Self {
            direction,
            sizing: Sizing::AllIn,
            stop_loss: None,
            take_profit: None,
            trading_key: None,
            trading_type: TradingType::Futures,
        }
    }

    pub fn with_cost(direction: Direction, cost: Decimal) -> Self {
        Self {
            sizing: Sizing::FixedCost(cost),
            ..Self::all_in(direction)
        }
    }

    pub fn with_stop_loss(mut self, stop_loss: StopLoss) -> Self {
        self.stop_loss = Some(stop_loss);
        self
    }

    pub fn with_take_profit(mut self, take_profit: TakeProfit) -> Self {
        self.take_profit = Some(take_profit);
        self
    }

    pub fn with_trading_key(mut self, key: impl Into<String>) -> Self {
        self.trading_key = Some(key.into());
        self
    }

    pub fn spot(mut self) -> Self {
        self.trading_type = TradingType::Spot;
        self
    }
}

/// Live valuation of an open position
#[derive(Debug, Clone, PartialEq)]
pub struct ProfitSnapshot {
    pub current_price: Decimal,
    /// Unleveraged price change in the position's favor
    pub percent: Decimal,
    pub percent_with_leverage: Decimal,
    /// Unrealized profit in quote currency
    pub usd: Decimal,
}

/// Realized profit of closing `open` with `close`, before rounding
///
/// The open leg of a LONG is the buy and the close leg the sell; SHORT
/// positions swap the roles. Both commissions are deducted.
pub fn realized_profit(open: &Transaction, close: &OrderResult) -> Decimal {
    let (buy_cost, sell_cost) = match open.direction {
        Direction::Long => (open.total_cost, close.total_cost),
        Direction::Short => (close.total_cost, open.total_cost),
    };
    sell_cost - buy_cost - close.commission - open.commission
}

/// Opens and closes futures positions and records them
pub struct OrderManager {
    exchange: Arc<dyn ExchangeClient>,
    transactions: Arc<dyn TransactionStore>,
    references: Arc<dyn ReferenceStore>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    leverage: u32,
    safety_buffer: Decimal,
    locks: KeyedLocks<PositionKey>,
}

impl OrderManager {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        exchange: Arc<dyn ExchangeClient>,
        transactions: Arc<dyn TransactionStore>,
        references: Arc<dyn ReferenceStore>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        leverage: u32,
        safety_buffer: Decimal,
    ) -> Self {
        Self {
            exchange,
            transactions,
            references,
            notifier,
            clock,
            leverage,
            safety_buffer,
            locks: KeyedLocks::new(),
        }
    }

    pub fn leverage(&self) -> u32 {
        self.leverage
    }

    pub async fn set_futures_leverage(&self, coin: &Coin, leverage: u32) -> Result<()> {
        self.exchange.set_futures_leverage(coin, leverage).await
    }

    pub async fn set_isolated_margin(&self, coin: &Coin, leverage: u32) -> Result<()> {
        self.exchange.set_isolated_margin(coin, leverage).await
    }

    /// Act on an alert: open a position when none is open, otherwise close it
    ///
    /// Unknown strategies and coins are rejected before any exchange call.
    pub async fn handle_signal(&self, signal: &Signal) -> Result<SignalOutcome> {
        info!(%signal, "handling signal");

        let direction = Direction::from_side(&signal.side)
            .ok_or_else(|| TraderError::InvalidInput(format!("unknown side '{}'", signal.side)))?;

        let strategy = match self.references.find_strategy_by_tag(&signal.tag).await? {
            Some(strategy) => strategy,
            None => {
                self.notifier
                    .send(&format!("Trading strategy not found: {}", signal.tag))
                    .await;
                return Err(TraderError::StrategyNotFound(signal.tag.clone()));
            }
        };
        if !strategy.enabled {
            self.notifier
                .send(&format!("Trading strategy is disabled: {}", signal.tag))
                .await;
            return Err(TraderError::StrategyDisabled(signal.tag.clone()));
        }

        let coin = match self.references.find_coin_by_symbol(&signal.ticker).await? {
            Some(coin) => coin,
            None => {
                self.notifier
                    .send(&format!("Coin not found: {}", signal.ticker))
                    .await;
                return Err(TraderError::CoinNotFound(signal.ticker.clone()));
            }
        };

        let _guard = self.locks.lock(&PositionKey::new(strategy.id, coin.id)).await;

        let open = self
            .find_open(&strategy, &coin, signal.trading_key.as_deref())
            .await?;

        match open {
            None => {
                let mut request = OpenRequest::all_in(direction);
                request.trading_key = signal.trading_key.clone();
                let transaction = self.open_locked(&strategy, &coin, &request).await?;
                Ok(SignalOutcome::Opened(transaction))
            }
            Some(mut open) => {
                let price = match signal.price {
                    Some(price) => price,
                    None => match self.current_price(&coin).await {
                        Some(price) => price,
                        None => return Ok(SignalOutcome::CloseFailed),
                    },
                };
                match self
                    .close_locked(&strategy, &mut open, &coin, price, TradingType::Futures)
                    .await
                {
                    Some(close) => Ok(SignalOutcome::Closed(close)),
                    None => Ok(SignalOutcome::CloseFailed),
                }
            }
        }
    }

    /// Open a position unless one is already open for the strategy and coin
    pub async fn open_position(
        &self,
        strategy: &TradingStrategy,
        coin: &Coin,
        request: OpenRequest,
    ) -> Result<Transaction> {
        if !strategy.enabled {
            self.notifier
                .send(&format!("Trading strategy is disabled: {}", strategy.tag))
                .await;
            return Err(TraderError::StrategyDisabled(strategy.tag.clone()));
        }

        let _guard = self.locks.lock(&PositionKey::new(strategy.id, coin.id)).await;

        if let Some(existing) = self
            .find_open(strategy, coin, request.trading_key.as_deref())
            .await?
        {
            let transaction_id = existing.require_id()?;
            warn!(symbol = %coin.symbol, transaction_id, "position already open");
            return Err(TraderError::PositionAlreadyOpen {
                symbol: coin.symbol.clone(),
                transaction_id,
            });
        }

        self.open_locked(strategy, coin, &request).await
    }

    /// Close `open` in full at market
    ///
    /// Returns `None` when the close did not happen; the failure has already
    /// been logged and notified and `open` is left untouched. On success
    /// `open.related_transaction_id` points at the returned close leg.
    pub async fn close_position(
        &self,
        strategy: &TradingStrategy,
        open: &mut Transaction,
        coin: &Coin,
        price: Decimal,
        trading_type: TradingType,
    ) -> Option<Transaction> {
        let _guard = self.locks.lock(&PositionKey::new(strategy.id, coin.id)).await;
        self.close_locked(strategy, open, coin, price, trading_type).await
    }

    /// Close `open` at the current exchange price
    pub async fn close_position_at_market(
        &self,
        strategy: &TradingStrategy,
        open: &mut Transaction,
        coin: &Coin,
    ) -> Option<Transaction> {
        let price = self.current_price(coin).await?;
        self.close_position(strategy, open, coin, price, TradingType::Futures)
            .await
    }

    /// Unleveraged profit of `open` at the current price, in percent
    pub async fn current_profit_percent(&self, coin: &Coin, open: &Transaction) -> Result<Decimal> {
        let price = self.exchange.get_current_price(coin).await?;
        profit_percent(open.price, price, open.direction).ok_or_else(|| zero_open_price(open))
    }

    /// Current valuation of `open` including leverage
    pub async fn current_profit_with_leverage(
        &self,
        coin: &Coin,
        open: &Transaction,
    ) -> Result<ProfitSnapshot> {
        let current_price = self.exchange.get_current_price(coin).await?;
        let percent = profit_percent(open.price, current_price, open.direction)
            .ok_or_else(|| zero_open_price(open))?;
        let percent_with_leverage =
            profit_percent_with_leverage(open.price, current_price, open.direction, self.leverage)
                .ok_or_else(|| zero_open_price(open))?;

        Ok(ProfitSnapshot {
            current_price,
            percent,
            percent_with_leverage,
            usd: open.total_cost * percent / Decimal::ONE_HUNDRED,
        })
    }

    // ========================================================================
    // Lock-held internals
    // ========================================================================

    async fn open_locked(
        &self,
        strategy: &TradingStrategy,
        coin: &Coin,
        request: &OpenRequest,
    ) -> Result<Transaction> {
        let cost = match request.sizing {
            Sizing::FixedCost(cost) => cost,
            Sizing::AllIn => self.all_in_cost().await?,
        };
        if cost <= Decimal::ZERO {
            let message = format!("Order cost for {} is not positive: {}", coin.symbol, cost);
            warn!("{}", message);
            self.notifier.send(&message).await;
            return Err(TraderError::InvalidInput(message));
        }

        let price = match self.exchange.get_current_price(coin).await {
            Ok(price) => price,
            Err(e) => {
                error!(symbol = %coin.symbol, error = %e, "failed to get current price");
                self.notifier
                    .send(&format!("Error during GetCurrentPrice for {}: {}", coin.symbol, e))
                    .await;
                return Err(e);
            }
        };

        let amount = match amount_for_cost(price, cost).filter(|amount| *amount > Decimal::ZERO) {
            Some(amount) => amount,
            None => {
                let message = format!(
                    "Cannot size {} order: cost {} at price {}",
                    coin.symbol, cost, price
                );
                error!("{}", message);
                self.notifier.send(&message).await;
                return Err(TraderError::InvalidInput(message));
            }
        };

        let stop_loss = match request.stop_loss {
            Some(StopLoss::Price(p)) => Some(p),
            Some(StopLoss::Percent(pct)) => Some(stop_loss_price(price, pct, request.direction)),
            None => None,
        }
        .filter(|p| *p > Decimal::ZERO);

        let take_profit = match request.take_profit {
            Some(TakeProfit::Price(p)) => Some(p),
            Some(TakeProfit::Percent(pct)) => {
                Some(take_profit_price(price, pct, request.direction))
            }
            Some(TakeProfit::RiskRatio(ratio)) => {
                stop_loss.and_then(|sl| take_profit_by_ratio(price, sl, request.direction, ratio))
            }
            None => None,
        }
        .filter(|p| *p > Decimal::ZERO);

        debug!(
            symbol = %coin.symbol,
            %cost,
            %price,
            %amount,
            stop_loss = ?stop_loss,
            take_profit = ?take_profit,
            "opening position"
        );

        let order = match request.trading_type {
            TradingType::Futures => {
                self.exchange
                    .open_futures_order(coin, amount, price, request.direction, stop_loss)
                    .await
            }
            TradingType::Spot => self.exchange.buy_spot_by_market(coin, amount, price).await,
        };
        let order = match order {
            Ok(order) => order,
            Err(e) => {
                error!(symbol = %coin.symbol, error = %e, "failed to open order");
                self.notifier
                    .send(&format!("Error during OpenFuturesOrder for {}: {}", coin.symbol, e))
                    .await;
                return Err(e);
            }
        };

        let mut transaction = Transaction {
            id: None,
            coin_id: coin.id,
            transaction_type: request.direction.opening_type(),
            amount: order.amount,
            price: order.avg_price,
            total_cost: order.total_cost,
            commission: order.commission,
            stop_loss_price: stop_loss,
            take_profit_price: take_profit,
            created_at: order.filled_at.unwrap_or_else(|| self.clock.now()),
            client_order_id: order.order_id.clone(),
            api_error: None,
            related_transaction_id: None,
            profit: None,
            percent_profit: None,
            trading_strategy_id: strategy.id,
            direction: request.direction,
            is_fake: false,
            trading_key: request.trading_key.clone().unwrap_or_default(),
        };

        if let Err(e) = self.transactions.save_transaction(&mut transaction).await {
            let message = format!(
                "{} order {} filled on exchange but not recorded: {}",
                coin.symbol,
                order.order_id.as_deref().unwrap_or("-"),
                e
            );
            error!("{}", message);
            self.notifier.send(&message).await;
            return Err(TraderError::Unreconciled(message));
        }

        info!(
            symbol = %coin.symbol,
            direction = %request.direction,
            %price,
            transaction_id = ?transaction.id,
            "position opened"
        );
        self.notifier
            .send(&format!("{} {}", coin.symbol, transaction))
            .await;
        Ok(transaction)
    }

    async fn close_locked(
        &self,
        strategy: &TradingStrategy,
        open: &mut Transaction,
        coin: &Coin,
        price: Decimal,
        trading_type: TradingType,
    ) -> Option<Transaction> {
        let open_id = match open.require_id() {
            Ok(id) => id,
            Err(e) => {
                error!(symbol = %coin.symbol, error = %e, "cannot close unsaved transaction");
                self.notifier
                    .send(&format!("Transaction for {} has not been saved", coin.symbol))
                    .await;
                return None;
            }
        };

        // Re-read under the lock; another signal may have closed it meanwhile.
        let mut current = match self.transactions.find_by_id(open_id).await {
            Ok(Some(row)) if row.is_open() => row,
            Ok(Some(_)) => {
                warn!(symbol = %coin.symbol, open_id, "transaction already closed");
                self.notifier
                    .send(&format!(
                        "Transaction {} for {} is already closed",
                        open_id, coin.symbol
                    ))
                    .await;
                return None;
            }
            Ok(None) => {
                warn!(symbol = %coin.symbol, open_id, "transaction not found");
                self.notifier
                    .send(&format!("Transaction {} for {} not found", open_id, coin.symbol))
                    .await;
                return None;
            }
            Err(e) => {
                error!(
                    symbol = %coin.symbol,
                    open_id,
                    error = %e,
                    "failed to load open transaction"
                );
                self.notifier
                    .send(&format!("Error loading transaction {}: {}", open_id, e))
                    .await;
                return None;
            }
        };

        let order = match trading_type {
            TradingType::Futures => self.exchange.close_futures_order(coin, &current, price).await,
            TradingType::Spot => {
                self.exchange
                    .sell_spot_by_market(coin, current.amount, price)
                    .await
            }
        };
        let order = match order {
            Ok(order) => order,
            Err(e) => {
                error!(symbol = %coin.symbol, error = %e, "failed to close order");
                self.notifier
                    .send(&format!("Error during CloseFuturesOrder for {}: {}", coin.symbol, e))
                    .await;
                return None;
            }
        };

        let profit = realized_profit(&current, &order);
        let percent_profit = profit
            .checked_div(current.total_cost)
            .map(|ratio| round2(ratio * Decimal::ONE_HUNDRED));

        let mut close = Transaction {
            id: None,
            coin_id: coin.id,
            transaction_type: current.direction.closing_type(),
            amount: order.amount,
            price: order.avg_price,
            total_cost: order.total_cost,
            commission: order.commission,
            stop_loss_price: None,
            take_profit_price: None,
            created_at: order.filled_at.unwrap_or_else(|| self.clock.now()),
            client_order_id: order.order_id.clone(),
            api_error: None,
            related_transaction_id: Some(open_id),
            profit: Some(to_cents(profit)),
            percent_profit,
            trading_strategy_id: strategy.id,
            direction: current.direction,
            is_fake: current.is_fake,
            trading_key: current.trading_key.clone(),
        };

        if let Err(e) = self.transactions.record_close(&mut current, &mut close).await {
            let message = format!(
                "{} position {} closed on exchange but not recorded: {}",
                coin.symbol, open_id, e
            );
            error!("{}", message);
            self.notifier.send(&message).await;
            return None;
        }

        *open = current;
        info!(symbol = %coin.symbol, open_id, close_id = ?close.id, %profit, "position closed");
        self.notifier.send(&format!("{} {}", coin.symbol, close)).await;
        Some(close)
    }

    async fn all_in_cost(&self) -> Result<Decimal> {
        match self.exchange.get_wallet_available_balance().await {
            Ok(available) => Ok((available - self.safety_buffer) * Decimal::from(self.leverage)),
            Err(e) => {
                error!(error = %e, "failed to get wallet balance");
                self.notifier
                    .send(&format!("Error getting wallet balance: {}", e))
                    .await;
                Err(e)
            }
        }
    }

    async fn find_open(
        &self,
        strategy: &TradingStrategy,
        coin: &Coin,
        trading_key: Option<&str>,
    ) -> Result<Option<Transaction>> {
        match self
            .transactions
            .find_open_transaction(strategy.id, coin.id, trading_key)
            .await
        {
            Ok(open) => Ok(open),
            Err(e) => {
                error!(symbol = %coin.symbol, error = %e, "failed to look up open transaction");
                self.notifier
                    .send(&format!(
                        "Error during FindOpenedTransactionByCoin for {}: {}",
                        coin.symbol, e
                    ))
                    .await;
                Err(e)
            }
        }
    }

    async fn current_price(&self, coin: &Coin) -> Option<Decimal> {
        match self.exchange.get_current_price(coin).await {
            Ok(price) => Some(price),
            Err(e) => {
                error!(symbol = %coin.symbol, error = %e, "failed to get current price");
                self.notifier
                    .send(&format!("Error during GetCurrentPrice for {}: {}", coin.symbol, e))
                    .await;
                None
            }
        }
    }
}

fn zero_open_price(open: &Transaction) -> TraderError {
    TraderError::InvalidInput(format!(
        "transaction {:?} has no open price",
        open.id
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::clock::FixedClock;
    use crate::common::traits::MockExchangeClient;
    use crate::common::types::TransactionType;
    use crate::store::{InMemoryReferenceStore, InMemoryTransactionStore};
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingNotifier {
        messages: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn send(&self, text: &str) {
            self.messages.lock().unwrap().push(text.to_string());
        }
    }

    struct Fixture {
        transactions: Arc<InMemoryTransactionStore>,
        notifier: Arc<RecordingNotifier>,
        strategy: TradingStrategy,
        coin: Coin,
    }

    fn manager(exchange: MockExchangeClient, leverage: u32) -> (OrderManager, Fixture) {
        let transactions = Arc::new(InMemoryTransactionStore::new());
        let notifier = Arc::new(RecordingNotifier::default());
        let strategy = TradingStrategy::new(1, "trend", true);
        let coin = Coin::new(1, "Bitcoin", "BTCUSDT");
        let references = Arc::new(InMemoryReferenceStore::new(
            vec![coin.clone()],
            vec![strategy.clone()],
        ));
        let clock = Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()));

        let manager = OrderManager::new(
            Arc::new(exchange),
            transactions.clone(),
            references,
            notifier.clone(),
            clock,
            leverage,
            dec!(50),
        );
        (
            manager,
            Fixture {
                transactions,
                notifier,
                strategy,
                coin,
            },
        )
    }

    fn fill(price: Decimal, amount: Decimal, commission: Decimal) -> OrderResult {
        OrderResult {
            avg_price: price,
            total_cost: price * amount,
            commission,
            amount,
            filled_at: None,
            order_id: Some("order-1".to_string()),
        }
    }

    fn open_row(direction: Direction, total_cost: Decimal, commission: Decimal) -> Transaction {
        Transaction {
            id: Some(1),
            coin_id: 1,
            transaction_type: direction.opening_type(),
            amount: dec!(10),
            price: total_cost / dec!(10),
            total_cost,
            commission,
            stop_loss_price: None,
            take_profit_price: None,
            created_at: Utc::now(),
            client_order_id: None,
            api_error: None,
            related_transaction_id: None,
            profit: None,
            percent_profit: None,
            trading_strategy_id: 1,
            direction,
            is_fake: false,
            trading_key: String::new(),
        }
    }

    #[test]
    fn test_realized_profit_long() {
        let open = open_row(Direction::Long, dec!(1000), dec!(1));
        let close = fill(dec!(110), dec!(10), dec!(1.1));
        assert_eq!(realized_profit(&open, &close), dec!(97.9));
    }

    #[test]
    fn test_realized_profit_short_swaps_roles() {
        let open = open_row(Direction::Short, dec!(1000), dec!(1));
        let close = fill(dec!(110), dec!(10), dec!(1.1));
        assert_eq!(realized_profit(&open, &close), dec!(-102.1));
    }

    #[tokio::test]
    async fn test_all_in_sizing_uses_buffer_and_leverage() {
        let mut exchange = MockExchangeClient::new();
        exchange
            .expect_get_wallet_available_balance()
            .times(1)
            .returning(|| Ok(dec!(1050)));
        exchange
            .expect_get_current_price()
            .returning(|_| Ok(dec!(100)));
        exchange
            .expect_open_futures_order()
            .withf(|_, amount, price, direction, stop_loss| {
                *amount == dec!(20)
                    && *price == dec!(100)
                    && *direction == Direction::Long
                    && stop_loss.is_none()
            })
            .times(1)
            .returning(|_, amount, price, _, _| Ok(fill(price, amount, dec!(1.1))));

        let (manager, fx) = manager(exchange, 2);
        let tx = manager
            .open_position(&fx.strategy, &fx.coin, OpenRequest::all_in(Direction::Long))
            .await
            .unwrap();

        assert_eq!(tx.id, Some(1));
        assert_eq!(tx.transaction_type, TransactionType::Buy);
        assert_eq!(tx.total_cost, dec!(2000));
        assert_eq!(tx.created_at, Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap());
        assert_eq!(tx.client_order_id.as_deref(), Some("order-1"));
        let messages = fx.notifier.messages.lock().unwrap();
        assert!(messages[0].starts_with("BTCUSDT Transaction {amount: 20"));
    }

    #[tokio::test]
    async fn test_percent_stop_loss_and_ratio_take_profit() {
        let mut exchange = MockExchangeClient::new();
        exchange
            .expect_get_current_price()
            .returning(|_| Ok(dec!(100)));
        exchange
            .expect_open_futures_order()
            .withf(|_, amount, _, direction, stop_loss| {
                *amount == dec!(5)
                    && *direction == Direction::Short
                    && *stop_loss == Some(dec!(105))
            })
            .returning(|_, amount, price, _, _| Ok(fill(price, amount, dec!(0))));

        let (manager, fx) = manager(exchange, 1);
        let request = OpenRequest::with_cost(Direction::Short, dec!(500))
            .with_stop_loss(StopLoss::Percent(dec!(5)))
            .with_take_profit(TakeProfit::RiskRatio(dec!(2)))
            .with_trading_key("grid");
        let tx = manager.open_position(&fx.strategy, &fx.coin, request).await.unwrap();

        assert_eq!(tx.transaction_type, TransactionType::Sell);
        assert_eq!(tx.stop_loss_price, Some(dec!(105)));
        assert_eq!(tx.take_profit_price, Some(dec!(90)));
        assert_eq!(tx.trading_key, "grid");
    }

    #[tokio::test]
    async fn test_wallet_failure_aborts_before_ordering() {
        let mut exchange = MockExchangeClient::new();
        exchange
            .expect_get_wallet_available_balance()
            .returning(|| Err(TraderError::InvalidResponse("down".to_string())));

        let (manager, fx) = manager(exchange, 1);
        let result = manager
            .open_position(&fx.strategy, &fx.coin, OpenRequest::all_in(Direction::Long))
            .await;

        assert!(result.is_err());
        assert!(fx.transactions.all().await.is_empty());
        let messages = fx.notifier.messages.lock().unwrap();
        assert!(messages[0].starts_with("Error getting wallet balance"));
    }

    #[tokio::test]
    async fn test_balance_below_buffer_is_rejected() {
        let mut exchange = MockExchangeClient::new();
        exchange
            .expect_get_wallet_available_balance()
            .returning(|| Ok(dec!(40)));

        let (manager, fx) = manager(exchange, 3);
        let result = manager
            .open_position(&fx.strategy, &fx.coin, OpenRequest::all_in(Direction::Long))
            .await;

        assert!(matches!(result, Err(TraderError::InvalidInput(_))));
        assert!(fx.transactions.all().await.is_empty());
    }

    #[tokio::test]
    async fn test_second_open_is_refused() {
        let mut exchange = MockExchangeClient::new();
        exchange
            .expect_get_current_price()
            .returning(|_| Ok(dec!(100)));
        exchange
            .expect_open_futures_order()
            .times(1)
            .returning(|_, amount, price, _, _| Ok(fill(price, amount, dec!(0))));

        let (manager, fx) = manager(exchange, 1);
        let request = OpenRequest::with_cost(Direction::Long, dec!(100));
        manager
            .open_position(&fx.strategy, &fx.coin, request.clone())
            .await
            .unwrap();
        let second = manager.open_position(&fx.strategy, &fx.coin, request).await;

        assert!(matches!(
            second,
            Err(TraderError::PositionAlreadyOpen { transaction_id: 1, .. })
        ));
    }

    #[tokio::test]
    async fn test_profit_snapshot_with_leverage() {
        let mut exchange = MockExchangeClient::new();
        exchange
            .expect_get_current_price()
            .returning(|_| Ok(dec!(110)));

        let (manager, fx) = manager(exchange, 5);
        let open = open_row(Direction::Long, dec!(1000), dec!(1));

        let snapshot = manager.current_profit_with_leverage(&fx.coin, &open).await.unwrap();
        assert_eq!(snapshot.current_price, dec!(110));
        assert_eq!(snapshot.percent, dec!(10));
        assert_eq!(snapshot.percent_with_leverage, dec!(50));
        assert_eq!(snapshot.usd, dec!(100));

        let short = open_row(Direction::Short, dec!(1000), dec!(1));
        assert_eq!(manager.current_profit_percent(&fx.coin, &short).await.unwrap(), dec!(-10));
    }

    #[tokio::test]
    async fn test_leverage_pass_through() {
        let mut exchange = MockExchangeClient::new();
        exchange
            .expect_set_futures_leverage()
            .withf(|coin, leverage| coin.symbol == "BTCUSDT" && *leverage == 3)
            .returning(|_, _| Ok(()));
        exchange
            .expect_set_isolated_margin()
            .returning(|_, _| {
                Err(TraderError::ExchangeRejected {
                    code: 10001,
                    message: "bad".to_string(),
                })
            });

        let (manager, fx) = manager(exchange, 3);
        assert!(manager.set_futures_leverage(&fx.coin, 3).await.is_ok());
        assert!(manager.set_isolated_margin(&fx.coin, 3).await.is_err());
    }
}
