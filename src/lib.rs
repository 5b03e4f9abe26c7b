//! FuturesWebhookBot Library
//!
//! Turns trading alerts into Bybit futures positions, keeps a ledger of the
//! opening and closing legs and reports unrealized profit on a timer.

pub mod bybit;
pub mod common;
pub mod config;
pub mod notify;
pub mod orders;
pub mod store;
pub mod worker;

// Re-export commonly used types
pub use bybit::client::BybitClient;
pub use bybit::rest::BybitRestClient;
pub use common::clock::{Clock, FixedClock, Sleeper, SystemClock, TokioSleeper};
pub use common::errors::{Result, TraderError};
pub use common::fill::{FillPoller, FillStatus};
pub use common::traits::{ExchangeClient, Notifier, ReferenceStore, TransactionStore};
pub use common::types::{
    Coin, Direction, OrderResult, Signal, SignalOutcome, TradingStrategy, TradingType, Transaction,
    TransactionType,
};
pub use config::types::AppConfig;
pub use notify::{LogNotifier, TelegramNotifier};
pub use orders::{OpenRequest, OrderManager, ProfitSnapshot, Sizing, StopLoss, TakeProfit};
pub use store::{
    InMemoryReferenceStore, InMemoryTransactionStore, PgReferenceStore, PgTransactionStore,
};
pub use worker::ProfitChecker;
