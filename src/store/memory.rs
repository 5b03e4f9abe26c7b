//! In-process stores, used when no database is configured and by tests

use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::Mutex;

use crate::common::errors::{Result, TraderError};
use crate::common::traits::{ReferenceStore, TransactionStore};
use crate::common::types::{Coin, TradingStrategy, Transaction};

#[derive(Debug, Default)]
struct Ledger {
    rows: BTreeMap<i64, Transaction>,
    last_id: i64,
}

impl Ledger {
    fn insert(&mut self, transaction: &mut Transaction) -> i64 {
        self.last_id += 1;
        let id = self.last_id;
        transaction.id = Some(id);
        self.rows.insert(id, transaction.clone());
        id
    }
}

/// Transaction ledger kept behind a single mutex
#[derive(Debug, Default)]
pub struct InMemoryTransactionStore {
    ledger: Mutex<Ledger>,
}

impl InMemoryTransactionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every stored row, by id
    pub async fn all(&self) -> Vec<Transaction> {
        self.ledger.lock().await.rows.values().cloned().collect()
    }
}

#[async_trait]
impl TransactionStore for InMemoryTransactionStore {
    async fn find_open_transaction(
        &self,
        strategy_id: i64,
        coin_id: i64,
        trading_key: Option<&str>,
    ) -> Result<Option<Transaction>> {
        let ledger = self.ledger.lock().await;
        Ok(ledger
            .rows
            .values()
            .filter(|tx| {
                tx.is_open()
                    && tx.trading_strategy_id == strategy_id
                    && tx.coin_id == coin_id
                    && trading_key.map_or(true, |key| tx.trading_key == key)
            })
            .max_by_key(|tx| (tx.created_at, tx.id))
            .cloned())
    }

    async fn save_transaction(&self, transaction: &mut Transaction) -> Result<()> {
        let mut ledger = self.ledger.lock().await;
        match transaction.id {
            None => {
                ledger.insert(transaction);
            }
            Some(id) => {
                let row = ledger.rows.get_mut(&id).ok_or(TraderError::TransactionNotFound(id))?;
                *row = transaction.clone();
            }
        }
        Ok(())
    }

    async fn find_all_open_transactions(
        &self,
        strategy: &TradingStrategy,
    ) -> Result<Vec<Transaction>> {
        let ledger = self.ledger.lock().await;
        let mut open: Vec<Transaction> = ledger
            .rows
            .values()
            .filter(|tx| tx.is_open() && tx.trading_strategy_id == strategy.id)
            .cloned()
            .collect();
        open.sort_by_key(|tx| (tx.created_at, tx.id));
        Ok(open)
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Transaction>> {
        Ok(self.ledger.lock().await.rows.get(&id).cloned())
    }

    async fn record_close(&self, open: &mut Transaction, close: &mut Transaction) -> Result<()> {
        let open_id = open.require_id()?;
        let mut ledger = self.ledger.lock().await;

        match ledger.rows.get(&open_id) {
            None => return Err(TraderError::TransactionNotFound(open_id)),
            Some(row) if !row.is_open() => {
                return Err(TraderError::InvalidInput(format!(
                    "transaction {} is already closed",
                    open_id
                )))
            }
            Some(_) => {}
        }

        let close_id = ledger.insert(close);
        open.related_transaction_id = Some(close_id);
        ledger.rows.insert(open_id, open.clone());
        Ok(())
    }

    async fn sum_of_profit(&self, strategy_id: i64, coin_id: Option<i64>) -> Result<i64> {
        let ledger = self.ledger.lock().await;
        Ok(ledger
            .rows
            .values()
            .filter(|tx| tx.trading_strategy_id == strategy_id)
            .filter(|tx| match coin_id {
                Some(coin_id) => tx.coin_id == coin_id && !tx.is_fake,
                None => true,
            })
            .filter_map(|tx| tx.profit)
            .sum())
    }
}

/// Fixed coin and strategy tables
#[derive(Debug, Default)]
pub struct InMemoryReferenceStore {
    coins: Vec<Coin>,
    strategies: Vec<TradingStrategy>,
}

impl InMemoryReferenceStore {
    pub fn new(coins: Vec<Coin>, strategies: Vec<TradingStrategy>) -> Self {
        Self { coins, strategies }
    }
}

#[async_trait]
impl ReferenceStore for InMemoryReferenceStore {
    async fn find_coin_by_id(&self, id: i64) -> Result<Option<Coin>> {
        Ok(self.coins.iter().find(|coin| coin.id == id).cloned())
    }

    async fn find_coin_by_symbol(&self, symbol: &str) -> Result<Option<Coin>> {
        Ok(self
            .coins
            .iter()
            .find(|coin| coin.symbol.eq_ignore_ascii_case(symbol))
            .cloned())
    }

    async fn find_strategy_by_tag(&self, tag: &str) -> Result<Option<TradingStrategy>> {
        Ok(self.strategies.iter().find(|s| s.tag == tag).cloned())
    }

    async fn list_strategies(&self) -> Result<Vec<TradingStrategy>> {
        Ok(self.strategies.clone())
    }
}
