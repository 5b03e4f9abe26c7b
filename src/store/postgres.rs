//! PostgreSQL stores on sqlx
//!
//! Queries are checked at runtime so the crate builds without a database.
//! The expected schema is in `migrations/`.

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use std::time::Duration;
use tracing::{debug, error, info};

use crate::common::errors::{Result, TraderError};
use crate::common::traits::{ReferenceStore, TransactionStore};
use crate::common::types::{Coin, Direction, TradingStrategy, Transaction, TransactionType};
use crate::config::types::DatabaseConfig;

const TRANSACTION_COLUMNS: &str = "id, coin_id, transaction_type, amount, price, total_cost, commission, \
     stop_loss_price, take_profit_price, created_at, client_order_id, api_error, related_transaction_id, \
     profit, percent_profit, trading_strategy_id, futures_type, fake, trading_key";

const INSERT_TRANSACTION: &str = "INSERT INTO transaction_table (coin_id, transaction_type, amount, price, \
     total_cost, commission, stop_loss_price, take_profit_price, created_at, client_order_id, api_error, \
     related_transaction_id, profit, percent_profit, trading_strategy_id, futures_type, fake, trading_key) \
     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18) RETURNING id";

const UPDATE_TRANSACTION: &str = "UPDATE transaction_table SET coin_id = $2, transaction_type = $3, amount = $4, \
     price = $5, total_cost = $6, commission = $7, stop_loss_price = $8, take_profit_price = $9, \
     client_order_id = $10, api_error = $11, related_transaction_id = $12, profit = $13, percent_profit = $14 \
     WHERE id = $1";

/// Open a connection pool for the configured database
pub async fn connect(config: &DatabaseConfig) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(Duration::from_secs(config.connection_timeout_seconds))
        .connect(&config.url)
        .await?;
    info!(max_connections = config.max_connections, "connected to database");
    Ok(pool)
}

fn transaction_from_row(row: &PgRow) -> Result<Transaction> {
    let type_code: i16 = row.try_get("transaction_type")?;
    let direction_code: i16 = row.try_get("futures_type")?;

    Ok(Transaction {
        id: Some(row.try_get("id")?),
        coin_id: row.try_get("coin_id")?,
        transaction_type: TransactionType::from_code(type_code).ok_or_else(|| {
            TraderError::Internal(format!("unknown transaction_type {}", type_code))
        })?,
        amount: row.try_get("amount")?,
        price: row.try_get("price")?,
        total_cost: row.try_get("total_cost")?,
        commission: row.try_get("commission")?,
        stop_loss_price: row.try_get("stop_loss_price")?,
        take_profit_price: row.try_get("take_profit_price")?,
        created_at: row.try_get("created_at")?,
        client_order_id: row.try_get("client_order_id")?,
        api_error: row.try_get("api_error")?,
        related_transaction_id: row.try_get("related_transaction_id")?,
        profit: row.try_get("profit")?,
        percent_profit: row.try_get("percent_profit")?,
        trading_strategy_id: row.try_get("trading_strategy_id")?,
        direction: Direction::from_code(direction_code).ok_or_else(|| {
            TraderError::Internal(format!("unknown futures_type {}", direction_code))
        })?,
        is_fake: row.try_get("fake")?,
        trading_key: row.try_get("trading_key")?,
    })
}

/// Insert a new row inside `executor` and return its id
async fn insert_transaction<'e, E>(executor: E, tx: &Transaction) -> Result<i64>
where
    E: sqlx::Executor<'e, Database = sqlx::Postgres>,
{
    let id: i64 = sqlx::query_scalar(INSERT_TRANSACTION)
        .bind(tx.coin_id)
        .bind(tx.transaction_type.code())
        .bind(tx.amount)
        .bind(tx.price)
        .bind(tx.total_cost)
        .bind(tx.commission)
        .bind(tx.stop_loss_price)
        .bind(tx.take_profit_price)
        .bind(tx.created_at)
        .bind(tx.client_order_id.as_deref())
        .bind(tx.api_error.as_deref())
        .bind(tx.related_transaction_id)
        .bind(tx.profit)
        .bind(tx.percent_profit)
        .bind(tx.trading_strategy_id)
        .bind(tx.direction.code())
        .bind(tx.is_fake)
        .bind(tx.trading_key.as_str())
        .fetch_one(executor)
        .await?;
    Ok(id)
}

/// Transaction ledger in `transaction_table`
#[derive(Debug, Clone)]
pub struct PgTransactionStore {
    pool: PgPool,
}

impl PgTransactionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TransactionStore for PgTransactionStore {
    async fn find_open_transaction(
        &self,
        strategy_id: i64,
        coin_id: i64,
        trading_key: Option<&str>,
    ) -> Result<Option<Transaction>> {
        let query = format!(
            "SELECT {} FROM transaction_table WHERE related_transaction_id IS NULL \
             AND trading_strategy_id = $1 AND coin_id = $2 AND ($3::TEXT IS NULL OR trading_key = $3) \
             ORDER BY created_at DESC, id DESC LIMIT 1",
            TRANSACTION_COLUMNS
        );
        let row = sqlx::query(&query)
            .bind(strategy_id)
            .bind(coin_id)
            .bind(trading_key)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(transaction_from_row).transpose()
    }

    async fn save_transaction(&self, transaction: &mut Transaction) -> Result<()> {
        match transaction.id {
            None => {
                let id = insert_transaction(&self.pool, transaction).await.map_err(|e| {
                    error!(%transaction, error = %e, "failed to insert transaction");
                    e
                })?;
                transaction.id = Some(id);
                debug!(id, %transaction, "transaction inserted");
            }
            Some(id) => {
                let result = sqlx::query(UPDATE_TRANSACTION)
                    .bind(id)
                    .bind(transaction.coin_id)
                    .bind(transaction.transaction_type.code())
                    .bind(transaction.amount)
                    .bind(transaction.price)
                    .bind(transaction.total_cost)
                    .bind(transaction.commission)
                    .bind(transaction.stop_loss_price)
                    .bind(transaction.take_profit_price)
                    .bind(transaction.client_order_id.as_deref())
                    .bind(transaction.api_error.as_deref())
                    .bind(transaction.related_transaction_id)
                    .bind(transaction.profit)
                    .bind(transaction.percent_profit)
                    .execute(&self.pool)
                    .await?;
                if result.rows_affected() != 1 {
                    return Err(TraderError::TransactionNotFound(id));
                }
            }
        }
        Ok(())
    }

    async fn find_all_open_transactions(
        &self,
        strategy: &TradingStrategy,
    ) -> Result<Vec<Transaction>> {
        let query = format!(
            "SELECT {} FROM transaction_table WHERE related_transaction_id IS NULL \
             AND trading_strategy_id = $1 ORDER BY created_at ASC, id ASC",
            TRANSACTION_COLUMNS
        );
        let rows = sqlx::query(&query)
            .bind(strategy.id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(transaction_from_row).collect()
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Transaction>> {
        let query = format!("SELECT {} FROM transaction_table WHERE id = $1", TRANSACTION_COLUMNS);
        let row = sqlx::query(&query).bind(id).fetch_optional(&self.pool).await?;
        row.as_ref().map(transaction_from_row).transpose()
    }

    async fn record_close(&self, open: &mut Transaction, close: &mut Transaction) -> Result<()> {
        let open_id = open.require_id()?;
        let mut db_tx = self.pool.begin().await?;

        let linked: Option<Option<i64>> = sqlx::query_scalar(
            "SELECT related_transaction_id FROM transaction_table WHERE id = $1 FOR UPDATE",
        )
        .bind(open_id)
        .fetch_optional(&mut *db_tx)
        .await?;
        match linked {
            None => return Err(TraderError::TransactionNotFound(open_id)),
            Some(Some(_)) => {
                return Err(TraderError::InvalidInput(format!(
                    "transaction {} is already closed",
                    open_id
                )))
            }
            Some(None) => {}
        }

        let close_id = insert_transaction(&mut *db_tx, close).await?;
        sqlx::query("UPDATE transaction_table SET related_transaction_id = $2 WHERE id = $1")
            .bind(open_id)
            .bind(close_id)
            .execute(&mut *db_tx)
            .await?;
        db_tx.commit().await?;

        close.id = Some(close_id);
        open.related_transaction_id = Some(close_id);
        debug!(open_id, close_id, "close leg recorded");
        Ok(())
    }

    async fn sum_of_profit(&self, strategy_id: i64, coin_id: Option<i64>) -> Result<i64> {
        let sum: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(profit), 0)::BIGINT FROM transaction_table \
             WHERE profit IS NOT NULL AND trading_strategy_id = $1 \
             AND ($2::BIGINT IS NULL OR (coin_id = $2 AND fake = FALSE))",
        )
        .bind(strategy_id)
        .bind(coin_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(sum)
    }
}

/// Coin and strategy lookups in `coins` and `trading_strategies`
#[derive(Debug, Clone)]
pub struct PgReferenceStore {
    pool: PgPool,
}

impl PgReferenceStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn coin_from_row(row: &PgRow) -> Result<Coin> {
    Ok(Coin {
        id: row.try_get("id")?,
        name: row.try_get("coin_name")?,
        symbol: row.try_get("symbol")?,
    })
}

fn strategy_from_row(row: &PgRow) -> Result<TradingStrategy> {
    let description: Option<String> = row.try_get("description")?;
    Ok(TradingStrategy {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        description: description.unwrap_or_default(),
        tag: row.try_get("tag")?,
        enabled: row.try_get("enabled")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

const STRATEGY_COLUMNS: &str = "id, name, description, tag, enabled, created_at, updated_at";

#[async_trait]
impl ReferenceStore for PgReferenceStore {
    async fn find_coin_by_id(&self, id: i64) -> Result<Option<Coin>> {
        let row = sqlx::query("SELECT id, coin_name, symbol FROM coins WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(coin_from_row).transpose()
    }

    async fn find_coin_by_symbol(&self, symbol: &str) -> Result<Option<Coin>> {
        let row = sqlx::query("SELECT id, coin_name, symbol FROM coins WHERE symbol = $1")
            .bind(symbol)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(coin_from_row).transpose()
    }

    async fn find_strategy_by_tag(&self, tag: &str) -> Result<Option<TradingStrategy>> {
        let query = format!("SELECT {} FROM trading_strategies WHERE tag = $1", STRATEGY_COLUMNS);
        let row = sqlx::query(&query).bind(tag).fetch_optional(&self.pool).await?;
        row.as_ref().map(strategy_from_row).transpose()
    }

    async fn list_strategies(&self) -> Result<Vec<TradingStrategy>> {
        let query = format!("SELECT {} FROM trading_strategies ORDER BY id", STRATEGY_COLUMNS);
        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;
        rows.iter().map(strategy_from_row).collect()
    }
}
