//! Periodic unrealized-profit report
//!
//! Read-only over the ledger: the worker values open positions and sends one
//! message per sweep, it never closes anything.

use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::common::money::round2;
use crate::common::traits::{Notifier, ReferenceStore, TransactionStore};
use crate::orders::OrderManager;

/// Sends the open-position profit report on a fixed interval
pub struct ProfitChecker {
    references: Arc<dyn ReferenceStore>,
    transactions: Arc<dyn TransactionStore>,
    manager: Arc<OrderManager>,
    notifier: Arc<dyn Notifier>,
    interval: Duration,
    sweep: Mutex<()>,
}

impl ProfitChecker {
    pub fn new(
        references: Arc<dyn ReferenceStore>,
        transactions: Arc<dyn TransactionStore>,
        manager: Arc<OrderManager>,
        notifier: Arc<dyn Notifier>,
        interval: Duration,
    ) -> Self {
        Self {
            references,
            transactions,
            manager,
            notifier,
            interval,
            sweep: Mutex::new(()),
        }
    }

    /// Spawn [`ProfitChecker::run`] on the runtime
    pub fn start(self: Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(shutdown).await })
    }

    /// Sweep immediately, then once per interval until `shutdown` fires
    pub async fn run(&self, shutdown: CancellationToken) {
        info!(interval_secs = self.interval.as_secs(), "profit checker started");
        self.check_order_profits().await;

        loop {
            tokio::select! {
                () = shutdown.cancelled() => {
                    info!("profit checker shutting down");
                    break;
                }
                () = tokio::time::sleep(self.interval) => {
                    self.check_order_profits().await;
                }
            }
        }
    }

    /// Value every open position of every enabled strategy and send the report
    ///
    /// Returns the sent text, or `None` when nothing was sent. A sweep that
    /// starts while another is still running is skipped.
    pub async fn check_order_profits(&self) -> Option<String> {
        let Ok(_guard) = self.sweep.try_lock() else {
            warn!("profit sweep already running, skipping");
            return None;
        };
        info!("checking profits for all opened orders");

        let strategies = match self.references.list_strategies().await {
            Ok(strategies) => strategies,
            Err(e) => {
                error!(error = %e, "failed to get trading strategies");
                return None;
            }
        };

        let mut total_opened = 0usize;
        let mut body = String::new();

        for strategy in strategies.iter().filter(|s| s.enabled) {
            let opened = match self.transactions.find_all_open_transactions(strategy).await {
                Ok(opened) => opened,
                Err(e) => {
                    error!(tag = %strategy.tag, error = %e, "failed to get opened transactions");
                    continue;
                }
            };
            if opened.is_empty() {
                continue;
            }

            total_opened += opened.len();
            let _ = write!(body, "\n<b>Strategy: {}</b>\n", strategy.tag);

            for transaction in &opened {
                let coin = match self.references.find_coin_by_id(transaction.coin_id).await {
                    Ok(Some(coin)) => coin,
                    Ok(None) => {
                        warn!(
                            transaction_id = ?transaction.id,
                            coin_id = transaction.coin_id,
                            "coin not found"
                        );
                        continue;
                    }
                    Err(e) => {
                        error!(transaction_id = ?transaction.id, error = %e, "failed to get coin");
                        continue;
                    }
                };

                let snapshot = match self
                    .manager
                    .current_profit_with_leverage(&coin, transaction)
                    .await
                {
                    Ok(snapshot) => snapshot,
                    Err(e) => {
                        error!(
                            transaction_id = ?transaction.id,
                            error = %e,
                            "failed to calculate profit"
                        );
                        continue;
                    }
                };

                let _ = writeln!(
                    body,
                    "Coin: {}, Entry: {:.2}, Current: {:.2}, Cost: {:.2} Profit: {:.2}% (${:.2})",
                    coin.symbol,
                    round2(transaction.price),
                    round2(snapshot.current_price),
                    round2(transaction.total_cost),
                    round2(snapshot.percent_with_leverage),
                    round2(snapshot.usd),
                );
            }
        }

        if total_opened == 0 {
            info!("no opened orders found");
            return None;
        }

        let report = format!(
            "<b>Order Profit Report</b>\nTotal opened orders: {}\n{}",
            total_opened, body
        );
        self.notifier.send(&report).await;
        info!(total_opened, "sent profit report");
        Some(report)
    }
}
