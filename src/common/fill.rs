//! Bounded polling for order fill confirmation
//!
//! After a market order is accepted the exchange still has to report it as
//! filled. [`FillPoller`] waits one interval, asks for the order status and
//! repeats until the order is filled, reaches a terminal status, the attempt
//! budget runs out or shutdown is requested.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::clock::{Sleeper, TokioSleeper};
use super::errors::{Result, TraderError};

/// Default number of status checks
pub const DEFAULT_FILL_ATTEMPTS: u32 = 60;

/// Default delay before each status check
pub const DEFAULT_FILL_INTERVAL: Duration = Duration::from_secs(1);

/// Order status as seen by one poll
#[derive(Debug, Clone, PartialEq)]
pub enum FillStatus<T> {
    /// Fully executed, carrying the fill payload
    Filled(T),
    /// Still working on the book
    Pending,
    /// Terminal non-fill status (rejected, cancelled, ...)
    Rejected(String),
}

/// Polls an order until it is filled
#[derive(Clone)]
pub struct FillPoller {
    max_attempts: u32,
    interval: Duration,
    sleeper: Arc<dyn Sleeper>,
    shutdown: CancellationToken,
}

impl FillPoller {
    pub fn new(max_attempts: u32, interval: Duration, shutdown: CancellationToken) -> Self {
        Self {
            max_attempts,
            interval,
            sleeper: Arc::new(TokioSleeper),
            shutdown,
        }
    }

    /// Replace the delay source, used by tests to avoid real waiting
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Wait until `fetch` reports the order as filled
    ///
    /// Every attempt counts against the budget, including ones whose status
    /// request failed. A failed request is logged and retried.
    pub async fn wait_for_fill<T, F, Fut>(&self, order_id: &str, mut fetch: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<FillStatus<T>>>,
    {
        for attempt in 1..=self.max_attempts {
            tokio::select! {
                biased;
                () = self.shutdown.cancelled() => {
                    warn!(order_id, attempt, "fill polling cancelled by shutdown");
                    return Err(TraderError::Cancelled(format!(
                        "fill polling for order {}",
                        order_id
                    )));
                }
                () = self.sleeper.sleep(self.interval) => {}
            }

            match fetch().await {
                Ok(FillStatus::Filled(fill)) => {
                    debug!(order_id, attempt, "order filled");
                    return Ok(fill);
                }
                Ok(FillStatus::Pending) => {
                    debug!(order_id, attempt, "order not filled yet");
                }
                Ok(FillStatus::Rejected(status)) => {
                    return Err(TraderError::FillRejected {
                        order_id: order_id.to_string(),
                        status,
                    });
                }
                Err(e) => {
                    warn!(order_id, attempt, error = %e, "failed to get order status");
                }
            }
        }

        Err(TraderError::FillTimeout {
            order_id: order_id.to_string(),
            attempts: self.max_attempts,
        })
    }
}

impl std::fmt::Debug for FillPoller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FillPoller")
            .field("max_attempts", &self.max_attempts)
            .field("interval", &self.interval)
            .finish()
    }
}
