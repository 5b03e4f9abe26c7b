use async_trait::async_trait;
use tracing::info;

use crate::common::traits::Notifier;

/// Writes notifications to the log only
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, text: &str) {
        info!(target: "notification", "{}", text);
    }
}
