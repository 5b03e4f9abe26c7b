//! Telegram Bot API notifier

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, error};

use crate::common::errors::{Result, TraderError};
use crate::common::traits::Notifier;
use crate::config::types::TelegramConfig;

#[derive(Serialize)]
struct SendMessageForm<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'a str,
}

/// Sends HTML formatted messages to one chat
#[derive(Debug, Clone)]
pub struct TelegramNotifier {
    client: Client,
    api_base_url: String,
    bot_token: Option<String>,
    chat_id: Option<String>,
    enabled: bool,
}

impl TelegramNotifier {
    pub fn new(config: &TelegramConfig, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TraderError::Internal(e.to_string()))?;

        Ok(Self {
            client,
            api_base_url: config.api_base_url.clone(),
            bot_token: config.bot_token.clone().filter(|t| !t.is_empty()),
            chat_id: config.chat_id.clone().filter(|c| !c.is_empty()),
            enabled: config.enabled,
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Post one message; `Ok` without a request when sending is disabled
    pub async fn send_message(&self, text: &str) -> Result<()> {
        if !self.enabled {
            debug!(text, "telegram message (disabled)");
            return Ok(());
        }

        let (token, chat_id) = match (&self.bot_token, &self.chat_id) {
            (Some(token), Some(chat_id)) => (token, chat_id),
            _ => {
                return Err(TraderError::Configuration(
                    "telegram bot token or chat id not set".to_string(),
                ))
            }
        };

        let url = format!("{}{}/sendMessage", self.api_base_url, token);
        let form = SendMessageForm {
            chat_id,
            text,
            parse_mode: "HTML",
        };

        let response = self.client.post(&url).form(&form).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TraderError::InvalidResponse(format!(
                "telegram API error: status={}, body={}",
                status, body
            )));
        }

        debug!(text, status = status.as_u16(), "telegram message sent");
        Ok(())
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, text: &str) {
        if let Err(e) = self.send_message(text).await {
            error!(error = %e, "failed to send telegram message");
        }
    }
}
