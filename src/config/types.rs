//! Configuration types

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::common::errors::{Result, TraderError};

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Bybit exchange configuration
    #[serde(default)]
    pub bybit: BybitConfig,
    /// Telegram notification configuration
    #[serde(default)]
    pub telegram: TelegramConfig,
    /// Database configuration (in-memory ledger when absent)
    #[serde(default)]
    pub database: Option<DatabaseConfig>,
    /// Position sizing and polling settings
    #[serde(default)]
    pub trading: TradingConfig,
    /// General application settings
    #[serde(default)]
    pub settings: AppSettings,
}

impl AppConfig {
    /// Reject values the order manager cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.trading.leverage == 0 {
            return Err(TraderError::Configuration(
                "trading.leverage must be at least 1".to_string(),
            ));
        }
        if self.trading.safety_buffer < Decimal::ZERO {
            return Err(TraderError::Configuration(
                "trading.safety_buffer must not be negative".to_string(),
            ));
        }
        if self.trading.fill_poll_attempts == 0 {
            return Err(TraderError::Configuration(
                "trading.fill_poll_attempts must be at least 1".to_string(),
            ));
        }
        if self.trading.profit_report_interval_seconds == 0 {
            return Err(TraderError::Configuration(
                "trading.profit_report_interval_seconds must be at least 1".to_string(),
            ));
        }
        if self.bybit.commission_rate < Decimal::ZERO {
            return Err(TraderError::Configuration(
                "bybit.commission_rate must not be negative".to_string(),
            ));
        }
        let telegram = &self.telegram;
        if telegram.enabled && (telegram.bot_token.is_none() || telegram.chat_id.is_none()) {
            return Err(TraderError::Configuration(
                "telegram is enabled but bot_token or chat_id is missing".to_string(),
            ));
        }
        Ok(())
    }
}

/// Bybit exchange configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BybitConfig {
    /// API key for signed requests
    #[serde(default)]
    pub api_key: Option<String>,
    /// API secret for signing requests
    #[serde(default)]
    pub api_secret: Option<String>,
    /// Base URL for the v5 REST API
    #[serde(default = "default_bybit_rest_url")]
    pub rest_url: String,
    /// Request validity window in milliseconds
    #[serde(default = "default_recv_window")]
    pub recv_window_ms: u64,
    /// Taker commission as a fraction of order cost
    #[serde(default = "default_commission_rate")]
    pub commission_rate: Decimal,
}

impl Default for BybitConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_secret: None,
            rest_url: default_bybit_rest_url(),
            recv_window_ms: default_recv_window(),
            commission_rate: default_commission_rate(),
        }
    }
}

fn default_bybit_rest_url() -> String {
    "https://api.bybit.com".to_string()
}

fn default_recv_window() -> u64 {
    5000
}

fn default_commission_rate() -> Decimal {
    dec!(0.00055)
}

/// Telegram notification configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    /// Send messages at all
    #[serde(default)]
    pub enabled: bool,
    /// Bot API token
    #[serde(default)]
    pub bot_token: Option<String>,
    /// Target chat
    #[serde(default)]
    pub chat_id: Option<String>,
    /// Bot API base URL, token is appended
    #[serde(default = "default_telegram_api_base_url")]
    pub api_base_url: String,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bot_token: None,
            chat_id: None,
            api_base_url: default_telegram_api_base_url(),
        }
    }
}

fn default_telegram_api_base_url() -> String {
    "https://api.telegram.org/bot".to_string()
}

/// Database configuration for the transaction ledger
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database connection URL
    pub url: String,
    /// Maximum number of connections in the pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Connection timeout in seconds
    #[serde(default = "default_connection_timeout")]
    pub connection_timeout_seconds: u64,
}

fn default_max_connections() -> u32 {
    5
}

fn default_connection_timeout() -> u64 {
    30
}

/// Position sizing and order polling settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradingConfig {
    /// Leverage applied to the free balance for all-in orders
    #[serde(default = "default_leverage")]
    pub leverage: u32,
    /// Balance kept aside before sizing all-in orders
    #[serde(default = "default_safety_buffer")]
    pub safety_buffer: Decimal,
    /// Order status checks before giving up on a fill
    #[serde(default = "default_fill_poll_attempts")]
    pub fill_poll_attempts: u32,
    /// Delay between order status checks in milliseconds
    #[serde(default = "default_fill_poll_interval")]
    pub fill_poll_interval_ms: u64,
    /// Period of the open-profit report in seconds
    #[serde(default = "default_profit_report_interval")]
    pub profit_report_interval_seconds: u64,
}

impl TradingConfig {
    pub fn fill_poll_interval(&self) -> Duration {
        Duration::from_millis(self.fill_poll_interval_ms)
    }

    pub fn profit_report_interval(&self) -> Duration {
        Duration::from_secs(self.profit_report_interval_seconds)
    }
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            leverage: default_leverage(),
            safety_buffer: default_safety_buffer(),
            fill_poll_attempts: default_fill_poll_attempts(),
            fill_poll_interval_ms: default_fill_poll_interval(),
            profit_report_interval_seconds: default_profit_report_interval(),
        }
    }
}

fn default_leverage() -> u32 {
    1
}

fn default_safety_buffer() -> Decimal {
    dec!(50)
}

fn default_fill_poll_attempts() -> u32 {
    60
}

fn default_fill_poll_interval() -> u64 {
    1000
}

fn default_profit_report_interval() -> u64 {
    4 * 60 * 60
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppSettings {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            request_timeout_seconds: default_request_timeout(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

/// API credentials for signed requests
#[derive(Debug, Clone)]
pub struct ApiCredentials {
    pub api_key: String,
    pub api_secret: String,
}

impl ApiCredentials {
    pub fn new(api_key: String, api_secret: String) -> Self {
        Self { api_key, api_secret }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.trading.leverage, 1);
        assert_eq!(config.trading.safety_buffer, dec!(50));
        assert_eq!(config.trading.fill_poll_attempts, 60);
        assert_eq!(config.trading.fill_poll_interval(), Duration::from_secs(1));
        assert_eq!(config.trading.profit_report_interval(), Duration::from_secs(14400));
    }

    #[test]
    fn test_validate_rejects_zero_leverage() {
        let mut config = AppConfig::default();
        config.trading.leverage = 0;
        assert!(matches!(config.validate(), Err(TraderError::Configuration(_))));
    }

    #[test]
    fn test_validate_requires_telegram_credentials() {
        let mut config = AppConfig::default();
        config.telegram.enabled = true;
        assert!(config.validate().is_err());

        config.telegram.bot_token = Some("token".to_string());
        config.telegram.chat_id = Some("42".to_string());
        assert!(config.validate().is_ok());
    }
}
