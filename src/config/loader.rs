//! Configuration loader

use config::{Config, Environment, File};
use std::path::Path;

use super::types::{AppConfig, DatabaseConfig};
use crate::common::errors::{Result, TraderError};

/// Load configuration from file and environment variables
///
/// Priority (highest to lowest):
/// 1. Deployment secrets (BYBIT_API_KEY, TELEGRAM_BOT_API_KEY, DATABASE_URL, ...)
/// 2. Environment variables (prefixed with APP_, `__` between sections)
/// 3. Configuration file (TOML format)
/// 4. Default values
pub fn load_config(config_path: Option<&str>) -> Result<AppConfig> {
    let mut builder = Config::builder();

    if let Some(path) = config_path {
        if Path::new(path).exists() {
            builder = builder.add_source(File::with_name(path).required(false));
        }
    }

    builder = builder.add_source(
        Environment::with_prefix("APP")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder
        .build()
        .map_err(|e| TraderError::Configuration(e.to_string()))?;

    let mut app_config: AppConfig = config
        .try_deserialize()
        .map_err(|e| TraderError::Configuration(e.to_string()))?;

    apply_env_secrets(&mut app_config, |name| std::env::var(name).ok());
    app_config.validate()?;

    Ok(app_config)
}

/// Overlay the plain environment variable names used by the deployment
///
/// `lookup` abstracts `std::env::var` so the mapping can be tested.
pub fn apply_env_secrets<F>(config: &mut AppConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(key) = lookup("BYBIT_API_KEY") {
        config.bybit.api_key = Some(key);
    }
    if let Some(secret) = lookup("BYBIT_API_SECRET") {
        config.bybit.api_secret = Some(secret);
    }
    if let Some(token) = lookup("TELEGRAM_BOT_API_KEY") {
        config.telegram.bot_token = Some(token);
    }
    if let Some(chat_id) = lookup("TELEGRAM_BOT_CHAT_ID") {
        config.telegram.chat_id = Some(chat_id);
    }
    if let Some(base_url) = lookup("TELEGRAM_API_BASE_URL") {
        config.telegram.api_base_url = base_url;
    }
    if let Some(enabled) = lookup("TELEGRAM_ENABLED") {
        config.telegram.enabled = enabled.trim().eq_ignore_ascii_case("true");
    }
    if let Some(url) = lookup("DATABASE_URL") {
        match config.database.as_mut() {
            Some(database) => database.url = url,
            None => {
                config.database = Some(DatabaseConfig {
                    url,
                    max_connections: 5,
                    connection_timeout_seconds: 30,
                })
            }
        }
    }
}
