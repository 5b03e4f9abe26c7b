//! Error types for the application

use thiserror::Error;

/// Result type alias using our TraderError
pub type Result<T> = std::result::Result<T, TraderError>;

/// Main error type for trading operations
#[derive(Error, Debug)]
pub enum TraderError {
    /// HTTP request errors
    #[error("HTTP request error: {0}")]
    HttpRequest(#[from] reqwest::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON parsing error: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Exchange answered with a non-zero return code
    #[error("Exchange rejected request (code {code}): {message}")]
    ExchangeRejected { code: i64, message: String },

    /// Invalid API response
    #[error("Invalid API response: {0}")]
    InvalidResponse(String),

    /// Authentication errors
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Order was not filled within the polling budget
    #[error("Order {order_id} not filled after {attempts} attempts")]
    FillTimeout { order_id: String, attempts: u32 },

    /// Order reached a terminal status other than Filled
    #[error("Order {order_id} ended with status {status}")]
    FillRejected { order_id: String, status: String },

    /// Operation aborted by shutdown
    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    /// Coin not found
    #[error("Coin not found: {0}")]
    CoinNotFound(String),

    /// Trading strategy not found
    #[error("Trading strategy not found: {0}")]
    StrategyNotFound(String),

    /// Trading strategy exists but is switched off
    #[error("Trading strategy is disabled: {0}")]
    StrategyDisabled(String),

    /// Transaction not found
    #[error("Transaction not found: {0}")]
    TransactionNotFound(i64),

    /// An open transaction already exists for the position key
    #[error("Position already open for {symbol} (transaction {transaction_id})")]
    PositionAlreadyOpen { symbol: String, transaction_id: i64 },

    /// Caller supplied an unusable value
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Order executed on the exchange but could not be recorded locally
    #[error("Order filled on exchange but not recorded: {0}")]
    Unreconciled(String),

    /// Capability not offered by this exchange
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// Generic internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}
