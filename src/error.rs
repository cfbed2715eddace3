//! Error types for the text-back gateway

use thiserror::Error;

/// Result type alias for gateway operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the text-back gateway
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Business not found for a phone number or id
    #[error("business not found: {0}")]
    BusinessNotFound(String),

    /// Twilio REST API error
    #[error("twilio error: {0}")]
    Twilio(String),

    /// Webhook signature rejected
    #[error("signature error: {0}")]
    Signature(String),

    /// LLM completion error
    #[error("llm error: {0}")]
    Llm(String),

    /// Outbound send suppressed by the per-number rate limit
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Database error
    #[error("database error: {0}")]
    Database(String),

    /// `SQLite` error
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Resource not found
    #[error("not found: {0}")]
    NotFound(String),
}
