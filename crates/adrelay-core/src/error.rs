//! Error types shared across AdRelay crates.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, AdRelayError>;

#[derive(Debug, Error)]
pub enum AdRelayError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Transport error: {0}")]
    Transport(String),

    /// The messaging network asked us to back off before sending again.
    #[error("Rate limited: retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Action needs a premium subscription.
    #[error("Premium required: {0}")]
    PremiumRequired(String),

    #[error("No active session for user {0}")]
    NoSession(i64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl AdRelayError {
    /// Seconds the transport asked us to wait, if this is a rate-limit signal.
    pub fn retry_after(&self) -> Option<u64> {
        match self {
            AdRelayError::RateLimited { retry_after_secs } => Some(*retry_after_secs),
            _ => None,
        }
    }
}
