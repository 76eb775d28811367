//! Error types for budgetwatch

use thiserror::Error;

/// Result type alias using budgetwatch's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for budgetwatch operations
#[derive(Error, Debug)]
pub enum Error {
    /// Broker transport error
    #[error("Broker error: {0}")]
    Broker(String),

    /// Outbox full or closed
    #[error("Outbox error: {0}")]
    Outbox(String),

    /// Notification channel error
    #[error("Channel error: {0}")]
    Channel(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Create a broker error
    pub fn broker(msg: impl Into<String>) -> Self {
        Self::Broker(msg.into())
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a channel error
    pub fn channel(msg: impl Into<String>) -> Self {
        Self::Channel(msg.into())
    }
}
