//! Broker channel error types.

use thiserror::Error;

/// Errors that can occur during broker operations.
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("publish error: {0}")]
    Publish(String),

    #[error("subscribe error: {0}")]
    Subscribe(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Convenience alias for broker results.
pub type BrokerResult<T> = Result<T, BrokerError>;
