//! Error types for the broker.

use crate::types::SubscriptionId;
use thiserror::Error;

/// Main error type for broker operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BrokerError {
    #[error("No such topic: {0}")]
    NoTopic(String),

    #[error("Subscription not registered on topic: {0}")]
    NoSubscription(SubscriptionId),

    #[error("Invalid queue data: {0}")]
    InvalidData(String),
}

/// Result type for broker operations.
pub type Result<T> = std::result::Result<T, BrokerError>;
